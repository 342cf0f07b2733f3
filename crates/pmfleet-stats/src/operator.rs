//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Aggregation operators reducing fleet entries into metrics."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Operators are plain data plus two optional function values: a `filter`
//! deciding which entries take part and a `group` extracting a partition key.
//! Entries whose source path or group key is missing are skipped, never
//! counted as zero.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::path::{resolve_f64, resolve_key};

pub type FilterFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type GroupFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Group by the scalar found at `path`.
pub fn group_by(path: impl Into<String>) -> GroupFn {
    let path = path.into();
    Arc::new(move |entry: &Value| resolve_key(entry, &path))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Sum,
    GroupSum,
    GroupMultipleStats,
}

/// A named extractor used by [`OperatorSpec::GroupMultipleStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub src: String,
}

impl Source {
    pub fn new(name: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: src.into(),
        }
    }
}

#[derive(Clone)]
pub enum OperatorSpec {
    Sum {
        src: String,
        filter: Option<FilterFn>,
    },
    GroupSum {
        src: String,
        group: GroupFn,
        filter: Option<FilterFn>,
    },
    GroupMultipleStats {
        srcs: Vec<Source>,
        group: GroupFn,
        filter: Option<FilterFn>,
    },
}

impl fmt::Debug for OperatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        let mut out = f.debug_struct(kind.as_ref());
        match self {
            OperatorSpec::Sum { src, .. } | OperatorSpec::GroupSum { src, .. } => {
                out.field("src", src);
            }
            OperatorSpec::GroupMultipleStats { srcs, .. } => {
                out.field("srcs", srcs);
            }
        }
        out.field("filtered", &self.filter().is_some()).finish()
    }
}

impl OperatorSpec {
    pub fn sum(src: impl Into<String>) -> Self {
        OperatorSpec::Sum {
            src: src.into(),
            filter: None,
        }
    }

    pub fn group_sum(src: impl Into<String>, group: GroupFn) -> Self {
        OperatorSpec::GroupSum {
            src: src.into(),
            group,
            filter: None,
        }
    }

    pub fn group_multiple_stats(srcs: Vec<Source>, group: GroupFn) -> Self {
        OperatorSpec::GroupMultipleStats {
            srcs,
            group,
            filter: None,
        }
    }

    /// Attach (or replace) the entry filter.
    pub fn with_filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let predicate: FilterFn = Arc::new(predicate);
        match self {
            OperatorSpec::Sum { src, .. } => OperatorSpec::Sum {
                src,
                filter: Some(predicate),
            },
            OperatorSpec::GroupSum { src, group, .. } => OperatorSpec::GroupSum {
                src,
                group,
                filter: Some(predicate),
            },
            OperatorSpec::GroupMultipleStats { srcs, group, .. } => {
                OperatorSpec::GroupMultipleStats {
                    srcs,
                    group,
                    filter: Some(predicate),
                }
            }
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            OperatorSpec::Sum { .. } => OperatorKind::Sum,
            OperatorSpec::GroupSum { .. } => OperatorKind::GroupSum,
            OperatorSpec::GroupMultipleStats { .. } => OperatorKind::GroupMultipleStats,
        }
    }

    pub fn filter(&self) -> Option<&FilterFn> {
        match self {
            OperatorSpec::Sum { filter, .. }
            | OperatorSpec::GroupSum { filter, .. }
            | OperatorSpec::GroupMultipleStats { filter, .. } => filter.as_ref(),
        }
    }

    /// Whether `entry` takes part in this operator. No filter accepts all.
    pub fn accepts(&self, entry: &Value) -> bool {
        self.filter().map_or(true, |filter| filter(entry))
    }

    pub fn evaluate(&self, entries: &[Value]) -> OperatorOutput {
        let passing = entries.iter().filter(|entry| self.accepts(entry));
        match self {
            OperatorSpec::Sum { src, .. } => {
                OperatorOutput::Sum(passing.filter_map(|entry| resolve_f64(entry, src)).sum())
            }
            OperatorSpec::GroupSum { src, group, .. } => {
                let mut sums: IndexMap<String, f64> = IndexMap::new();
                for entry in passing {
                    let (Some(key), Some(value)) = (group(entry), resolve_f64(entry, src)) else {
                        continue;
                    };
                    *sums.entry(key).or_insert(0.0) += value;
                }
                OperatorOutput::GroupSum(sums)
            }
            OperatorSpec::GroupMultipleStats { srcs, group, .. } => {
                let mut groups: IndexMap<String, IndexMap<String, StatSummary>> = IndexMap::new();
                for entry in passing {
                    let Some(key) = group(entry) else {
                        continue;
                    };
                    for source in srcs {
                        let Some(value) = resolve_f64(entry, &source.src) else {
                            continue;
                        };
                        groups
                            .entry(key.clone())
                            .or_default()
                            .entry(source.name.clone())
                            .or_insert_with(StatSummary::empty)
                            .push(value);
                    }
                }
                OperatorOutput::GroupMultipleStats(groups)
            }
        }
    }
}

/// Count, total, mean and extremes of one source within one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl StatSummary {
    fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            avg: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.avg = self.sum / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperatorOutput {
    Sum(f64),
    GroupSum(IndexMap<String, f64>),
    GroupMultipleStats(IndexMap<String, IndexMap<String, StatSummary>>),
}

impl OperatorOutput {
    pub fn as_sum(&self) -> Option<f64> {
        match self {
            OperatorOutput::Sum(total) => Some(*total),
            _ => None,
        }
    }

    pub fn as_group_sum(&self) -> Option<&IndexMap<String, f64>> {
        match self {
            OperatorOutput::GroupSum(groups) => Some(groups),
            _ => None,
        }
    }

    pub fn as_group_stats(&self) -> Option<&IndexMap<String, IndexMap<String, StatSummary>>> {
        match self {
            OperatorOutput::GroupMultipleStats(groups) => Some(groups),
            _ => None,
        }
    }

    /// Flatten into `(group, stat, value)` rows. Scalar sums use an empty group.
    pub fn rows(&self) -> Vec<(String, String, f64)> {
        match self {
            OperatorOutput::Sum(total) => vec![(String::new(), "sum".to_owned(), *total)],
            OperatorOutput::GroupSum(groups) => groups
                .iter()
                .map(|(group, total)| (group.clone(), "sum".to_owned(), *total))
                .collect(),
            OperatorOutput::GroupMultipleStats(groups) => groups
                .iter()
                .flat_map(|(group, sources)| {
                    sources.iter().flat_map(move |(name, summary)| {
                        [
                            ("count", summary.count as f64),
                            ("sum", summary.sum),
                            ("avg", summary.avg),
                            ("min", summary.min),
                            ("max", summary.max),
                        ]
                        .into_iter()
                        .map(move |(stat, value)| (group.clone(), format!("{name}_{stat}"), value))
                    })
                })
                .collect(),
        }
    }
}

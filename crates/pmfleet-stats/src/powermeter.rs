//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Built-in aggregation sets for power meters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use serde_json::Value;

use crate::errors::Result;
use crate::operator::{group_by, OperatorSpec, Source};
use crate::path::resolve;
use crate::status::SharedClassifier;
use crate::table::{SpecSet, SpecsTable};

pub const POWERMETER_DEFAULT: &str = "powermeter_default";
pub const POWERMETER: &str = "powermeter";

pub const POWER_W_SRC: &str = "last.snap.stats.power_w";
pub const TENSION_V_SRC: &str = "last.snap.stats.tension_v";
pub const LAST15M_AVG_NAME: &str = "real_import_power_w_last15m_avg";
pub const LAST15M_AVG_SRC: &str =
    "last.snap.stats.powermeter_specific.historical_values.real_import_power_w_last15m_avg";

/// Operators shared by every power-meter flavour.
pub fn powermeter_default() -> SpecSet {
    SpecSet::new()
        .with_op("power_w", OperatorSpec::sum(POWER_W_SRC))
        .with_op(
            "tension_v_pos_group",
            OperatorSpec::group_multiple_stats(
                vec![Source::new("tension_v", TENSION_V_SRC)],
                group_by("info.pos"),
            ),
        )
}

/// Rack power-meter operators layered over [`powermeter_default`].
pub fn powermeter_overrides(classifier: SharedClassifier) -> SpecSet {
    SpecSet::new()
        .with_op(
            "site_power_w",
            OperatorSpec::sum(POWER_W_SRC).with_filter(|entry: &Value| {
                resolve(entry, "info.pos").and_then(Value::as_str) == Some("site")
            }),
        )
        .with_op(
            "power_w_container_group_sum",
            OperatorSpec::group_sum(POWER_W_SRC, group_by("info.container")),
        )
        .with_op(
            "powermeter_specific_stats_group",
            OperatorSpec::group_multiple_stats(
                vec![Source::new(LAST15M_AVG_NAME, LAST15M_AVG_SRC)],
                group_by("info.pos"),
            )
            .with_filter(move |entry: &Value| online_with_stats(entry, classifier.as_ref())),
        )
}

fn online_with_stats(entry: &Value, classifier: &dyn crate::status::StatusClassifier) -> bool {
    let Some(snap) = resolve(entry, "last.snap") else {
        return false;
    };
    if resolve(snap, "stats").map_or(true, Value::is_null) {
        return false;
    }
    !classifier.is_offline(snap)
}

/// Table holding `powermeter_default` and `powermeter`.
pub fn builtin_specs(classifier: SharedClassifier) -> Result<Arc<SpecsTable>> {
    Ok(SpecsTable::builder()
        .register(POWERMETER_DEFAULT, powermeter_default())?
        .extend(POWERMETER, POWERMETER_DEFAULT, powermeter_overrides(classifier))?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::default_classifier;
    use serde_json::json;

    fn powermeter() -> SpecSet {
        builtin_specs(default_classifier())
            .unwrap()
            .get(POWERMETER)
            .cloned()
            .unwrap()
    }

    #[test]
    fn powermeter_inherits_default_ops() {
        let names: Vec<_> = powermeter().names().map(str::to_owned).collect();
        assert_eq!(
            names,
            vec![
                "power_w",
                "tension_v_pos_group",
                "site_power_w",
                "power_w_container_group_sum",
                "powermeter_specific_stats_group",
            ]
        );
    }

    #[test]
    fn site_filter_checks_position() {
        let set = powermeter();
        let op = set.op("site_power_w").unwrap();
        assert!(op.accepts(&json!({"info": {"pos": "site"}})));
        assert!(!op.accepts(&json!({"info": {"pos": "rack-1"}})));
        assert!(!op.accepts(&json!({})));
    }

    #[test]
    fn stats_group_filter_requires_stats() {
        let set = powermeter();
        let op = set.op("powermeter_specific_stats_group").unwrap();
        assert!(!op.accepts(&json!({})));
        assert!(!op.accepts(&json!({"last": {}})));
        assert!(!op.accepts(&json!({"last": {"snap": {}}})));
        assert!(op.accepts(&json!({"last": {"snap": {"success": true, "stats": {}}}})));
    }

    #[test]
    fn stats_group_filter_delegates_offline_status() {
        let entry = json!({"last": {"snap": {"stats": {}}}});
        let offline = builtin_specs(Arc::new(|_: &Value| true)).unwrap();
        let online = builtin_specs(Arc::new(|_: &Value| false)).unwrap();
        let op = "powermeter_specific_stats_group";
        assert!(!offline.get(POWERMETER).unwrap().op(op).unwrap().accepts(&entry));
        assert!(online.get(POWERMETER).unwrap().op(op).unwrap().accepts(&entry));
    }

    #[test]
    fn default_set_is_registered_alone() {
        let table = builtin_specs(default_classifier()).unwrap();
        assert_eq!(table.get(POWERMETER_DEFAULT).unwrap().len(), 2);
        assert_eq!(
            table.device_types().collect::<Vec<_>>(),
            vec![POWERMETER_DEFAULT, POWERMETER]
        );
    }
}

//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Online/offline classification of device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use serde_json::Value;

/// Decides whether a snapshot came from a device that is offline.
pub trait StatusClassifier: Send + Sync {
    fn is_offline(&self, snap: &Value) -> bool;
}

/// Offline unless the snapshot reports `success: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapStatusClassifier;

impl StatusClassifier for SnapStatusClassifier {
    fn is_offline(&self, snap: &Value) -> bool {
        snap.get("success").and_then(Value::as_bool) != Some(true)
    }
}

impl<F> StatusClassifier for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn is_offline(&self, snap: &Value) -> bool {
        self(snap)
    }
}

pub type SharedClassifier = Arc<dyn StatusClassifier>;

pub fn default_classifier() -> SharedClassifier {
    Arc::new(SnapStatusClassifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_flag_decides_status() {
        let classifier = SnapStatusClassifier;
        assert!(!classifier.is_offline(&json!({"success": true, "stats": {}})));
        assert!(classifier.is_offline(&json!({"success": false})));
        assert!(classifier.is_offline(&json!({"stats": {}})));
    }

    #[test]
    fn closures_classify() {
        let always_online = |_: &Value| false;
        assert!(!always_online.is_offline(&json!({})));
    }
}

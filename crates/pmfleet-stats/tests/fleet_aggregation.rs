//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Power-meter spec set evaluated over mixed fleets."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use pmfleet_stats::{builtin_specs, default_classifier, OperatorSpec, SpecSet, POWERMETER};
use serde_json::{json, Value};

fn snap_entry(pos: &str, container: &str, power_w: f64, avg: f64) -> Value {
    json!({
        "info": {"pos": pos, "container": container},
        "last": {"snap": {
            "success": true,
            "stats": {
                "power_w": power_w,
                "tension_v": 400.0,
                "powermeter_specific": {"historical_values": {
                    "real_import_power_w_last15m_avg": avg
                }}
            }
        }}
    })
}

fn powermeter() -> SpecSet {
    builtin_specs(default_classifier())
        .unwrap()
        .get(POWERMETER)
        .cloned()
        .unwrap()
}

#[test]
fn site_sum_counts_only_passing_entries() {
    let entries = vec![
        snap_entry("site", "c1", 1000.0, 900.0),
        snap_entry("rack-1", "c1", 7.0, 7.0),
        snap_entry("site", "c2", 2500.0, 2400.0),
        snap_entry("rack-2", "c2", 11.0, 11.0),
        json!({"info": {"pos": "rack-3"}}),
    ];
    let out = powermeter().evaluate(&entries);
    assert_eq!(out["site_power_w"].as_sum(), Some(3500.0));
    assert_eq!(out["power_w"].as_sum(), Some(1000.0 + 7.0 + 2500.0 + 11.0));
}

#[test]
fn missing_source_path_is_excluded_not_zero() {
    let entries = vec![
        snap_entry("site", "c1", 1000.0, 1000.0),
        json!({"info": {"pos": "site", "container": "c1"}, "last": {"snap": {"success": true, "stats": {}}}}),
    ];
    let out = powermeter().evaluate(&entries);
    assert_eq!(out["site_power_w"].as_sum(), Some(1000.0));

    let stats = out["powermeter_specific_stats_group"].as_group_stats().unwrap();
    assert_eq!(stats["site"]["real_import_power_w_last15m_avg"].count, 1);
    assert_eq!(stats["site"]["real_import_power_w_last15m_avg"].avg, 1000.0);
}

#[test]
fn container_sums_do_not_leak_across_groups() {
    let entries = vec![
        snap_entry("rack-1", "c1", 100.0, 0.0),
        snap_entry("rack-2", "c2", 10.0, 0.0),
        snap_entry("rack-3", "c1", 200.0, 0.0),
        snap_entry("rack-4", "c3", 1.0, 0.0),
    ];
    let out = powermeter().evaluate(&entries);
    let groups = out["power_w_container_group_sum"].as_group_sum().unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups["c1"], 300.0);
    assert_eq!(groups["c2"], 10.0);
    assert_eq!(groups["c3"], 1.0);
}

#[test]
fn offline_snapshots_drop_out_of_historical_stats() {
    let mut offline = snap_entry("rack-1", "c1", 100.0, 5000.0);
    offline["last"]["snap"]["success"] = json!(false);
    let entries = vec![
        offline,
        snap_entry("rack-1", "c1", 100.0, 100.0),
        snap_entry("rack-1", "c1", 300.0, 300.0),
        snap_entry("site", "c0", 400.0, 400.0),
    ];
    let out = powermeter().evaluate(&entries);
    let stats = out["powermeter_specific_stats_group"].as_group_stats().unwrap();
    let rack = stats["rack-1"]["real_import_power_w_last15m_avg"];
    assert_eq!(rack.count, 2);
    assert_eq!(rack.avg, 200.0);
    assert_eq!(rack.min, 100.0);
    assert_eq!(rack.max, 300.0);
    assert_eq!(stats["site"]["real_import_power_w_last15m_avg"].sum, 400.0);
}

#[test]
fn tension_grouped_by_position() {
    let entries = vec![
        snap_entry("rack-1", "c1", 1.0, 1.0),
        snap_entry("rack-1", "c1", 1.0, 1.0),
    ];
    let out = powermeter().evaluate(&entries);
    let groups = out["tension_v_pos_group"].as_group_stats().unwrap();
    assert_eq!(groups["rack-1"]["tension_v"].avg, 400.0);
}

#[test]
fn custom_sets_extend_the_builtin_table() {
    let extra = SpecSet::new().with_op(
        "site_power_w",
        OperatorSpec::sum("last.snap.stats.power_w"),
    );
    let merged = powermeter().extended_with(&extra);
    let entries = vec![
        snap_entry("site", "c1", 10.0, 0.0),
        snap_entry("rack", "c1", 5.0, 0.0),
    ];
    assert_eq!(merged.evaluate(&entries)["site_power_w"].as_sum(), Some(15.0));
    assert_eq!(merged.len(), 5);
}

#[test]
fn evaluation_output_serialises() {
    let out = powermeter().evaluate(&[snap_entry("site", "c1", 10.0, 10.0)]);
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["site_power_w"], json!(10.0));
    assert_eq!(value["power_w_container_group_sum"]["c1"], json!(10.0));
    assert_eq!(
        value["powermeter_specific_stats_group"]["site"]["real_import_power_w_last15m_avg"]["count"],
        json!(1)
    );
}

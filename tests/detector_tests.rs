use costscout::detector::{round2, DEFAULT_WINDOW_LABEL};
use costscout::{detect, detect_with, CostIndex, DimensionKey, InvalidConfigurationError, Thresholds, Trigger};

fn index(entries: &[(&str, &str, f64)]) -> CostIndex {
    CostIndex::from_entries(entries.iter().map(|(s, r, c)| (DimensionKey::new(*s, *r), *c))).unwrap()
}

#[test]
fn zero_baseline_below_absolute_is_not_flagged() {
    let cur = index(&[("EC2", "us-east-1", 500.0)]);
    let prev = index(&[("EC2", "us-east-1", 0.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, DEFAULT_WINDOW_LABEL).unwrap();
    assert!(out.is_empty());
}

#[test]
fn zero_baseline_above_absolute_is_flagged_with_zero_change() {
    let cur = index(&[("EC2", "us-east-1", 1500.0)]);
    let prev = index(&[("EC2", "us-east-1", 0.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, DEFAULT_WINDOW_LABEL).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].change_pct, 0.0);
    assert_eq!(out[0].previous_cost, 0.0);
    assert_eq!(out[0].trigger, Trigger::Absolute);
}

#[test]
fn new_key_without_baseline_only_counts_by_absolute() {
    let cur = index(&[("Bedrock", "us-west-2", 900.0), ("SageMaker", "us-west-2", 1200.0)]);
    let prev = CostIndex::default();
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].service, "SageMaker");
    assert_eq!(out[0].change_pct, 0.0);
}

#[test]
fn percentage_boundary_is_strict() {
    let prev = index(&[("EC2", "us-east-1", 100.0)]);
    let at = detect(&index(&[("EC2", "us-east-1", 130.0)]), &prev, 30.0, 1000.0, "w").unwrap();
    assert!(at.is_empty());
    let over = detect(&index(&[("EC2", "us-east-1", 130.01)]), &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].change_pct, 30.01);
    assert_eq!(over[0].trigger, Trigger::Percentage);
}

#[test]
fn absolute_boundary_is_strict() {
    let prev = index(&[("EC2", "us-east-1", 1000.0)]);
    let at = detect(&index(&[("EC2", "us-east-1", 1000.0)]), &prev, 30.0, 1000.0, "w").unwrap();
    assert!(at.is_empty());
    let over = detect(&index(&[("EC2", "us-east-1", 1000.01)]), &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].trigger, Trigger::Absolute);
}

#[test]
fn either_rule_alone_suffices() {
    let cur = index(&[("EC2", "us-east-1", 5000.0), ("Lambda", "eu-west-1", 200.0)]);
    let prev = index(&[("EC2", "us-east-1", 4900.0), ("Lambda", "eu-west-1", 100.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].service, "EC2");
    assert_eq!(out[0].trigger, Trigger::Absolute);
    assert_eq!(out[1].service, "Lambda");
    assert_eq!(out[1].trigger, Trigger::Percentage);
    assert_eq!(out[1].change_pct, 100.0);
}

#[test]
fn both_rules_are_reported_together() {
    let cur = index(&[("EC2", "us-east-1", 3000.0)]);
    let prev = index(&[("EC2", "us-east-1", 1000.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(out[0].trigger, Trigger::Both);
    assert_eq!(out[0].change_pct, 200.0);
}

#[test]
fn output_fields_are_rounded_comparison_is_not() {
    let cur = index(&[("EC2", "us-east-1", 500.0)]);
    let prev = index(&[("EC2", "us-east-1", 333.333)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert_eq!(out.len(), 1);
    let expected = round2((500.0 - 333.333) * 100.0 / 333.333);
    assert_eq!(out[0].change_pct, expected);
    assert_eq!(out[0].change_pct, 50.0);
    assert_eq!(out[0].current_cost, 500.0);
    assert_eq!(out[0].previous_cost, 333.33);
}

#[test]
fn rounding_does_not_create_triggers() {
    // 1000.004 rounds to 1000.0 for display but is still above the threshold.
    let cur = index(&[("EC2", "us-east-1", 1000.004)]);
    let out = detect(&cur, &CostIndex::default(), 30.0, 1000.0, "w").unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].current_cost, 1000.0);
}

#[test]
fn vanished_keys_are_never_flagged() {
    let cur = index(&[("S3", "us-east-1", 10.0)]);
    let prev = index(&[("EC2", "us-east-1", 99999.0), ("S3", "us-east-1", 10.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert!(out.is_empty());
}

#[test]
fn decreases_are_not_flagged_by_percentage() {
    let cur = index(&[("EC2", "us-east-1", 10.0)]);
    let prev = index(&[("EC2", "us-east-1", 100.0)]);
    assert!(detect(&cur, &prev, 30.0, 1000.0, "w").unwrap().is_empty());
}

#[test]
fn window_label_is_attached_verbatim() {
    let cur = index(&[("EC2", "us-east-1", 2000.0), ("S3", "eu-west-1", 2000.0)]);
    let out = detect(&cur, &CostIndex::default(), 30.0, 1000.0, "2025-12-01..2025-12-31").unwrap();
    assert!(out.iter().all(|s| s.time_window == "2025-12-01..2025-12-31"));
}

#[test]
fn output_is_sorted_by_service_then_region_and_repeatable() {
    let entries = [
        ("S3", "us-east-1", 2000.0),
        ("EC2", "us-west-2", 2000.0),
        ("EC2", "eu-west-1", 2000.0),
        ("Athena", "us-east-1", 2000.0),
    ];
    let a = detect(&index(&entries), &CostIndex::default(), 30.0, 1000.0, "w").unwrap();
    let mut reversed = entries;
    reversed.reverse();
    let b = detect(&index(&reversed), &CostIndex::default(), 30.0, 1000.0, "w").unwrap();
    assert_eq!(a, b);
    let keys: Vec<(&str, &str)> = a.iter().map(|s| (s.service.as_str(), s.region.as_str())).collect();
    assert_eq!(keys, vec![("Athena", "us-east-1"), ("EC2", "eu-west-1"), ("EC2", "us-west-2"), ("S3", "us-east-1")]);
}

#[test]
fn invalid_thresholds_fail_before_any_work() {
    let cur = index(&[("EC2", "us-east-1", 2000.0)]);
    let prev = CostIndex::default();
    assert!(matches!(
        detect(&cur, &prev, f64::NAN, 1000.0, "w"),
        Err(InvalidConfigurationError::NonFinite { name: "percentage", .. })
    ));
    assert!(matches!(
        detect(&cur, &prev, 30.0, f64::INFINITY, "w"),
        Err(InvalidConfigurationError::NonFinite { name: "absolute", .. })
    ));
    assert_eq!(detect(&cur, &prev, -1.0, 1000.0, "w"), Err(InvalidConfigurationError::NegativePercentage(-1.0)));
}

#[test]
fn detect_with_revalidates_hand_built_thresholds() {
    let t = Thresholds { pct: -5.0, abs: 10.0 };
    assert!(detect_with(&CostIndex::default(), &CostIndex::default(), &t, "w").is_err());
}

#[test]
fn empty_current_yields_empty_result_not_error() {
    let prev = index(&[("EC2", "us-east-1", 100.0)]);
    assert_eq!(detect(&CostIndex::default(), &prev, 30.0, 1000.0, "w"), Ok(vec![]));
}

#[test]
fn suspects_serialize_with_snake_case_trigger() {
    let cur = index(&[("EC2", "us-east-1", 1500.0)]);
    let out = detect(&cur, &CostIndex::default(), 30.0, 1000.0, DEFAULT_WINDOW_LABEL).unwrap();
    let v = serde_json::to_value(&out[0]).unwrap();
    assert_eq!(v["trigger"], "absolute");
    assert_eq!(v["time_window"], "last_14_days");
    assert_eq!(v["current_cost"], 1500.0);
}

#[test]
fn shared_indices_give_identical_results_across_threads() {
    let cur = index(&[("EC2", "us-east-1", 2600.0), ("S3", "us-east-1", 45.0), ("Lambda", "eu-west-1", 12.0)]);
    let prev = index(&[("EC2", "us-east-1", 1000.0), ("S3", "us-east-1", 30.0), ("Lambda", "eu-west-1", 12.0)]);
    let expected = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| detect(&cur, &prev, 30.0, 1000.0, "w").unwrap())).collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
    assert_eq!(expected.len(), 2);
}

#[test]
fn exact_ties_round_to_even_in_output() {
    let cur = index(&[("EC2", "us-east-1", 1000.125)]);
    let out = detect(&cur, &CostIndex::default(), 30.0, 1000.0, "w").unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].current_cost, 1000.12);
}

#[test]
fn very_large_costs_stay_finite_in_output() {
    let cur = index(&[("EC2", "us-east-1", 1e307)]);
    let out = detect(&cur, &CostIndex::default(), 30.0, 1000.0, "w").unwrap();
    assert_eq!(out[0].current_cost, 1e307);
    let v = serde_json::to_value(&out[0]).unwrap();
    assert_eq!(v["current_cost"], 1e307);
}

#[test]
fn huge_growth_keeps_change_finite() {
    let cur = index(&[("EC2", "us-east-1", 1e307)]);
    let prev = index(&[("EC2", "us-east-1", 10.0)]);
    let out = detect(&cur, &prev, 30.0, 1000.0, "w").unwrap();
    assert!(out[0].change_pct.is_finite());
    assert_eq!(out[0].trigger, Trigger::Both);
}

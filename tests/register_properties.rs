use proptest::prelude::*;
use serde_json::{Value, json};

use periphgen::validation::{
    RegisterMappingValidator, StepValidator, ValidationIssue, ValidationResult, score_for,
};

fn validate(data: &Value) -> ValidationResult {
    let mut result = ValidationResult::new();
    RegisterMappingValidator.validate_custom(data, &mut result);
    result
}

fn register(name: String, address: u64, size: u32) -> Value {
    json!({
        "name": name,
        "address": format!("0x{address:X}"),
        "size": size,
        "access": "RW"
    })
}

fn conflicts(result: &ValidationResult) -> usize {
    result
        .errors()
        .filter(|issue| issue.message.contains("conflicts with"))
        .count()
}

fn size_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(8u32), Just(16u32), Just(32u32)]
}

proptest! {
    #[test]
    fn disjoint_registers_never_conflict(sizes in prop::collection::vec(size_strategy(), 1..12)) {
        let mut address = 0u64;
        let registers: Vec<Value> = sizes
            .iter()
            .enumerate()
            .map(|(idx, size)| {
                let entry = register(format!("REG{idx}"), address, *size);
                address += u64::from(size / 8);
                entry
            })
            .collect();

        let result = validate(&json!({ "registers": registers }));
        prop_assert!(result.is_valid(), "{:?}", result.issues());
        prop_assert_eq!(result.score(), 100.0);
    }

    #[test]
    fn overlapping_register_is_reported(
        base in 0u64..64,
        size in size_strategy(),
        offset in 0u64..4,
    ) {
        let bytes = u64::from(size / 8);
        let second = base + offset % bytes;
        let data = json!({
            "registers": [
                register("FIRST".into(), base, size),
                register("SECOND".into(), second, 8),
            ]
        });

        let result = validate(&data);
        prop_assert_eq!(conflicts(&result), 1);
        prop_assert!(!result.is_valid());
    }

    #[test]
    fn adjacent_bit_fields_are_disjoint(widths in prop::collection::vec(1u32..5, 1..8)) {
        let mut start = 0u32;
        let mut fields = Vec::new();
        for (idx, width) in widths.iter().enumerate() {
            if start + width > 32 {
                break;
            }
            fields.push(json!({
                "name": format!("F{idx}"),
                "start_bit": start,
                "end_bit": start + width - 1,
            }));
            start += width;
        }
        let data = json!({
            "registers": [{
                "name": "CTRL",
                "address": "0x0",
                "size": 32,
                "access": "RW",
                "bit_fields": fields,
            }]
        });

        prop_assert!(validate(&data).is_valid());
    }

    #[test]
    fn shared_bit_is_an_overlap(shared in 0u32..31, low in 0u32..8) {
        let low = shared.saturating_sub(low);
        let data = json!({
            "registers": [{
                "name": "CTRL",
                "address": "0x0",
                "size": 32,
                "access": "RW",
                "bit_fields": [
                    {"name": "A", "start_bit": low, "end_bit": shared},
                    {"name": "B", "start_bit": shared, "end_bit": shared + 1},
                ]
            }]
        });

        let result = validate(&data);
        let overlaps = result
            .errors()
            .filter(|issue| issue.message.contains("overlaps with another field"))
            .count();
        prop_assert_eq!(overlaps, 1);
    }

    #[test]
    fn score_depends_only_on_issue_counts(errors in 0usize..15, warnings in 0usize..60, infos in 0usize..5) {
        let mut result = ValidationResult::new();
        result.extend((0..errors).map(|i| ValidationIssue::error(format!("e{i}"))));
        result.extend((0..warnings).map(|i| ValidationIssue::warning(format!("w{i}"))));
        result.extend((0..infos).map(|i| ValidationIssue::info(format!("i{i}"))));

        let expected = (100.0 - 10.0 * errors as f64 - 2.0 * warnings as f64).clamp(0.0, 100.0);
        prop_assert_eq!(result.score(), expected);
        prop_assert_eq!(score_for(result.issues()), expected);
        prop_assert_eq!(result.is_valid(), errors == 0);
    }
}

//! Merging an imported backup into the live document
//!
//! Records are matched by ID. On a conflict the imported copy wins; records
//! unique to either side are kept. Swapping the arguments changes which side
//! wins, so callers must always pass the live document first.

use std::collections::HashMap;

use crate::models::{AppData, MedicalRecord};

/// Combine `current` with `imported`, imported taking precedence
pub fn merge(current: &AppData, imported: &AppData) -> AppData {
    let mut records: Vec<MedicalRecord> =
        Vec::with_capacity(current.records.len() + imported.records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    // A replaced record keeps the slot of its first occurrence, which only
    // matters for ties in the stable sort below.
    for record in current.records.iter().chain(imported.records.iter()) {
        match positions.get(record.id()) {
            Some(&index) => records[index] = record.clone(),
            None => {
                positions.insert(record.id().to_string(), records.len());
                records.push(record.clone());
            }
        }
    }

    let mut merged = AppData {
        records,
        user_name: merge_field(&current.user_name, &imported.user_name),
        user_dob: merge_field(&current.user_dob, &imported.user_dob),
    };
    merged.sort_records();
    merged
}

/// Non-empty imported value overrides, otherwise keep current
fn merge_field(current: &Option<String>, imported: &Option<String>) -> Option<String> {
    match imported {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => current.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Symptom;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn record(id: &str, description: &str, day: u32) -> MedicalRecord {
        MedicalRecord::Symptom(Symptom {
            id: id.to_string(),
            date: at(day),
            notes: None,
            description: description.to_string(),
        })
    }

    fn description(record: &MedicalRecord) -> &str {
        match record {
            MedicalRecord::Symptom(s) => &s.description,
            other => panic!("Wrong record type: {:?}", other),
        }
    }

    fn profile(name: Option<&str>, dob: Option<&str>) -> AppData {
        AppData {
            records: Vec::new(),
            user_name: name.map(str::to_string),
            user_dob: dob.map(str::to_string),
        }
    }

    #[test]
    fn test_imported_record_wins_on_conflict() {
        let mut current = AppData::new();
        current.records.push(record("1", "A", 1));

        let mut imported = AppData::new();
        imported.records.push(record("1", "B", 1));
        imported.records.push(record("2", "C", 2));

        let merged = merge(&current, &imported);

        let summary: Vec<(&str, &str)> = merged
            .records
            .iter()
            .map(|r| (r.id(), description(r)))
            .collect();
        assert_eq!(summary, vec![("2", "C"), ("1", "B")]);
    }

    #[test]
    fn test_unique_records_from_both_sides_kept_and_sorted() {
        let mut current = AppData::new();
        current.records.push(record("c1", "x", 5));
        current.records.push(record("c2", "x", 1));

        let mut imported = AppData::new();
        imported.records.push(record("i1", "x", 3));
        imported.records.push(record("i2", "x", 9));

        let merged = merge(&current, &imported);
        let ids: Vec<&str> = merged.records.iter().map(MedicalRecord::id).collect();

        assert_eq!(ids, vec!["i2", "c1", "i1", "c2"]);
    }

    #[test]
    fn test_profile_fields_merge_independently() {
        let current = profile(Some("Alice"), Some(""));
        let imported = profile(Some(""), Some("1990-01-01"));

        let merged = merge(&current, &imported);

        assert_eq!(merged.user_name.as_deref(), Some("Alice"));
        assert_eq!(merged.user_dob.as_deref(), Some("1990-01-01"));
    }

    #[test]
    fn test_absent_imported_profile_keeps_current() {
        let current = profile(Some("Alice"), Some("1990-01-01"));
        let merged = merge(&current, &profile(None, None));

        assert_eq!(merged.user_name.as_deref(), Some("Alice"));
        assert_eq!(merged.user_dob.as_deref(), Some("1990-01-01"));

        let merged = merge(&current, &profile(Some("Bob"), None));
        assert_eq!(merged.user_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut current = AppData::new();
        current.records.push(record("1", "A", 1));

        let mut imported = AppData::new();
        imported.records.push(record("1", "B", 1));
        imported.records.push(record("2", "C", 2));
        imported.user_name = Some("Imported".to_string());

        let once = merge(&current, &imported);
        let twice = merge(&once, &imported);

        assert_eq!(once, twice);
        assert_eq!(twice.records.len(), 2);
    }

    #[test]
    fn test_argument_order_sets_precedence() {
        let mut a = AppData::new();
        a.records.push(record("1", "from-a", 1));
        let mut b = AppData::new();
        b.records.push(record("1", "from-b", 1));

        assert_eq!(description(&merge(&a, &b).records[0]), "from-b");
        assert_eq!(description(&merge(&b, &a).records[0]), "from-a");
    }

    #[test]
    fn test_same_timestamp_keeps_first_seen_order() {
        let mut current = AppData::new();
        current.records.push(record("a", "x", 1));
        current.records.push(record("b", "x", 1));

        let mut imported = AppData::new();
        imported.records.push(record("c", "x", 1));
        imported.records.push(record("a", "y", 1));

        let merged = merge(&current, &imported);
        let ids: Vec<&str> = merged.records.iter().map(MedicalRecord::id).collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(description(&merged.records[0]), "y");
    }
}

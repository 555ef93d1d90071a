//! Data models for the decrypted vault document and its configuration
//!
//! The JSON shape (camelCase keys, records tagged by `"type"`) is part of the
//! encrypted payload format and must stay stable across releases.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Record variant discriminator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Vitals,
    BloodTest,
    Symptom,
    Vaccination,
}

/// Blood pressure, pulse, temperature and weight measured together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub systolic: f64,
    pub diastolic: f64,
    pub pulse: f64,
    pub temperature: f64,
    pub weight: f64,
}

/// Single measured value of a blood test panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BloodTestValue {
    pub name: String,
    /// Absent when the field was left blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_max: Option<f64>,
}

impl BloodTestValue {
    /// Whether the value falls outside whichever reference bounds are set.
    /// A missing value is never out of range.
    pub fn is_out_of_range(&self) -> bool {
        let Some(value) = self.value else {
            return false;
        };
        self.ref_min.is_some_and(|min| value < min) || self.ref_max.is_some_and(|max| value > max)
    }

    /// Reference range, only when both bounds are known
    pub fn reference_range(&self) -> Option<(f64, f64)> {
        self.ref_min.zip(self.ref_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BloodTest {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Panel name, e.g. "Complete blood count"
    pub name: String,
    #[serde(default)]
    pub values: Vec<BloodTestValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Symptom {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vaccination {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<DateTime<Utc>>,
}

impl Vaccination {
    /// Reminder is set and still ahead of `now`
    pub fn reminder_pending(&self, now: DateTime<Utc>) -> bool {
        self.reminder_date.is_some_and(|at| at > now)
    }
}

/// One entry in the medical history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MedicalRecord {
    Vitals(Vitals),
    BloodTest(BloodTest),
    Symptom(Symptom),
    Vaccination(Vaccination),
}

impl MedicalRecord {
    /// Generate an identifier for a newly created record
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn id(&self) -> &str {
        match self {
            MedicalRecord::Vitals(r) => &r.id,
            MedicalRecord::BloodTest(r) => &r.id,
            MedicalRecord::Symptom(r) => &r.id,
            MedicalRecord::Vaccination(r) => &r.id,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        match self {
            MedicalRecord::Vitals(r) => r.date,
            MedicalRecord::BloodTest(r) => r.date,
            MedicalRecord::Symptom(r) => r.date,
            MedicalRecord::Vaccination(r) => r.date,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            MedicalRecord::Vitals(r) => r.notes.as_deref(),
            MedicalRecord::BloodTest(r) => r.notes.as_deref(),
            MedicalRecord::Symptom(r) => r.notes.as_deref(),
            MedicalRecord::Vaccination(r) => r.notes.as_deref(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            MedicalRecord::Vitals(_) => RecordType::Vitals,
            MedicalRecord::BloodTest(_) => RecordType::BloodTest,
            MedicalRecord::Symptom(_) => RecordType::Symptom,
            MedicalRecord::Vaccination(_) => RecordType::Vaccination,
        }
    }
}

/// Time window for browsing the history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    /// Last 24 hours
    Day,
    /// Since Monday 00:00 of the current week
    Week,
    /// Since the 1st of the current month
    Month,
    /// Since January 1st of the current year
    Year,
    #[default]
    All,
}

impl TimePeriod {
    /// Inclusive lower bound of the window ending at `now`, in UTC
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let midnight =
            |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));

        match self {
            TimePeriod::Day => Some(now - Duration::hours(24)),
            TimePeriod::Week => {
                let back = i64::from(today.weekday().num_days_from_monday());
                midnight(today - Duration::days(back))
            }
            TimePeriod::Month => today.with_day(1).and_then(midnight),
            TimePeriod::Year => today.with_ordinal(1).and_then(midnight),
            TimePeriod::All => None,
        }
    }
}

/// Decrypted vault document (in-memory only, never persisted in clear)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    /// Records, newest first
    #[serde(default)]
    pub records: Vec<MedicalRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Date of birth as an ISO date or date-time string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_dob: Option<String>,
}

impl AppData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find record by ID
    pub fn find_by_id(&self, id: &str) -> Option<&MedicalRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn record_exists(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    /// First identifier that appears more than once, if any
    pub fn duplicate_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(MedicalRecord::id)
            .find(|id| !seen.insert(*id))
    }

    /// Stable sort, newest first
    pub fn sort_records(&mut self) {
        self.records.sort_by(|a, b| b.date().cmp(&a.date()));
    }

    /// Add a record, keeping newest-first order
    pub fn add_record(&mut self, record: MedicalRecord) -> VaultResult<()> {
        if self.record_exists(record.id()) {
            return Err(VaultError::DuplicateRecordId(record.id().to_string()));
        }
        self.records.push(record);
        self.sort_records();
        Ok(())
    }

    /// Replace the record with the same ID
    pub fn replace_record(&mut self, record: MedicalRecord) -> VaultResult<()> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or_else(|| VaultError::RecordNotFound(record.id().to_string()))?;
        *slot = record;
        self.sort_records();
        Ok(())
    }

    /// Remove record by ID, returning it
    pub fn remove_record(&mut self, id: &str) -> VaultResult<MedicalRecord> {
        let index = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| VaultError::RecordNotFound(id.to_string()))?;
        Ok(self.records.remove(index))
    }

    /// Overwrite both profile fields. Empty strings clear a field.
    pub fn set_profile(&mut self, name: &str, dob: &str) {
        self.user_name = Some(name.trim().to_string());
        self.user_dob = Some(dob.trim().to_string());
    }

    pub fn records_of_type(&self, record_type: RecordType) -> impl Iterator<Item = &MedicalRecord> {
        self.records
            .iter()
            .filter(move |r| r.record_type() == record_type)
    }

    /// Records dated inside `period`, ending at `now`
    pub fn records_in_period(&self, period: TimePeriod, now: DateTime<Utc>) -> Vec<&MedicalRecord> {
        match period.start(now) {
            None => self.records.iter().collect(),
            Some(start) => self
                .records
                .iter()
                .filter(|r| r.date() >= start && r.date() <= now)
                .collect(),
        }
    }

    /// Distinct, sorted names of every measured blood value
    pub fn blood_metric_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .records
            .iter()
            .filter_map(|r| match r {
                MedicalRecord::BloodTest(test) => Some(test.values.iter()),
                MedicalRecord::Vitals(_)
                | MedicalRecord::Symptom(_)
                | MedicalRecord::Vaccination(_) => None,
            })
            .flatten()
            .map(|v| v.name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.into_iter().collect()
    }
}

/// Vault configuration (non-sensitive, stored in plaintext)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Auto-lock timeout in seconds, 0 disables
    pub auto_lock_timeout_seconds: u64,

    /// Minimum password length accepted when creating the vault
    pub min_password_length: usize,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout_seconds: 300, // 5 minutes
            min_password_length: 1,
            log_filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn symptom(id: &str, date: DateTime<Utc>) -> MedicalRecord {
        MedicalRecord::Symptom(Symptom {
            id: id.to_string(),
            date,
            notes: None,
            description: "Cough".to_string(),
        })
    }

    #[test]
    fn test_parses_stored_document() {
        let json = r#"{
            "records": [
                {"id": "2024-05-01T10:00:00.000Z0.42", "type": "vitals", "date": "2024-05-01T10:00:00.000Z",
                 "notes": "", "systolic": 120, "diastolic": 80, "pulse": 64, "temperature": 36.6, "weight": 70.5},
                {"id": "b1", "type": "bloodTest", "date": "2024-04-01T08:00:00.000Z", "name": "CBC",
                 "values": [{"name": "Hemoglobin", "value": 150, "unit": "g/L", "refMin": 130, "refMax": 170},
                            {"name": "Ferritin", "unit": "ng/mL", "refMin": 15}]},
                {"id": "s1", "type": "symptom", "date": "2024-03-01T08:00:00.000Z", "description": "Fever"},
                {"id": "v1", "type": "vaccination", "date": "2024-02-01T08:00:00.000Z", "name": "Flu",
                 "reminderDate": "2025-02-01T08:00:00.000Z"}
            ],
            "userName": "Alice",
            "userDob": "1990-01-01T00:00:00.000Z"
        }"#;

        let data: AppData = serde_json::from_str(json).unwrap();

        assert_eq!(data.records.len(), 4);
        assert_eq!(data.user_name.as_deref(), Some("Alice"));
        assert_eq!(data.records[0].record_type(), RecordType::Vitals);
        assert_eq!(data.records[0].id(), "2024-05-01T10:00:00.000Z0.42");
        match &data.records[1] {
            MedicalRecord::BloodTest(test) => {
                assert_eq!(test.values[0].reference_range(), Some((130.0, 170.0)));
                assert!(!test.values[0].is_out_of_range());
                assert_eq!(test.values[1].value, None);
                assert!(!test.values[1].is_out_of_range());
            }
            other => panic!("Wrong record type: {:?}", other),
        }
        match &data.records[3] {
            MedicalRecord::Vaccination(v) => assert!(v.reminder_pending(at(2024, 6, 1, 0))),
            other => panic!("Wrong record type: {:?}", other),
        }
    }

    #[test]
    fn test_serializes_with_type_tag_and_camel_case() {
        let record = MedicalRecord::BloodTest(BloodTest {
            id: "b1".to_string(),
            date: at(2024, 1, 1, 0),
            notes: None,
            name: "Lipids".to_string(),
            values: vec![BloodTestValue {
                name: "LDL".to_string(),
                value: Some(4.1),
                unit: "mmol/L".to_string(),
                ref_min: None,
                ref_max: Some(3.0),
            }],
        });

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "bloodTest");
        assert_eq!(value["values"][0]["refMax"], 3.0);
        assert!(value.get("notes").is_none());
        assert!(value["values"][0].get("refMin").is_none());
        assert_eq!(value["values"][0]["value"], 4.1);
    }

    #[test]
    fn test_out_of_range() {
        let mut v = BloodTestValue {
            name: "Glucose".to_string(),
            value: Some(7.2),
            unit: "mmol/L".to_string(),
            ref_min: Some(3.9),
            ref_max: Some(5.5),
        };
        assert!(v.is_out_of_range());

        v.value = Some(5.0);
        assert!(!v.is_out_of_range());

        v.value = Some(3.0);
        v.ref_max = None;
        assert!(v.is_out_of_range());
        assert_eq!(v.reference_range(), None);

        v.value = None;
        assert!(!v.is_out_of_range());
    }

    #[test]
    fn test_add_keeps_newest_first_and_rejects_duplicates() {
        let mut data = AppData::new();
        data.add_record(symptom("old", at(2023, 1, 1, 0))).unwrap();
        data.add_record(symptom("new", at(2024, 1, 1, 0))).unwrap();
        data.add_record(symptom("mid", at(2023, 6, 1, 0))).unwrap();

        let ids: Vec<&str> = data.records.iter().map(MedicalRecord::id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let result = data.add_record(symptom("mid", at(2020, 1, 1, 0)));
        assert!(matches!(result, Err(VaultError::DuplicateRecordId(id)) if id == "mid"));
    }

    #[test]
    fn test_replace_and_remove() {
        let mut data = AppData::new();
        data.add_record(symptom("a", at(2023, 1, 1, 0))).unwrap();
        data.add_record(symptom("b", at(2023, 2, 1, 0))).unwrap();

        data.replace_record(symptom("a", at(2024, 1, 1, 0))).unwrap();
        assert_eq!(data.records[0].id(), "a");

        let removed = data.remove_record("b").unwrap();
        assert_eq!(removed.id(), "b");
        assert_eq!(data.records.len(), 1);

        assert!(matches!(data.remove_record("b"), Err(VaultError::RecordNotFound(_))));
        assert!(matches!(
            data.replace_record(symptom("zzz", at(2024, 1, 1, 0))),
            Err(VaultError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_id_detection() {
        let mut data = AppData::new();
        data.records.push(symptom("x", at(2023, 1, 1, 0)));
        data.records.push(symptom("y", at(2023, 1, 2, 0)));
        assert_eq!(data.duplicate_id(), None);

        data.records.push(symptom("x", at(2023, 1, 3, 0)));
        assert_eq!(data.duplicate_id(), Some("x"));
    }

    #[test]
    fn test_period_boundaries() {
        // Wednesday
        let now = at(2024, 5, 15, 12);

        assert_eq!(TimePeriod::Day.start(now), Some(at(2024, 5, 14, 12)));
        assert_eq!(TimePeriod::Week.start(now), Some(at(2024, 5, 13, 0)));
        assert_eq!(TimePeriod::Month.start(now), Some(at(2024, 5, 1, 0)));
        assert_eq!(TimePeriod::Year.start(now), Some(at(2024, 1, 1, 0)));
        assert_eq!(TimePeriod::All.start(now), None);

        // Sunday belongs to the week that started the previous Monday
        assert_eq!(TimePeriod::Week.start(at(2024, 5, 19, 9)), Some(at(2024, 5, 13, 0)));
    }

    #[test]
    fn test_records_in_period() {
        let now = at(2024, 5, 15, 12);
        let mut data = AppData::new();
        data.add_record(symptom("future", at(2024, 5, 16, 0))).unwrap();
        data.add_record(symptom("today", at(2024, 5, 15, 8))).unwrap();
        data.add_record(symptom("this-month", at(2024, 5, 2, 0))).unwrap();
        data.add_record(symptom("last-year", at(2023, 12, 31, 0))).unwrap();

        let ids = |period| -> Vec<String> {
            data.records_in_period(period, now)
                .into_iter()
                .map(|r| r.id().to_string())
                .collect()
        };

        assert_eq!(ids(TimePeriod::Day), vec!["today"]);
        assert_eq!(ids(TimePeriod::Month), vec!["today", "this-month"]);
        assert_eq!(ids(TimePeriod::All).len(), 4);
    }

    #[test]
    fn test_blood_metric_names() {
        let mut data = AppData::new();
        let value = |name: &str| BloodTestValue {
            name: name.to_string(),
            value: Some(1.0),
            unit: "u".to_string(),
            ref_min: None,
            ref_max: None,
        };
        data.records.push(MedicalRecord::BloodTest(BloodTest {
            id: "b1".to_string(),
            date: at(2024, 1, 1, 0),
            notes: None,
            name: "Panel".to_string(),
            values: vec![value(" Iron "), value("Ferritin"), value("  ")],
        }));
        data.records.push(MedicalRecord::BloodTest(BloodTest {
            id: "b2".to_string(),
            date: at(2024, 2, 1, 0),
            notes: None,
            name: "Panel".to_string(),
            values: vec![value("Iron")],
        }));
        data.records.push(symptom("s", at(2024, 3, 1, 0)));

        assert_eq!(data.blood_metric_names(), vec!["Ferritin", "Iron"]);
        assert_eq!(data.records_of_type(RecordType::BloodTest).count(), 2);
    }

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.auto_lock_timeout_seconds, 300);
        assert_eq!(config.min_password_length, 1);
        assert_eq!(config.log_filter, "info");
    }
}

//! Upstream record normalizer
//!
//! The statistics API does not keep its field names stable across datasets
//! and releases. Every canonical field is therefore described by an ordered
//! list of candidate keys, each paired with the reader that knows how to turn
//! that key's raw value into a number. The first candidate carrying a value
//! wins. Supporting a new upstream variant means adding a row to
//! [`FieldRules`], not another branch.

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{DistrictId, MetricRecord, Metrics};

/// Reasons a single raw record is dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// Envelope element is not a JSON object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A numeric field carried something that is not a number
    #[error("invalid number in field '{field}': {value}")]
    InvalidNumber { field: &'static str, value: String },

    /// A value parsed but falls outside what the field allows
    #[error("value out of range in field '{field}': {value}")]
    OutOfRange { field: &'static str, value: String },

    /// No year or month field present and undated records are rejected
    #[error("record carries no reporting period")]
    MissingPeriod,
}

/// How a raw value is read for the canonical field it feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reader {
    /// Non-negative whole number (JSON integer, integral float, or numeric string)
    Count,
    /// Non-negative decimal amount
    Decimal,
    /// Calendar year given directly
    Year,
    /// Financial-year label such as "2024-2025"; the first four characters are the year
    FinancialYear,
    /// Month number, or an English month name/abbreviation
    Month,
}

/// One candidate upstream key for a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub key: &'static str,
    pub reader: Reader,
}

const fn candidate(key: &'static str, reader: Reader) -> Candidate {
    Candidate { key, reader }
}

/// Ordered candidate keys per canonical field, first match wins
#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    pub district: &'static [&'static str],
    pub year: &'static [Candidate],
    pub month: &'static [Candidate],
    pub households_worked: &'static [Candidate],
    pub wages_paid: &'static [Candidate],
    pub works_completed: &'static [Candidate],
}

/// Field variants seen in the data.gov.in MGNREGA resources
pub const DEFAULT_RULES: FieldRules = FieldRules {
    district: &["district", "district_name", "districtname"],
    year: &[
        candidate("year", Reader::Year),
        candidate("financial_year", Reader::FinancialYear),
        candidate("fin_year", Reader::FinancialYear),
    ],
    month: &[
        candidate("month", Reader::Month),
        candidate("period", Reader::Month),
    ],
    households_worked: &[
        candidate("households_worked", Reader::Count),
        candidate("hh_worked", Reader::Count),
        candidate("persondays_generated", Reader::Count),
        candidate("total_households", Reader::Count),
    ],
    wages_paid: &[
        candidate("wages_paid", Reader::Decimal),
        candidate("total_wages", Reader::Decimal),
        candidate("expenditure", Reader::Decimal),
        candidate("total_expenditure", Reader::Decimal),
    ],
    works_completed: &[
        candidate("works_completed", Reader::Count),
        candidate("completed_works", Reader::Count),
        candidate("total_works", Reader::Count),
    ],
};

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Converts raw upstream records into [`MetricRecord`]s
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: FieldRules,
    reject_undated: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Normalizer {
    /// Creates a normalizer using the default rule table
    ///
    /// With `reject_undated` set, records lacking a year or month are
    /// rejected instead of being stamped with the current period.
    pub fn new(reject_undated: bool) -> Self {
        Self {
            rules: DEFAULT_RULES,
            reject_undated,
        }
    }

    /// Creates a normalizer with a custom rule table
    pub fn with_rules(rules: FieldRules, reject_undated: bool) -> Self {
        Self {
            rules,
            reject_undated,
        }
    }

    /// Normalizes one raw record for `target`
    ///
    /// # Returns
    /// * `Ok(Some(record))` - the record belongs to `target` and parsed cleanly
    /// * `Ok(None)` - the record names some other district
    /// * `Err(NormalizeError)` - the record is defective and must be skipped
    ///
    /// District matching is a case-insensitive substring test with spaces
    /// mapped to underscores, so `"Lucknow District"` matches `lucknow`.
    /// Records that carry no district field at all are kept.
    pub fn normalize(
        &self,
        raw: &Value,
        target: &DistrictId,
        now: DateTime<Utc>,
    ) -> Result<Option<MetricRecord>, NormalizeError> {
        let record = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

        if let Some(name) = self.district_name(record) {
            if !name.contains(&target.match_key()) {
                return Ok(None);
            }
        }

        let year = self.read_whole(record, self.rules.year)?.filter(|y| *y != 0);
        let month = self.read_whole(record, self.rules.month)?.filter(|m| *m != 0);

        if self.reject_undated && (year.is_none() || month.is_none()) {
            return Err(NormalizeError::MissingPeriod);
        }

        let year = match year {
            Some(y) => i32::try_from(y)
                .ok()
                .filter(|y| *y > 0)
                .ok_or_else(|| NormalizeError::OutOfRange {
                    field: "year",
                    value: y.to_string(),
                })?,
            None => now.year(),
        };
        let month = match month {
            Some(m) => u32::try_from(m)
                .ok()
                .filter(|m| (1..=12).contains(m))
                .ok_or_else(|| NormalizeError::OutOfRange {
                    field: "month",
                    value: m.to_string(),
                })?,
            None => now.month(),
        };

        let metrics = Metrics {
            households_worked: self.read_count(record, self.rules.households_worked)?,
            wages_paid: self.read_amount(record, self.rules.wages_paid)?,
            works_completed: self.read_count(record, self.rules.works_completed)?,
        };

        Ok(Some(MetricRecord {
            district: target.clone(),
            year,
            month,
            metrics,
            observed_at: now,
            synthetic: false,
        }))
    }

    /// Upstream district name, lowercased with spaces mapped to underscores
    fn district_name(&self, record: &Map<String, Value>) -> Option<String> {
        self.rules.district.iter().find_map(|key| {
            let text = match present(record, key)? {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            Some(text.to_lowercase().replace(' ', "_"))
        })
    }

    fn first_present<'a>(
        record: &'a Map<String, Value>,
        candidates: &[Candidate],
    ) -> Option<(Candidate, &'a Value)> {
        candidates
            .iter()
            .find_map(|c| present(record, c.key).map(|value| (*c, value)))
    }

    fn read_whole(
        &self,
        record: &Map<String, Value>,
        candidates: &[Candidate],
    ) -> Result<Option<i64>, NormalizeError> {
        Self::first_present(record, candidates)
            .map(|(candidate, value)| read_integer(candidate, value))
            .transpose()
    }

    fn read_count(
        &self,
        record: &Map<String, Value>,
        candidates: &[Candidate],
    ) -> Result<u64, NormalizeError> {
        match Self::first_present(record, candidates) {
            None => Ok(0),
            Some((candidate, value)) => {
                let n = read_integer(candidate, value)?;
                u64::try_from(n).map_err(|_| NormalizeError::OutOfRange {
                    field: candidate.key,
                    value: n.to_string(),
                })
            }
        }
    }

    fn read_amount(
        &self,
        record: &Map<String, Value>,
        candidates: &[Candidate],
    ) -> Result<f64, NormalizeError> {
        match Self::first_present(record, candidates) {
            None => Ok(0.0),
            Some((candidate, value)) => {
                let amount = read_decimal(candidate, value)?;
                if amount < 0.0 {
                    return Err(NormalizeError::OutOfRange {
                        field: candidate.key,
                        value: amount.to_string(),
                    });
                }
                Ok(amount)
            }
        }
    }
}

/// Returns the value under `key` unless it is absent, null, or an empty string
fn present<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        value => Some(value),
    }
}

fn invalid(candidate: Candidate, value: &Value) -> NormalizeError {
    NormalizeError::InvalidNumber {
        field: candidate.key,
        value: value.to_string(),
    }
}

fn read_integer(candidate: Candidate, value: &Value) -> Result<i64, NormalizeError> {
    match candidate.reader {
        Reader::FinancialYear => {
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            let prefix: String = text.chars().take(4).collect();
            prefix.parse().map_err(|_| invalid(candidate, value))
        }
        Reader::Month => match value {
            Value::String(s) => parse_whole(s)
                .or_else(|| month_from_name(s))
                .ok_or_else(|| invalid(candidate, value)),
            _ => whole_number(value).ok_or_else(|| invalid(candidate, value)),
        },
        Reader::Count | Reader::Year => {
            whole_number(value).ok_or_else(|| invalid(candidate, value))
        }
        Reader::Decimal => {
            let amount = read_decimal(candidate, value)?;
            integral(amount).ok_or_else(|| invalid(candidate, value))
        }
    }
}

fn read_decimal(candidate: Candidate, value: &Value) -> Result<f64, NormalizeError> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount
        .filter(|a| a.is_finite())
        .ok_or_else(|| invalid(candidate, value))
}

fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => parse_whole(s),
        _ => None,
    }
}

fn parse_whole(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(integral))
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Maps "Dec", "Sept", "December" (any case) to 12, 9, 12
fn month_from_name(s: &str) -> Option<i64> {
    let name = s.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| full.starts_with(&name))
        .map(|idx| idx as i64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    fn normalize(raw: Value, target: &str) -> Result<Option<MetricRecord>, NormalizeError> {
        Normalizer::default().normalize(&raw, &DistrictId::new(target), now())
    }

    fn metrics_of(raw: Value) -> Metrics {
        normalize(raw, "agra")
            .expect("record should normalize")
            .expect("record should match")
            .metrics
    }

    #[test]
    fn test_household_synonyms_resolve_to_same_value() {
        for key in [
            "households_worked",
            "hh_worked",
            "persondays_generated",
            "total_households",
        ] {
            let metrics = metrics_of(json!({ "district": "Agra", key: 4321 }));
            assert_eq!(metrics.households_worked, 4321, "synonym {key}");
        }
    }

    #[test]
    fn test_wage_synonyms_resolve_to_same_value() {
        for key in ["wages_paid", "total_wages", "expenditure", "total_expenditure"] {
            let metrics = metrics_of(json!({ "district": "Agra", key: "98765.25" }));
            assert!((metrics.wages_paid - 98765.25).abs() < 1e-9, "synonym {key}");
        }
    }

    #[test]
    fn test_works_synonyms_resolve_to_same_value() {
        for key in ["works_completed", "completed_works", "total_works"] {
            let metrics = metrics_of(json!({ "district": "Agra", key: 77 }));
            assert_eq!(metrics.works_completed, 77, "synonym {key}");
        }
    }

    #[test]
    fn test_missing_metrics_default_to_zero() {
        let metrics = metrics_of(json!({ "district": "Agra", "year": 2024, "month": 5 }));
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn test_first_synonym_wins() {
        let metrics = metrics_of(json!({
            "district": "Agra",
            "hh_worked": 10,
            "households_worked": 20,
            "total_households": 30,
        }));
        assert_eq!(metrics.households_worked, 20);
    }

    #[test]
    fn test_null_and_empty_values_fall_through_to_next_synonym() {
        let metrics = metrics_of(json!({
            "district": "Agra",
            "wages_paid": null,
            "total_wages": "",
            "expenditure": 500.5,
        }));
        assert!((metrics.wages_paid - 500.5).abs() < 1e-9);
    }

    #[test]
    fn test_present_zero_is_a_value() {
        let metrics = metrics_of(json!({
            "district": "Agra",
            "households_worked": 0,
            "hh_worked": 99,
        }));
        assert_eq!(metrics.households_worked, 0);
    }

    #[test]
    fn test_district_match_is_permissive_substring() {
        let record = normalize(json!({ "district": "Lucknow District", "year": 2024 }), "lucknow")
            .unwrap()
            .expect("Lucknow District should match lucknow");
        assert_eq!(record.district.as_str(), "lucknow");
    }

    #[test]
    fn test_district_match_maps_spaces_to_underscores() {
        let matched = normalize(
            json!({ "district_name": "SANT KABIR NAGAR" }),
            "sant_kabir_nagar",
        )
        .unwrap();
        assert!(matched.is_some());
    }

    #[test]
    fn test_district_fields_tried_in_order() {
        let matched = normalize(
            json!({ "districtname": "Agra", "district_name": "Varanasi" }),
            "agra",
        )
        .unwrap();
        assert!(matched.is_none(), "district_name precedes districtname");
    }

    #[test]
    fn test_other_district_is_filtered_not_rejected() {
        let result = normalize(json!({ "district": "Varanasi", "year": 2024 }), "agra");
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_record_without_district_is_kept() {
        let result = normalize(json!({ "year": 2024, "month": 2 }), "agra").unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_year_from_financial_year_prefix() {
        let record = normalize(json!({ "district": "Agra", "fin_year": "2023-2024", "month": 4 }), "agra")
            .unwrap()
            .unwrap();
        assert_eq!(record.year, 2023);
        assert_eq!(record.month, 4);

        let record = normalize(json!({ "district": "Agra", "financial_year": "2021-22" }), "agra")
            .unwrap()
            .unwrap();
        assert_eq!(record.year, 2021);
    }

    #[test]
    fn test_direct_year_takes_precedence_over_financial_year() {
        let record = normalize(
            json!({ "district": "Agra", "year": "2022", "fin_year": "2019-2020" }),
            "agra",
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.year, 2022);
    }

    #[test]
    fn test_month_falls_back_to_period() {
        let record = normalize(json!({ "district": "Agra", "year": 2024, "period": "11" }), "agra")
            .unwrap()
            .unwrap();
        assert_eq!(record.month, 11);
    }

    #[test]
    fn test_month_names_are_understood() {
        for (name, expected) in [("Dec", 12), ("january", 1), ("Sept", 9), ("AUGUST", 8)] {
            let record = normalize(json!({ "district": "Agra", "year": 2024, "month": name }), "agra")
                .unwrap()
                .unwrap();
            assert_eq!(record.month, expected, "month name {name}");
        }
    }

    #[test]
    fn test_missing_period_uses_current_year_and_month() {
        let record = normalize(json!({ "district": "Agra" }), "agra").unwrap().unwrap();
        assert_eq!(record.year, 2025);
        assert_eq!(record.month, 3);
        assert_eq!(record.observed_at, now());
    }

    #[test]
    fn test_missing_period_rejected_when_configured() {
        let normalizer = Normalizer::new(true);
        let result = normalizer.normalize(
            &json!({ "district": "Agra", "year": 2024 }),
            &DistrictId::new("agra"),
            now(),
        );
        assert_eq!(result, Err(NormalizeError::MissingPeriod));
    }

    #[test]
    fn test_non_numeric_metric_rejects_record() {
        let result = normalize(json!({ "district": "Agra", "households_worked": "lots" }), "agra");
        assert!(matches!(
            result,
            Err(NormalizeError::InvalidNumber { field: "households_worked", .. })
        ));
    }

    #[test]
    fn test_fractional_count_rejects_record() {
        let result = normalize(json!({ "district": "Agra", "works_completed": 12.5 }), "agra");
        assert!(matches!(result, Err(NormalizeError::InvalidNumber { .. })));
    }

    #[test]
    fn test_integral_float_count_is_accepted() {
        let metrics = metrics_of(json!({ "district": "Agra", "works_completed": 12.0 }));
        assert_eq!(metrics.works_completed, 12);
    }

    #[test]
    fn test_negative_metric_is_out_of_range() {
        let result = normalize(json!({ "district": "Agra", "total_wages": -5 }), "agra");
        assert!(matches!(result, Err(NormalizeError::OutOfRange { field: "total_wages", .. })));
    }

    #[test]
    fn test_month_outside_calendar_is_out_of_range() {
        let result = normalize(json!({ "district": "Agra", "year": 2024, "month": 13 }), "agra");
        assert!(matches!(result, Err(NormalizeError::OutOfRange { field: "month", .. })));
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        assert_eq!(normalize(json!("agra"), "agra"), Err(NormalizeError::NotAnObject));
        assert_eq!(normalize(json!([1, 2]), "agra"), Err(NormalizeError::NotAnObject));
    }

    #[test]
    fn test_custom_rules_are_additive() {
        const RULES: FieldRules = FieldRules {
            households_worked: &[
                candidate("households_worked", Reader::Count),
                candidate("hh_employed", Reader::Count),
            ],
            ..DEFAULT_RULES
        };
        let normalizer = Normalizer::with_rules(RULES, false);
        let record = normalizer
            .normalize(
                &json!({ "district": "Agra", "hh_employed": 31 }),
                &DistrictId::new("agra"),
                now(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(record.metrics.households_worked, 31);
    }
}

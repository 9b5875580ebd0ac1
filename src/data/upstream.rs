//! data.gov.in statistics API client
//!
//! Performs one bounded-time call per fetch, accepts the three envelope
//! shapes the API has been seen to return, and normalizes every record for
//! the requested district. A reachable upstream that yields nothing usable
//! produces the synthetic series; transport and parse failures are reported
//! as [`FetchOutcome::Failed`] so the caller can fall back to stale cache.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use super::normalize::Normalizer;
use super::{synthetic, DistrictId, MetricRecord};
use crate::config::Config;

/// Records requested by the diagnostic probe
const PROBE_LIMIT: u32 = 10;

/// Records echoed back by the diagnostic probe
const PROBE_SAMPLE_RECORDS: usize = 3;

/// Records scanned for district names by the diagnostic probe
const PROBE_DISTRICT_SCAN: usize = 50;

/// Distinct district names echoed back by the diagnostic probe
const PROBE_SAMPLE_DISTRICTS: usize = 10;

const NO_RECORDS: &[Value] = &[];

/// Classes of fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// Upstream did not answer within the request timeout
    Timeout,
    /// Network or HTTP-level error (connect, TLS, non-2xx status)
    RequestFailure,
    /// Anything else: malformed JSON, unexpected envelope shape
    UnexpectedFailure,
}

impl FetchFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchFailureKind::Timeout => "Timeout",
            FetchFailureKind::RequestFailure => "RequestFailure",
            FetchFailureKind::UnexpectedFailure => "UnexpectedFailure",
        }
    }
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FetchFailureKind::Timeout => "upstream timeout",
            FetchFailureKind::RequestFailure => "upstream request failed",
            FetchFailureKind::UnexpectedFailure => "unexpected upstream failure",
        };
        f.write_str(text)
    }
}

/// A failed upstream fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::UnexpectedFailure, message)
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchFailureKind::Timeout
        } else if err.is_decode() {
            FetchFailureKind::UnexpectedFailure
        } else {
            FetchFailureKind::RequestFailure
        };
        // The request URL carries the API key in its query string.
        Self::new(kind, err.without_url().to_string())
    }
}

impl From<serde_json::Error> for FetchFailure {
    fn from(err: serde_json::Error) -> Self {
        Self::unexpected(format!("malformed JSON envelope: {err}"))
    }
}

/// Why a fetch answered with the synthetic series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticReason {
    /// No API key configured; the upstream was not called
    NoApiKey,
    /// The envelope parsed but held no records
    EmptyEnvelope,
    /// Records arrived but none matched the district or all were rejected
    NoUsableRecords,
}

/// Result of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Real records for the district, newest period first
    Fetched(Vec<MetricRecord>),
    /// Nothing usable came back; carries the synthetic series instead
    FetchedEmpty {
        records: Vec<MetricRecord>,
        reason: SyntheticReason,
    },
    /// Transport or parse failure; no records
    Failed(FetchFailure),
}

/// Source of district records for the resolver
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, district: &DistrictId) -> FetchOutcome;
}

/// Where the record list was found in an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordsLocation {
    Records,
    Data,
    Bare,
    Missing,
}

impl RecordsLocation {
    fn describe(self) -> Option<&'static str> {
        match self {
            RecordsLocation::Records => Some("payload[\"records\"]"),
            RecordsLocation::Data => Some("payload[\"data\"]"),
            RecordsLocation::Bare => Some("payload (direct list)"),
            RecordsLocation::Missing => None,
        }
    }
}

/// Finds the record list in an upstream envelope
///
/// Tries an object's `records` key, then its `data` key, then a bare array.
/// An object with neither key is treated as empty. A record field holding
/// something other than an array, or a scalar envelope, is malformed.
pub fn extract_records(envelope: &Value) -> Result<(RecordsLocation, &[Value]), FetchFailure> {
    match envelope {
        Value::Array(items) => Ok((RecordsLocation::Bare, items.as_slice())),
        Value::Object(map) => {
            for (key, location) in [
                ("records", RecordsLocation::Records),
                ("data", RecordsLocation::Data),
            ] {
                if let Some(field) = map.get(key) {
                    return match field {
                        Value::Array(items) => Ok((location, items.as_slice())),
                        Value::Null => Ok((location, NO_RECORDS)),
                        other => Err(FetchFailure::unexpected(format!(
                            "envelope field '{key}' is {}, expected an array",
                            json_type(other)
                        ))),
                    };
                }
            }
            Ok((RecordsLocation::Missing, NO_RECORDS))
        }
        other => Err(FetchFailure::unexpected(format!(
            "envelope is {}, expected an object or array",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors from the diagnostic probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error(transparent)]
    Fetch(#[from] FetchFailure),
}

impl ProbeError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ProbeError::MissingApiKey => "MissingApiKey",
            ProbeError::Fetch(failure) => failure.kind.as_str(),
        }
    }
}

/// Shape summary of a raw upstream envelope, for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeReport {
    pub success: bool,
    pub url: String,
    pub response_type: &'static str,
    pub response_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_location: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<Value>,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_record_keys: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_records: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district_fields_found: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_districts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_response: Option<Value>,
}

impl EnvelopeReport {
    /// Summarizes `envelope` as received from `url`
    pub fn from_envelope(url: &str, envelope: &Value) -> Self {
        let (location, records) =
            extract_records(envelope).unwrap_or((RecordsLocation::Missing, NO_RECORDS));

        let total_count = envelope.as_object().map(|map| {
            map.get("total")
                .or_else(|| map.get("count"))
                .cloned()
                .unwrap_or_else(|| Value::from(records.len()))
        });

        let mut report = Self {
            success: true,
            url: url.to_string(),
            response_type: json_type(envelope),
            response_keys: envelope
                .as_object()
                .map(|map| map.keys().cloned().collect()),
            records_location: location.describe(),
            total_count,
            record_count: records.len(),
            first_record_keys: None,
            sample_records: None,
            district_fields_found: None,
            sample_districts: None,
            message: None,
            full_response: None,
        };

        let Some(first) = records.first() else {
            report.message = Some("No records found in API response".to_string());
            report.full_response = Some(envelope.clone());
            return report;
        };

        report.sample_records = Some(records.iter().take(PROBE_SAMPLE_RECORDS).cloned().collect());

        let district_fields: Vec<String> = match first.as_object() {
            Some(map) => {
                report.first_record_keys =
                    Some(Value::from(map.keys().cloned().collect::<Vec<_>>()));
                map.keys()
                    .filter(|key| key.to_lowercase().contains("district"))
                    .cloned()
                    .collect()
            }
            None => {
                report.first_record_keys = Some(Value::from("not a dict"));
                Vec::new()
            }
        };

        if !district_fields.is_empty() {
            let mut names = BTreeSet::new();
            for record in records.iter().take(PROBE_DISTRICT_SCAN) {
                for field in &district_fields {
                    match record.get(field) {
                        Some(Value::String(s)) if !s.is_empty() => {
                            names.insert(s.clone());
                        }
                        Some(Value::Number(n)) => {
                            names.insert(n.to_string());
                        }
                        _ => {}
                    }
                }
            }
            report.sample_districts =
                Some(names.into_iter().take(PROBE_SAMPLE_DISTRICTS).collect());
        }
        report.district_fields_found = Some(district_fields);

        report
    }
}

/// Client for the upstream statistics API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// HTTP client with the request timeout applied
    http_client: Client,
    /// Resource URL (allows override for testing)
    base_url: String,
    /// API key; absent means synthetic-only mode
    api_key: Option<String>,
    /// Records requested per call
    page_limit: u32,
    normalizer: Normalizer,
}

impl UpstreamClient {
    /// Creates a client from the service configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.upstream_url.clone(),
            api_key: config.api_key.clone(),
            page_limit: config.page_limit,
            normalizer: Normalizer::new(config.reject_undated),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetches and normalizes records for `district`
    ///
    /// # Behavior
    /// - Without an API key, returns the synthetic series without calling out
    /// - Issues a single GET; no retry
    /// - Timeout, HTTP errors and malformed envelopes yield `Failed`
    /// - An envelope that yields no usable records yields `FetchedEmpty`
    pub async fn fetch_records(&self, district: &DistrictId) -> FetchOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!(district = %district, "API key not set, serving synthetic series");
            return FetchOutcome::FetchedEmpty {
                records: synthetic::generate(district),
                reason: SyntheticReason::NoApiKey,
            };
        };

        info!(district = %district, url = %self.base_url, "fetching from upstream");

        let envelope = match self.get_envelope(api_key, self.page_limit).await {
            Ok(envelope) => envelope,
            Err(failure) => {
                error!(district = %district, kind = failure.kind.as_str(), error = %failure.message, "upstream fetch failed");
                return FetchOutcome::Failed(failure);
            }
        };

        match extract_records(&envelope) {
            Ok((_, records)) => self.collect(district, records, Utc::now()),
            Err(failure) => {
                error!(district = %district, error = %failure.message, "unusable upstream envelope");
                FetchOutcome::Failed(failure)
            }
        }
    }

    /// Normalizes raw records for `district`, skipping defective ones
    pub fn collect(
        &self,
        district: &DistrictId,
        raw_records: &[Value],
        now: DateTime<Utc>,
    ) -> FetchOutcome {
        if raw_records.is_empty() {
            warn!(district = %district, "upstream envelope held no records, serving synthetic series");
            return FetchOutcome::FetchedEmpty {
                records: synthetic::generate_at(district, now),
                reason: SyntheticReason::EmptyEnvelope,
            };
        }

        let mut matched = Vec::new();
        for (index, raw) in raw_records.iter().enumerate() {
            match self.normalizer.normalize(raw, district, now) {
                Ok(Some(record)) => matched.push(record),
                Ok(None) => {}
                Err(e) => warn!(district = %district, index, error = %e, "skipping upstream record"),
            }
        }

        if matched.is_empty() {
            warn!(
                district = %district,
                received = raw_records.len(),
                "no usable upstream records, serving synthetic series"
            );
            return FetchOutcome::FetchedEmpty {
                records: synthetic::generate_at(district, now),
                reason: SyntheticReason::NoUsableRecords,
            };
        }

        matched.sort_by_key(MetricRecord::period_desc);
        info!(district = %district, count = matched.len(), "normalized upstream records");
        FetchOutcome::Fetched(matched)
    }

    /// Requests a small page and summarizes the raw envelope
    pub async fn probe(&self) -> Result<EnvelopeReport, ProbeError> {
        let api_key = self.api_key.as_deref().ok_or(ProbeError::MissingApiKey)?;
        let envelope = self.get_envelope(api_key, PROBE_LIMIT).await?;
        Ok(EnvelopeReport::from_envelope(&self.base_url, &envelope))
    }

    async fn get_envelope(&self, api_key: &str, limit: u32) -> Result<Value, FetchFailure> {
        let limit = limit.to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("api-key", api_key),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("offset", "0"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MetricsSource for UpstreamClient {
    async fn fetch(&self, district: &DistrictId) -> FetchOutcome {
        self.fetch_records(district).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn client() -> UpstreamClient {
        UpstreamClient::new(&Config::default()).expect("client should build")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_records_key_takes_priority_over_data() {
        let envelope = json!({
            "records": [{ "district": "Agra" }],
            "data": [{ "district": "Lucknow" }, { "district": "Varanasi" }],
        });
        let (location, records) = extract_records(&envelope).unwrap();
        assert_eq!(location, RecordsLocation::Records);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["district"], "Agra");
    }

    #[test]
    fn test_data_key_used_when_records_absent() {
        let envelope = json!({ "data": [{ "district": "Agra" }, { "district": "Agra" }] });
        let (location, records) = extract_records(&envelope).unwrap();
        assert_eq!(location, RecordsLocation::Data);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_bare_array_envelope() {
        let envelope = json!([{ "district": "Agra" }]);
        let (location, records) = extract_records(&envelope).unwrap();
        assert_eq!(location, RecordsLocation::Bare);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_object_without_record_keys_is_empty() {
        let envelope = json!({ "status": "ok", "total": 0 });
        let (location, records) = extract_records(&envelope).unwrap();
        assert_eq!(location, RecordsLocation::Missing);
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_envelopes_are_unexpected_failures() {
        let failure = extract_records(&json!({ "records": "oops" })).unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::UnexpectedFailure);

        let failure = extract_records(&json!("not an envelope")).unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::UnexpectedFailure);
    }

    #[test]
    fn test_collect_empty_envelope_yields_synthetic_series() {
        let district = DistrictId::new("agra");
        match client().collect(&district, &[], now()) {
            FetchOutcome::FetchedEmpty { records, reason } => {
                assert_eq!(reason, SyntheticReason::EmptyEnvelope);
                assert_eq!(records, synthetic::generate_at(&district, now()));
            }
            other => panic!("expected synthetic series, got {other:?}"),
        }
    }

    #[test]
    fn test_collect_with_no_matching_district_yields_synthetic_series() {
        let raw = vec![json!({ "district": "Varanasi", "year": 2024, "month": 1 })];
        match client().collect(&DistrictId::new("agra"), &raw, now()) {
            FetchOutcome::FetchedEmpty { records, reason } => {
                assert_eq!(reason, SyntheticReason::NoUsableRecords);
                assert_eq!(records.len(), 12);
            }
            other => panic!("expected synthetic series, got {other:?}"),
        }
    }

    #[test]
    fn test_collect_skips_rejected_records_and_keeps_the_rest() {
        let raw = vec![
            json!({ "district": "Agra", "year": 2024, "month": 1, "households_worked": "n/a" }),
            json!("garbage"),
            json!({ "district": "Agra", "year": 2024, "month": 2, "households_worked": 10 }),
            json!({ "district": "Lucknow", "year": 2024, "month": 3 }),
        ];
        match client().collect(&DistrictId::new("agra"), &raw, now()) {
            FetchOutcome::Fetched(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].month, 2);
                assert_eq!(records[0].metrics.households_worked, 10);
            }
            other => panic!("expected fetched records, got {other:?}"),
        }
    }

    #[test]
    fn test_collect_orders_newest_period_first() {
        let raw = vec![
            json!({ "district": "Agra", "year": 2023, "month": 11 }),
            json!({ "district": "Agra", "year": 2024, "month": 2 }),
            json!({ "district": "Agra", "year": 2023, "month": 12 }),
        ];
        let FetchOutcome::Fetched(records) = client().collect(&DistrictId::new("agra"), &raw, now())
        else {
            panic!("expected fetched records");
        };
        let periods: Vec<_> = records.iter().map(|r| (r.year, r.month)).collect();
        assert_eq!(periods, vec![(2024, 2), (2023, 12), (2023, 11)]);
    }

    #[tokio::test]
    async fn test_no_api_key_serves_synthetic_without_network() {
        let config = Config {
            upstream_url: "http://127.0.0.1:9/unreachable".to_string(),
            ..Config::default()
        };
        let client = UpstreamClient::new(&config).unwrap();
        match client.fetch_records(&DistrictId::new("agra")).await {
            FetchOutcome::FetchedEmpty { records, reason } => {
                assert_eq!(reason, SyntheticReason::NoApiKey);
                assert_eq!(records.len(), 12);
            }
            other => panic!("expected synthetic series, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_requires_api_key() {
        let err = client().probe().await.unwrap_err();
        assert!(matches!(err, ProbeError::MissingApiKey));
        assert_eq!(err.error_type(), "MissingApiKey");
    }

    #[test]
    fn test_envelope_report_describes_records() {
        let envelope = json!({
            "total": 3,
            "records": [
                { "district_name": "AGRA", "state_name": "UTTAR PRADESH", "month": "Dec" },
                { "district_name": "LUCKNOW", "state_name": "UTTAR PRADESH", "month": "Dec" },
                { "district_name": "AGRA", "state_name": "UTTAR PRADESH", "month": "Nov" },
                { "district_name": "VARANASI", "state_name": "UTTAR PRADESH", "month": "Nov" },
            ],
        });
        let report = EnvelopeReport::from_envelope("https://example.test/resource", &envelope);

        assert!(report.success);
        assert_eq!(report.response_type, "object");
        assert_eq!(report.records_location, Some("payload[\"records\"]"));
        assert_eq!(report.total_count, Some(json!(3)));
        assert_eq!(report.record_count, 4);
        assert_eq!(report.sample_records.as_ref().map(Vec::len), Some(3));
        assert_eq!(report.district_fields_found, Some(vec!["district_name".to_string()]));
        assert_eq!(
            report.sample_districts,
            Some(vec!["AGRA".to_string(), "LUCKNOW".to_string(), "VARANASI".to_string()])
        );
        assert!(report.full_response.is_none());
    }

    #[test]
    fn test_envelope_report_echoes_empty_envelope() {
        let envelope = json!({ "status": "ok", "count": 0 });
        let report = EnvelopeReport::from_envelope("https://example.test/resource", &envelope);

        assert_eq!(report.record_count, 0);
        assert_eq!(report.total_count, Some(json!(0)));
        assert_eq!(report.message.as_deref(), Some("No records found in API response"));
        assert_eq!(report.full_response, Some(envelope));
        assert!(report.records_location.is_none());
    }

    #[test]
    fn test_failure_kind_names() {
        assert_eq!(FetchFailureKind::Timeout.as_str(), "Timeout");
        let failure = FetchFailure::new(FetchFailureKind::RequestFailure, "connection refused");
        assert_eq!(failure.to_string(), "upstream request failed: connection refused");
    }
}

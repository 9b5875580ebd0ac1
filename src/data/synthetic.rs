//! Deterministic placeholder series for offline and demo mode
//!
//! Used when no API key is configured or when the upstream envelope yields
//! nothing for a district. Values depend only on the district id, so the same
//! district always gets the same series; the periods follow the calendar.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use super::{DistrictId, MetricRecord, Metrics};

/// Number of trailing months generated
pub const SERIES_LEN: u32 = 12;

/// Generates the trailing 12-month series for `district` ending this month
pub fn generate(district: &DistrictId) -> Vec<MetricRecord> {
    generate_at(district, Utc::now())
}

/// Generates the trailing 12-month series ending at the month of `now`
///
/// Records are ordered newest period first and stamped `observed_at = now`.
pub fn generate_at(district: &DistrictId, now: DateTime<Utc>) -> Vec<MetricRecord> {
    let seed = district_seed(district.as_str());
    let first_of_month = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap_or_else(|| now.date_naive());

    (0..SERIES_LEN)
        .filter_map(|i| {
            let period = first_of_month.checked_sub_months(Months::new(i))?;
            let step = i64::from(i);
            Some(MetricRecord {
                district: district.clone(),
                year: period.year(),
                month: period.month(),
                metrics: Metrics {
                    households_worked: clamp_count(5_000 + (seed % 3_000) as i64 - step * 50),
                    wages_paid: round_rupees(
                        1_200_000.0 + (seed % 500_000) as f64 - step as f64 * 10_000.0,
                    ),
                    works_completed: clamp_count(200 + (seed % 100) as i64 - step * 3),
                },
                observed_at: now,
                synthetic: true,
            })
        })
        .collect()
}

/// Stable across processes and platforms, unlike `std`'s randomized hasher
fn district_seed(district: &str) -> u64 {
    district
        .bytes()
        .fold(0_u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64))
}

fn clamp_count(n: i64) -> u64 {
    n.max(0) as u64
}

fn round_rupees(amount: f64) -> f64 {
    (amount.max(0.0) * 100.0).round() / 100.0
}

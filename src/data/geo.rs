//! Coarse coordinate to district lookup
//!
//! A handful of districts with hand-drawn bounding boxes. Good enough to
//! preselect a district in the dashboard; not a real reverse geocoder.

use serde::Serialize;

/// A district bounding box, bounds inclusive
#[derive(Debug, Clone, Copy)]
pub struct DistrictBounds {
    pub id: &'static str,
    pub name_hi: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl DistrictBounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Boxes checked in order; the first containing box wins
///
/// Gwalior lies outside Uttar Pradesh but is kept for the border region.
pub static DISTRICT_BOUNDS: [DistrictBounds; 4] = [
    DistrictBounds {
        id: "gwalior",
        name_hi: "ग्वालियर",
        min_lat: 25.0,
        max_lat: 26.0,
        min_lon: 78.0,
        max_lon: 80.0,
    },
    DistrictBounds {
        id: "lucknow",
        name_hi: "लखनऊ",
        min_lat: 26.0,
        max_lat: 27.5,
        min_lon: 80.5,
        max_lon: 82.0,
    },
    DistrictBounds {
        id: "agra",
        name_hi: "आगरा",
        min_lat: 26.5,
        max_lat: 27.5,
        min_lon: 77.5,
        max_lon: 78.5,
    },
    DistrictBounds {
        id: "varanasi",
        name_hi: "वाराणसी",
        min_lat: 24.5,
        max_lat: 25.5,
        min_lon: 82.5,
        max_lon: 83.5,
    },
];

/// Result body of a successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoMatch {
    pub district_id: &'static str,
    pub name_hi: &'static str,
}

/// Finds the first district whose box contains the point
pub fn lookup_district(lat: f64, lon: f64) -> Option<GeoMatch> {
    DISTRICT_BOUNDS
        .iter()
        .find(|bounds| bounds.contains(lat, lon))
        .map(|bounds| GeoMatch {
            district_id: bounds.id,
            name_hi: bounds.name_hi,
        })
}

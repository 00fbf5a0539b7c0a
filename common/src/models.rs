use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Canonical weather record returned to clients and stored in both cache tiers.
///
/// Optional fields are `None` (JSON `null`) when the provider omitted them;
/// a missing reading is never reported as zero.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct WeatherRecord {
    pub city: String,
    pub country: Option<String>,
    pub coords: Coordinates,
    pub temp_c: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub weather_main: Option<String>,
    pub weather_desc: Option<String>,
    pub icon_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default, ToSchema)]
pub struct Coordinates {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Which cache tier served a lookup
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheTier {
    Local,
    Remote,
    None,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Local => "LOCAL",
            CacheTier::Remote => "REMOTE",
            CacheTier::None => "NONE",
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheTier::None)
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness payload for `/health`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since the process started
    pub uptime: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_readings_serialize_as_null() {
        let record = WeatherRecord {
            city: "Paris".into(),
            country: None,
            coords: Coordinates::default(),
            temp_c: Some(21.5),
            feels_like: None,
            humidity: None,
            wind_speed: None,
            weather_main: None,
            weather_desc: None,
            icon_url: None,
            fetched_at: Utc::now(),
            source: "openweathermap".into(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["temp_c"], 21.5);
        assert!(json["wind_speed"].is_null());
        assert!(json["coords"]["lat"].is_null());
    }

    #[test]
    fn cache_tier_wire_names() {
        assert_eq!(serde_json::to_string(&CacheTier::Remote).unwrap(), "\"REMOTE\"");
        assert_eq!(CacheTier::None.to_string(), "NONE");
        assert!(!CacheTier::None.is_hit());
    }
}

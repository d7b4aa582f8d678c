use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Weather conditions as reported by the weather service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherPayload {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub is_rain: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    /// Short condition text; stands in for `description` when that is absent.
    #[serde(default)]
    pub main: Option<String>,
}

/// Air quality as reported by the pollution service. Older producers send
/// `pm25`, newer ones `pm2_5`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirPayload {
    #[serde(default)]
    pub pm25: Option<f64>,
    #[serde(default)]
    pub pm2_5: Option<f64>,
    #[serde(default)]
    pub pm25_category: Option<String>,
}

/// Normalized environmental reading for one district (or the whole run).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature: Option<f64>,
    pub is_rain: Option<bool>,
    pub description: Option<String>,
    pub pm25: Option<f64>,
    pub pm25_category: Option<String>,
}

impl EnvironmentReading {
    /// Resolve payload aliases once: `pm25` before `pm2_5`, `description`
    /// before `main`. Empty strings count as absent.
    pub fn from_payloads(weather: Option<&WeatherPayload>, air: Option<&AirPayload>) -> Self {
        let description = weather.and_then(|w| {
            non_empty(w.description.as_deref()).or_else(|| non_empty(w.main.as_deref()))
        });

        Self {
            temperature: weather.and_then(|w| w.temperature),
            is_rain: weather.and_then(|w| w.is_rain),
            description: description.map(str::to_string),
            pm25: air.and_then(|a| a.pm25.or(a.pm2_5)),
            pm25_category: air
                .and_then(|a| non_empty(a.pm25_category.as_deref()))
                .map(str::to_string),
        }
    }

    /// Fill the gaps in this reading from `fallback`. Weather fields merge one
    /// by one; the PM2.5 value and its category only move together.
    pub fn fill_from(mut self, fallback: &EnvironmentReading) -> Self {
        self.temperature = self.temperature.or(fallback.temperature);
        self.is_rain = self.is_rain.or(fallback.is_rain);
        if self.description.is_none() {
            self.description = fallback.description.clone();
        }
        if self.pm25.is_none() && self.pm25_category.is_none() {
            self.pm25 = fallback.pm25;
            self.pm25_category = fallback.pm25_category.clone();
        }
        self
    }

    pub fn is_raining(&self) -> bool {
        self.is_rain.unwrap_or(false)
    }

    /// Temperature rounded to whole degrees, ties to even.
    pub fn rounded_temperature(&self) -> Option<i64> {
        self.temperature.map(|t| t.round_ties_even() as i64)
    }

    /// The supplied PM2.5 category, else one derived from the reading.
    pub fn air_category(&self) -> Option<String> {
        self.pm25_category
            .clone()
            .or_else(|| self.pm25.map(|pm| pm25_category(pm).to_string()))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// EPA-style PM2.5 breakpoints (µg/m³).
pub fn pm25_category(pm25: f64) -> &'static str {
    if pm25 <= 12.0 {
        "Good"
    } else if pm25 <= 35.0 {
        "Moderate"
    } else if pm25 <= 55.0 {
        "Unhealthy (Sensitive)"
    } else {
        "Unhealthy"
    }
}

/// Environment readings for a run: an optional city-wide reading plus
/// per-district overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentMap {
    global: Option<EnvironmentReading>,
    districts: HashMap<String, EnvironmentReading>,
}

impl EnvironmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same reading for every district.
    pub fn uniform(reading: EnvironmentReading) -> Self {
        Self::default().with_global(reading)
    }

    pub fn with_global(mut self, reading: EnvironmentReading) -> Self {
        self.global = Some(reading);
        self
    }

    pub fn with_district(mut self, district: impl Into<String>, reading: EnvironmentReading) -> Self {
        self.insert_district(district, reading);
        self
    }

    pub fn insert_district(&mut self, district: impl Into<String>, reading: EnvironmentReading) {
        self.districts.insert(district.into(), reading);
    }

    /// District reading, falling back to the global one. `None` means no
    /// data: every confirmation check stays unconfirmed.
    pub fn for_district(&self, district: &str) -> Option<&EnvironmentReading> {
        self.districts.get(district).or(self.global.as_ref())
    }

    /// A map holding only what applies to `district`.
    pub fn scoped_to(&self, district: &str) -> EnvironmentMap {
        match self.for_district(district) {
            Some(reading) => EnvironmentMap::default().with_district(district, reading.clone()),
            None => EnvironmentMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm25_breakpoints() {
        assert_eq!(pm25_category(12.0), "Good");
        assert_eq!(pm25_category(12.1), "Moderate");
        assert_eq!(pm25_category(35.0), "Moderate");
        assert_eq!(pm25_category(55.0), "Unhealthy (Sensitive)");
        assert_eq!(pm25_category(55.5), "Unhealthy");
    }

    #[test]
    fn test_pm25_alias_first_present_wins() {
        let both = AirPayload {
            pm25: Some(40.0),
            pm2_5: Some(90.0),
            pm25_category: None,
        };
        let reading = EnvironmentReading::from_payloads(None, Some(&both));
        assert_eq!(reading.pm25, Some(40.0));

        let new_style = AirPayload {
            pm25: None,
            pm2_5: Some(90.0),
            pm25_category: None,
        };
        let reading = EnvironmentReading::from_payloads(None, Some(&new_style));
        assert_eq!(reading.pm25, Some(90.0));
        assert_eq!(reading.air_category().as_deref(), Some("Unhealthy"));
    }

    #[test]
    fn test_description_falls_back_to_main() {
        let weather = WeatherPayload {
            description: Some("".into()),
            main: Some("Light rain".into()),
            ..Default::default()
        };
        let reading = EnvironmentReading::from_payloads(Some(&weather), None);
        assert_eq!(reading.description.as_deref(), Some("Light rain"));
    }

    #[test]
    fn test_rounding_ties_to_even() {
        let reading = EnvironmentReading {
            temperature: Some(18.5),
            ..Default::default()
        };
        assert_eq!(reading.rounded_temperature(), Some(18));
        let reading = EnvironmentReading {
            temperature: Some(27.6),
            ..Default::default()
        };
        assert_eq!(reading.rounded_temperature(), Some(28));
    }

    #[test]
    fn test_fill_from_keeps_air_value_and_category_together() {
        let global = EnvironmentReading {
            temperature: Some(20.0),
            is_rain: Some(true),
            description: Some("Rain".into()),
            pm25: Some(80.0),
            pm25_category: Some("Unhealthy".into()),
        };
        let local = EnvironmentReading {
            temperature: Some(31.0),
            pm25: Some(40.0),
            ..Default::default()
        }
        .fill_from(&global);

        assert_eq!(local.temperature, Some(31.0));
        assert_eq!(local.is_rain, Some(true));
        assert_eq!(local.description.as_deref(), Some("Rain"));
        assert_eq!(local.pm25, Some(40.0));
        assert_eq!(local.pm25_category, None);
        assert_eq!(local.air_category().as_deref(), Some("Unhealthy (Sensitive)"));
    }

    #[test]
    fn test_district_lookup_prefers_district_over_global() {
        let global = EnvironmentReading {
            temperature: Some(20.0),
            ..Default::default()
        };
        let local = EnvironmentReading {
            temperature: Some(31.0),
            ..Default::default()
        };
        let map = EnvironmentMap::uniform(global).with_district("Hillview", local);
        assert_eq!(map.for_district("Hillview").unwrap().temperature, Some(31.0));
        assert_eq!(map.for_district("Riverside").unwrap().temperature, Some(20.0));
        assert!(EnvironmentMap::new().for_district("Riverside").is_none());
    }
}

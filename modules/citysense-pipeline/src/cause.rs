use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use citysense_common::{CauseTagSet, EnvironmentReading};

use crate::traits::{CauseTagger, ZeroShotClassifier};

/// Heat complaints are corroborated at or above this temperature (°C).
pub const HOT_THRESHOLD_C: f64 = 28.0;

/// Cold complaints are corroborated at or below this temperature (°C).
pub const COLD_THRESHOLD_C: f64 = 10.0;

/// Pollution complaints are corroborated at or above this PM2.5 (µg/m³).
pub const POOR_AIR_PM25: f64 = 35.0;

static WEATHER_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:rain|storm|fog|heat|cold|snow)\b").expect("valid regex")
});

/// Validate text-inferred causes against observed conditions and render the
/// surviving ones as a newsfeed suffix.
///
/// Returns `""` when nothing is corroborated, otherwise
/// `" Context: <phrase> and <phrase>."`. A missing reading confirms nothing.
pub fn infer_context(
    tags: &CauseTagSet,
    district: &str,
    environment: Option<&EnvironmentReading>,
    message: &str,
) -> String {
    let phrases = confirmed_phrases(tags, district, environment, message);
    if phrases.is_empty() {
        return String::new();
    }
    format!(" Context: {}.", phrases.join(" and "))
}

/// The individual context phrases, in rain, heat, cold, air order. When no
/// hypothesis is corroborated, a message that literally mentions the weather
/// gets a neutral description of current conditions instead.
pub fn confirmed_phrases(
    tags: &CauseTagSet,
    district: &str,
    environment: Option<&EnvironmentReading>,
    message: &str,
) -> Vec<String> {
    let Some(env) = environment else {
        return Vec::new();
    };

    let temp = env.rounded_temperature();
    let mut parts = Vec::new();

    if tags.has_family("weather: rain") && env.is_raining() {
        parts.push(match temp {
            Some(t) => format!("rain in {district} ({t}°C)"),
            None => format!("rain in {district}"),
        });
    }

    if let Some(t) = temp {
        let raw = env.temperature.unwrap_or_default();
        if tags.has_family("weather: heat") && raw >= HOT_THRESHOLD_C {
            parts.push(format!("hot conditions ({t}°C)"));
        }
        if tags.has_family("weather: cold") && raw <= COLD_THRESHOLD_C {
            parts.push(format!("cold conditions ({t}°C)"));
        }
    }

    if tags.mentions("air quality") {
        if let Some(pm) = env.pm25.filter(|pm| *pm >= POOR_AIR_PM25) {
            if let Some(category) = env.air_category() {
                parts.push(format!("poor air ({category}, PM2.5={pm:.0})"));
            }
        }
    }

    if parts.is_empty() && mentions_weather(message) {
        if let Some(desc) = env.description.as_deref() {
            let desc = desc.to_lowercase();
            parts.push(match temp {
                Some(t) => format!("{desc} ({t}°C)"),
                None => desc,
            });
        }
    }

    parts
}

/// Whole-word, case-insensitive weather keyword check.
pub fn mentions_weather(message: &str) -> bool {
    WEATHER_WORDS.is_match(message)
}

/// Cause tagging over any zero-shot classifier in multi-label mode.
pub struct ZeroShotCauseTagger {
    classifier: Arc<dyn ZeroShotClassifier>,
}

impl ZeroShotCauseTagger {
    pub fn new(classifier: Arc<dyn ZeroShotClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl CauseTagger for ZeroShotCauseTagger {
    async fn cause_tags(
        &self,
        text: &str,
        taxonomy: &[&str],
        threshold: f64,
    ) -> Result<CauseTagSet> {
        let result = self.classifier.zero_shot(text, taxonomy, true).await?;
        Ok(CauseTagSet::from_scores(
            result.pairs().map(|(label, score)| (label.to_string(), score)),
            threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, f64)]) -> CauseTagSet {
        pairs.iter().map(|(l, s)| (*l, *s)).collect()
    }

    fn reading(temperature: Option<f64>, is_rain: Option<bool>) -> EnvironmentReading {
        EnvironmentReading {
            temperature,
            is_rain,
            ..Default::default()
        }
    }

    #[test]
    fn test_rain_confirmed_with_temperature() {
        let env = reading(Some(18.0), Some(true));
        let ctx = infer_context(
            &tags(&[("weather: rain", 0.9)]),
            "Riverside",
            Some(&env),
            "Bus stop flooded",
        );
        assert_eq!(ctx, " Context: rain in Riverside (18°C).");
    }

    #[test]
    fn test_rain_without_temperature_is_district_only() {
        let env = reading(None, Some(true));
        let ctx = infer_context(&tags(&[("weather: rain", 0.9)]), "Riverside", Some(&env), "");
        assert_eq!(ctx, " Context: rain in Riverside.");
    }

    #[test]
    fn test_rain_rejected_when_dry() {
        let env = reading(Some(18.0), Some(false));
        let ctx = infer_context(&tags(&[("weather: rain", 0.9)]), "Riverside", Some(&env), "");
        assert_eq!(ctx, "");
    }

    #[test]
    fn test_heat_and_cold_thresholds() {
        let heat = tags(&[("weather: heat", 0.7)]);
        let cold = tags(&[("weather: cold", 0.7)]);

        assert_eq!(
            confirmed_phrases(&heat, "D", Some(&reading(Some(28.0), None)), ""),
            vec!["hot conditions (28°C)"]
        );
        assert!(confirmed_phrases(&heat, "D", Some(&reading(Some(27.9), None)), "").is_empty());
        assert_eq!(
            confirmed_phrases(&cold, "D", Some(&reading(Some(10.0), None)), ""),
            vec!["cold conditions (10°C)"]
        );
        assert!(confirmed_phrases(&cold, "D", Some(&reading(Some(10.4), None)), "").is_empty());
        assert!(confirmed_phrases(&heat, "D", Some(&reading(None, None)), "").is_empty());
    }

    #[test]
    fn test_poor_air_uses_supplied_category() {
        let env = EnvironmentReading {
            pm25: Some(80.0),
            pm25_category: Some("Unhealthy".into()),
            ..Default::default()
        };
        let ctx = infer_context(
            &tags(&[("air quality: pollution", 0.6)]),
            "Riverside",
            Some(&env),
            "",
        );
        assert!(ctx.contains("poor air (Unhealthy, PM2.5=80)"));
    }

    #[test]
    fn test_poor_air_derives_category() {
        let env = EnvironmentReading {
            pm25: Some(40.0),
            ..Default::default()
        };
        let phrases =
            confirmed_phrases(&tags(&[("air quality: pollution", 0.6)]), "D", Some(&env), "");
        assert_eq!(phrases, vec!["poor air (Unhealthy (Sensitive), PM2.5=40)"]);
    }

    #[test]
    fn test_clean_air_rejects_pollution_hypothesis() {
        let env = EnvironmentReading {
            pm25: Some(34.9),
            ..Default::default()
        };
        assert!(
            confirmed_phrases(&tags(&[("air quality: pollution", 0.6)]), "D", Some(&env), "")
                .is_empty()
        );
    }

    #[test]
    fn test_multiple_confirmations_joined_with_and() {
        let env = EnvironmentReading {
            temperature: Some(30.2),
            is_rain: Some(true),
            pm25: Some(60.0),
            ..Default::default()
        };
        let ctx = infer_context(
            &tags(&[
                ("weather: rain", 0.8),
                ("weather: heat", 0.5),
                ("air quality: pollution", 0.5),
            ]),
            "Hillview",
            Some(&env),
            "",
        );
        assert_eq!(
            ctx,
            " Context: rain in Hillview (30°C) and hot conditions (30°C) and poor air (Unhealthy, PM2.5=60)."
        );
    }

    #[test]
    fn test_weather_keyword_fallback() {
        let env = EnvironmentReading {
            temperature: Some(12.0),
            is_rain: Some(false),
            description: Some("Patchy Fog".into()),
            ..Default::default()
        };
        let ctx = infer_context(&CauseTagSet::default(), "Harbour", Some(&env), "Thick FOG on the bridge");
        assert_eq!(ctx, " Context: patchy fog (12°C).");
    }

    #[test]
    fn test_fallback_needs_whole_word_and_description() {
        let env = EnvironmentReading {
            description: Some("Sunny".into()),
            ..Default::default()
        };
        // "brain" and "colder" are not weather words.
        assert_eq!(infer_context(&CauseTagSet::default(), "D", Some(&env), "brain colder"), "");

        let no_desc = reading(Some(12.0), None);
        assert_eq!(infer_context(&CauseTagSet::default(), "D", Some(&no_desc), "rain again"), "");
    }

    #[test]
    fn test_fallback_skipped_when_something_confirmed() {
        let env = EnvironmentReading {
            temperature: Some(18.0),
            is_rain: Some(true),
            description: Some("Rain".into()),
            ..Default::default()
        };
        let phrases =
            confirmed_phrases(&tags(&[("weather: rain", 0.9)]), "Riverside", Some(&env), "rain");
        assert_eq!(phrases, vec!["rain in Riverside (18°C)"]);
    }

    #[test]
    fn test_missing_environment_confirms_nothing() {
        let ctx = infer_context(
            &tags(&[("weather: rain", 0.9), ("air quality: pollution", 0.9)]),
            "Nowhere",
            None,
            "rain and smog",
        );
        assert_eq!(ctx, "");
    }
}

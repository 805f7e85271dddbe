use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::TrailRecord;

/// Structured trip announcement posted into a group chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripCard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub stats: TripStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_warning: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub gear_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fun_fact: Option<String>,
    /// Only set on recommendation cards listing several trails.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_empty")]
    pub routes: Vec<RouteLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TripStats {
    #[serde(default, deserialize_with = "loose_string")]
    pub dist: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub elev: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteLine {
    pub name: String,
    pub dist: String,
}

/// Models sometimes emit `"dist": 15.1` instead of `"dist": "15.1km"`.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// `null` reads as an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// Outermost brace span, across lines.
static JSON_SPAN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

impl TripCard {
    /// Find a trip card embedded in chat content.
    ///
    /// Takes the outermost `{...}` span and accepts it only when it is a
    /// JSON object carrying both `title` and `stats`.
    pub fn from_message_content(content: &str) -> Option<Self> {
        let span = JSON_SPAN_REGEX.find(content)?;
        let value: serde_json::Value = serde_json::from_str(span.as_str()).ok()?;
        let obj = value.as_object()?;
        if !obj.contains_key("title") || !obj.contains_key("stats") {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Build a card from trail data alone, for when generation fails.
    pub fn fallback(trail: &TrailRecord, date: Option<&str>, hazards: &[String]) -> Self {
        let summary = match date {
            Some(d) if !d.trim().is_empty() => {
                format!("Trip to {} planned for {}.", trail.name, d.trim())
            }
            _ => format!("Trip to {} is being planned.", trail.name),
        };

        let weather_warning = if hazards.is_empty() {
            None
        } else {
            Some(format!("Recent reports mention: {}", hazards.join(", ")))
        };

        let mut gear = vec![
            "Water".to_string(),
            "Snacks".to_string(),
            "Rain layer".to_string(),
        ];
        if hazards.iter().any(|h| h == "snow" || h == "ice") {
            gear.push("Microspikes".to_string());
        }
        if trail.length_km >= 12.0 {
            gear.push("Headlamp".to_string());
        }

        let fun_fact = trail
            .features
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| format!("Known for: {}", f.replace(',', ", ").replace('_', " ")));

        Self {
            title: format!("Trip Plan: {}", trail.name),
            summary: Some(summary),
            stats: TripStats {
                dist: Some(trail.distance_label()),
                elev: Some(trail.elevation_label()),
            },
            weather_warning,
            gear_required: gear,
            fun_fact,
            routes: Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"title\":{:?},\"stats\":{{}}}}", self.title))
    }
}

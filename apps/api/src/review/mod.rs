// Counselor review: one parameterized listing over `counselor_diary_view`
// plus the comment and assignment writes. Reads go straight to the backend;
// only deletes pass through the sync engine.

pub mod handlers;

use chrono::NaiveDate;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer};

use crate::backend::DateRange;
use crate::models::diary::{ReviewEntry, UrgencyLevel};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyFilter {
    High,
    Medium,
    Low,
    /// No tier, or a value that is not a tier.
    Unset,
}

/// Query string of `GET /api/v1/diaries`. Empty parameters mean "no filter".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub visibility: Option<Visibility>,
    pub emotion: Option<String>,
    /// Matches `assigned_counselor` exactly.
    pub counselor: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub urgency: Option<UrgencyFilter>,
    /// Case-insensitive substring of the author's username.
    pub username: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ReviewQuery {
    /// Rejects dates the backend could not compare as calendar days.
    pub fn validate(&self) -> Result<(), String> {
        let from = parse_day("from", self.from.as_deref())?;
        let to = parse_day("to", self.to.as_deref())?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(format!("from ({from}) is after to ({to})"));
            }
        }
        Ok(())
    }

    pub fn date_range(&self) -> DateRange {
        DateRange {
            from: non_empty(self.from.as_deref()).map(str::to_string),
            to: non_empty(self.to.as_deref()).map(str::to_string),
        }
    }

    pub fn matches(&self, entry: &ReviewEntry) -> bool {
        let visible = entry.is_visible_to_user.unwrap_or(false);
        let visibility_ok = match self.visibility.unwrap_or_default() {
            Visibility::All => true,
            Visibility::Visible => visible,
            Visibility::Hidden => !visible,
        };
        if !visibility_ok {
            return false;
        }

        if let Some(emotion) = non_empty(self.emotion.as_deref()) {
            if entry.emotion != emotion {
                return false;
            }
        }

        if let Some(counselor) = non_empty(self.counselor.as_deref()) {
            if entry.assigned_counselor.as_deref() != Some(counselor) {
                return false;
            }
        }

        if let Some(filter) = self.urgency {
            let tier = entry.urgency_level.as_deref().and_then(UrgencyLevel::parse);
            let urgency_ok = match filter {
                UrgencyFilter::High => tier == Some(UrgencyLevel::High),
                UrgencyFilter::Medium => tier == Some(UrgencyLevel::Medium),
                UrgencyFilter::Low => tier == Some(UrgencyLevel::Low),
                UrgencyFilter::Unset => tier.is_none(),
            };
            if !urgency_ok {
                return false;
            }
        }

        if let Some(needle) = non_empty(self.username.as_deref()) {
            let needle = needle.to_lowercase();
            let found = entry
                .line_username
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }

        let range = self.date_range();
        if range.from.as_deref().is_some_and(|from| entry.date.as_str() < from) {
            return false;
        }
        if range.to.as_deref().is_some_and(|to| entry.date.as_str() > to) {
            return false;
        }
        true
    }

    /// Applies the predicate, keeping the backend's newest-first order.
    pub fn apply(&self, entries: Vec<ReviewEntry>) -> Vec<ReviewEntry> {
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// `?urgency=` and friends mean "unset", not an unknown variant.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => T::deserialize(value.into_deserializer()).map(Some),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_day(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("{field} must be a YYYY-MM-DD date, got '{raw}'")),
    }
}

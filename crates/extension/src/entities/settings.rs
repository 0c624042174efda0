use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use breakwise_auth::UserId;

/// Reminder preferences pulled from the backend and mirrored into local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Owner of these settings
    pub user_id: UserId,
    /// Minutes of work between break prompts
    pub reminder_interval_minutes: u32,
    /// Length of a break in minutes
    pub break_duration_minutes: u32,
    /// Suggest an exercise during breaks
    #[serde(default = "default_true")]
    pub exercises_enabled: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub sound_enabled: bool,
    /// Remote modification time; local storage never moves backwards on it
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl UserSettings {
    /// Settings a user gets before saving any preference.
    pub fn defaults_for(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            reminder_interval_minutes: 50,
            break_duration_minutes: 5,
            exercises_enabled: true,
            notifications_enabled: true,
            sound_enabled: false,
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Whether storing `incoming` over `self` would replace newer data with older data.
    pub fn is_newer_than(&self, incoming: &UserSettings) -> bool {
        self.user_id == incoming.user_id && self.updated_at > incoming.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn newer_only_applies_to_same_user() {
        let mut stored = UserSettings::defaults_for("u1");
        stored.updated_at = Utc::now();
        let mut older = stored.clone();
        older.updated_at = stored.updated_at - Duration::minutes(5);

        assert!(stored.is_newer_than(&older));
        assert!(!older.is_newer_than(&stored));

        older.user_id = "u2".into();
        assert!(!stored.is_newer_than(&older));
    }

    #[test]
    fn missing_flags_deserialize_with_defaults() {
        let json = r#"{
            "user_id": "u1",
            "reminder_interval_minutes": 30,
            "break_duration_minutes": 3,
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let settings: UserSettings = serde_json::from_str(json).unwrap();
        assert!(settings.exercises_enabled);
        assert!(settings.notifications_enabled);
        assert!(!settings.sound_enabled);
    }
}

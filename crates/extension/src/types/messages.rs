//! Messages UI surfaces post to the background context.

use serde::{Deserialize, Serialize};

/// Fire-and-forget requests; the sender never waits for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessage {
    /// Pull remote settings into local storage.
    SyncSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_settings_wire_form() {
        let json = serde_json::to_string(&ExtensionMessage::SyncSettings).unwrap();
        assert_eq!(json, r#"{"type":"SYNC_SETTINGS"}"#);

        let parsed: ExtensionMessage = serde_json::from_str(r#"{"type":"SYNC_SETTINGS"}"#).unwrap();
        assert_eq!(parsed, ExtensionMessage::SyncSettings);
    }
}

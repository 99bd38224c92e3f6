//! Conversation activity types.
//!
//! A trimmed-down activity model: enough for a workflow to send and receive
//! messages, prompt with choices, and receive sign-in tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// Kind of activity exchanged with the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    #[default]
    Message,
    Event,
    Typing,
    EndOfConversation,
}

/// One inbound or outbound conversation activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub conversation_id: String,
    /// Text to speak on voice channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
    /// Structured payload (event values, card submissions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Activity {
    /// A plain text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Message,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Copy of this activity addressed to the given conversation.
    pub fn in_conversation(mut self, channel_id: &str, conversation_id: &str) -> Self {
        self.channel_id = channel_id.to_string();
        self.conversation_id = conversation_id.to_string();
        self
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

impl From<&str> for Activity {
    fn from(text: &str) -> Self {
        Self::message(text)
    }
}

impl From<String> for Activity {
    fn from(text: String) -> Self {
        Self::message(text)
    }
}

/// Reference returned by the transport for a sent activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub id: String,
}

/// Result of a sign-in dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub connection_name: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// A selectable choice in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl From<&str> for Choice {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
            synonyms: Vec::new(),
        }
    }
}

impl From<String> for Choice {
    fn from(value: String) -> Self {
        Self {
            value,
            synonyms: Vec::new(),
        }
    }
}

/// Options passed to prompt dialogs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_prompt: Option<Activity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

impl From<&str> for PromptOptions {
    fn from(text: &str) -> Self {
        Activity::message(text).into()
    }
}

impl From<String> for PromptOptions {
    fn from(text: String) -> Self {
        Activity::message(text).into()
    }
}

impl From<Activity> for PromptOptions {
    fn from(activity: Activity) -> Self {
        Self {
            prompt: Some(activity),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_activity_json() {
        let activity = Activity::message("hi").in_conversation("test", "c1");
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(
            json,
            json!({"type": "message", "text": "hi", "channelId": "test", "conversationId": "c1"})
        );
    }

    #[test]
    fn test_prompt_options_from_text() {
        let options = PromptOptions::from("say something");
        assert_eq!(options.prompt.unwrap().text(), "say something");
        assert!(options.choices.is_empty());
    }

    #[test]
    fn test_text_defaults_to_empty() {
        let activity = Activity {
            activity_type: ActivityType::Event,
            ..Activity::default()
        };
        assert_eq!(activity.text(), "");
    }
}

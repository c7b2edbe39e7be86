//! crates/momentbox_core/src/session.rs
//!
//! The per-user AI conversation session: mode, role-tagged history, and the
//! photo queue. The session lives in its own database row keyed by user and
//! is written with a compare-and-swap version so concurrent requests cannot
//! silently clobber each other.
//!
//! History turns are a tagged union of text and blob-descriptor parts.
//! `normalize_history` accepts the looser shapes older clients produced
//! (bare role/content pairs, parts as plain strings, structured blob
//! objects) and flattens them into the union. Normalization is idempotent:
//! running it over already-normalized output yields identical turns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The coach persona prompt seeded at the start of every general-chat
/// session.
pub const COACH_SYSTEM_PROMPT: &str = "You are a warm, encouraging diary coach. \
Ask the user about their day, listen closely, and gently draw out details and \
feelings they can put into a diary entry. Keep replies short and conversational.";

/// The fixed model acknowledgement that pairs with the system prompt.
pub const COACH_ACK: &str = "Understood - starting as your diary coach.";

/// The prompt sent alongside each photo during a photo session.
pub const PHOTO_PROMPT: &str = "Look at this photo and start a short, friendly \
conversation about it. Ask the user one question about the moment it captures.";

/// The forced transition message sent when the photo queue is exhausted.
pub const PHOTO_WRAP_UP_PROMPT: &str =
    "Alright, we're done talking about the photos. How was the rest of your day?";

/// Appended to the diary when the generative service fails on a photo turn.
pub const PHOTO_ERROR_MESSAGE: &str =
    "I can't process this image right now. Please move on to the next photo.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Idle,
    GeneralChat,
    PhotoSession,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Idle => "idle",
            SessionMode::GeneralChat => "general_chat",
            SessionMode::PhotoSession => "photo_session",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SessionMode::Idle),
            "general_chat" => Some(SessionMode::GeneralChat),
            "photo_session" => Some(SessionMode::PhotoSession),
            _ => None,
        }
    }
}

/// One part of a turn: either plain text or a flattened blob descriptor.
/// Producers emit this union directly; there is no runtime shape-sniffing
/// once a history has passed through `normalize_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnPart {
    Text { text: String },
    Blob { blob: String },
}

impl TurnPart {
    pub fn text(s: impl Into<String>) -> Self {
        TurnPart::Text { text: s.into() }
    }

    pub fn blob(descriptor: impl Into<String>) -> Self {
        TurnPart::Blob {
            blob: descriptor.into(),
        }
    }
}

/// A role-tagged message turn. Roles are kept as strings because stored
/// histories predate the current role vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub parts: Vec<TurnPart>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "user".to_string(),
            parts: vec![TurnPart::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "model".to_string(),
            parts: vec![TurnPart::text(text)],
        }
    }

    /// Concatenated text content of the turn, ignoring blob parts.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                TurnPart::Text { text } => Some(text.as_str()),
                TurnPart::Blob { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The embedded conversation state for one user's coach interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub mode: SessionMode,
    pub history: Vec<ChatTurn>,
    pub selected_photos: Vec<String>,
    pub current_photo_index: i32,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            mode: SessionMode::Idle,
            history: Vec::new(),
            selected_photos: Vec::new(),
            current_photo_index: -1,
        }
    }
}

impl ChatSession {
    /// A fresh general-chat session with the two-turn seed history.
    pub fn general_chat() -> Self {
        Self {
            mode: SessionMode::GeneralChat,
            history: seed_history(),
            selected_photos: Vec::new(),
            current_photo_index: -1,
        }
    }

    /// A fresh photo session positioned at the first photo.
    pub fn photo_session(photos: Vec<String>) -> Self {
        Self {
            mode: SessionMode::PhotoSession,
            history: Vec::new(),
            selected_photos: photos,
            current_photo_index: 0,
        }
    }

    /// The photo the session currently points at, when in bounds.
    pub fn current_photo(&self) -> Option<&str> {
        if self.current_photo_index < 0 {
            return None;
        }
        self.selected_photos
            .get(self.current_photo_index as usize)
            .map(String::as_str)
    }

    pub fn is_last_photo(&self) -> bool {
        !self.selected_photos.is_empty()
            && self.current_photo_index as usize == self.selected_photos.len() - 1
    }
}

/// A session row as stored: the state plus its compare-and-swap version.
#[derive(Debug, Clone)]
pub struct ChatSessionRecord {
    pub session: ChatSession,
    pub version: i64,
}

impl Default for ChatSessionRecord {
    fn default() -> Self {
        Self {
            session: ChatSession::default(),
            version: 0,
        }
    }
}

/// The fixed two-turn seed every general-chat history starts from.
pub fn seed_history() -> Vec<ChatTurn> {
    vec![
        ChatTurn::user(COACH_SYSTEM_PROMPT),
        ChatTurn::model(COACH_ACK),
    ]
}

/// Flattens a stored history value into normalized turns.
///
/// Accepted turn shapes, oldest first:
/// - `{"role": r, "content": c}` - one text part.
/// - `{"role": r, "parts": [...]}` where each part may be a bare string,
///   `{"text": ...}`, or `{"blob": <string or object>}`. Blob objects are
///   flattened to their compact JSON as the descriptor.
///
/// Anything unrecognizable is dropped rather than propagated. Applying the
/// function to its own output is a no-op.
pub fn normalize_history(raw: &Value) -> Vec<ChatTurn> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    let mut turns = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(role) = obj.get("role").and_then(Value::as_str) else {
            continue;
        };

        let parts = if let Some(parts) = obj.get("parts").and_then(Value::as_array) {
            parts.iter().filter_map(normalize_part).collect()
        } else if let Some(content) = obj.get("content").and_then(Value::as_str) {
            vec![TurnPart::text(content)]
        } else {
            Vec::new()
        };

        turns.push(ChatTurn {
            role: role.to_string(),
            parts,
        });
    }
    turns
}

fn normalize_part(part: &Value) -> Option<TurnPart> {
    match part {
        Value::String(s) => Some(TurnPart::text(s.clone())),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                Some(TurnPart::text(text))
            } else if let Some(blob) = map.get("blob") {
                let descriptor = match blob {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(TurnPart::blob(descriptor))
            } else {
                // An unknown structured part is flattened to its compact JSON.
                Some(TurnPart::blob(part.to_string()))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_bare_role_content_pairs() {
        let raw = json!([
            {"role": "user", "content": "hello"},
            {"role": "model", "content": "hi there"},
        ]);
        let turns = normalize_history(&raw);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("hello"));
        assert_eq!(turns[1], ChatTurn::model("hi there"));
    }

    #[test]
    fn flattens_string_parts_and_blob_objects() {
        let raw = json!([
            {"role": "user", "parts": ["plain string", {"text": "typed"}]},
            {"role": "user", "parts": [{"blob": {"mime_type": "image/jpeg", "size": 123}}]},
        ]);
        let turns = normalize_history(&raw);
        assert_eq!(
            turns[0].parts,
            vec![TurnPart::text("plain string"), TurnPart::text("typed")]
        );
        match &turns[1].parts[0] {
            TurnPart::Blob { blob } => {
                assert!(blob.contains("image/jpeg"));
            }
            other => panic!("expected blob part, got {other:?}"),
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = json!([
            {"role": "user", "content": "legacy shape"},
            {"role": "user", "parts": ["bare", {"blob": {"mime_type": "audio/wav"}}]},
            {"role": "model", "parts": [{"text": "already normal"}]},
        ]);
        let once = normalize_history(&raw);
        let reserialized = serde_json::to_value(&once).unwrap();
        let twice = normalize_history(&reserialized);
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn drops_unrecognizable_items() {
        let raw = json!([42, "loose string", {"no_role": true}, {"role": "user", "content": "kept"}]);
        let turns = normalize_history(&raw);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0], ChatTurn::user("kept"));
    }

    #[test]
    fn current_photo_tracks_index() {
        let mut session = ChatSession::photo_session(vec!["a.jpg".into(), "b.jpg".into()]);
        assert_eq!(session.current_photo(), Some("a.jpg"));
        assert!(!session.is_last_photo());
        session.current_photo_index += 1;
        assert_eq!(session.current_photo(), Some("b.jpg"));
        assert!(session.is_last_photo());
        session.current_photo_index += 1;
        assert_eq!(session.current_photo(), None);
    }
}

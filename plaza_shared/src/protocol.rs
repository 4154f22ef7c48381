//! Wire protocol.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Payload fields the sender omits take their defaults, so a sparse client is
//! still understood; a frame that fails to decode is dropped by the reader.

use std::{collections::BTreeMap, fmt};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    appearance::{AppearanceDescriptor, AppearancePatch},
    sheet::SheetPayload,
};

/// Chat lines are cut to this many characters.
pub const MAX_CHAT_CHARS: usize = 200;

const SESSION_ID_LEN: usize = 20;

/// Identifies one connected session for the lifetime of its connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new_unique() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        SessionId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First five characters, used as a fallback display name.
    pub fn short(&self) -> String {
        self.0.chars().take(5).collect()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// Connection-time credentials. Missing fields get server defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<AppearancePatch>,
}

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMsg {
    Hello(Handshake),
    Move {
        #[serde(default)]
        dx: i64,
        #[serde(default)]
        dy: i64,
    },
    Chat {
        #[serde(default)]
        text: String,
    },
    SheetRegister(SheetPayload),
    SheetGet {
        #[serde(default)]
        hash: String,
    },
    SetAppearance(AppearancePatch),
}

impl ClientMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMsg::Hello(_) => "hello",
            ClientMsg::Move { .. } => "move",
            ClientMsg::Chat { .. } => "chat",
            ClientMsg::SheetRegister(_) => "sheet_register",
            ClientMsg::SheetGet { .. } => "sheet_get",
            ClientMsg::SetAppearance(_) => "set_appearance",
        }
    }
}

/// One session as seen in a world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub x: i64,
    pub y: i64,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub appearance: AppearanceDescriptor,
}

/// Full replacement view of every live session.
pub type WorldSnapshot = BTreeMap<SessionId, SessionView>;

/// Relayed chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRelay {
    pub from: String,
    pub sid: SessionId,
    pub text: String,
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    Welcome { sid: SessionId },
    World(WorldSnapshot),
    Chat(ChatRelay),
    SheetBytes(SheetPayload),
}

impl ServerMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMsg::Welcome { .. } => "welcome",
            ServerMsg::World(_) => "world",
            ServerMsg::Chat(_) => "chat",
            ServerMsg::SheetBytes(_) => "sheet_bytes",
        }
    }
}

/// Cuts chat text to [`MAX_CHAT_CHARS`]; `None` when nothing is left to send.
pub fn clamp_chat(text: &str) -> Option<String> {
    let text: String = text.chars().take(MAX_CHAT_CHARS).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_event_names() {
        let json = serde_json::to_value(ClientMsg::Move { dx: 3, dy: -1 }).unwrap();
        assert_eq!(json["event"], "move");
        assert_eq!(json["data"]["dx"], 3);

        let msg: ClientMsg =
            serde_json::from_str(r#"{"event":"sheet_get","data":{"hash":"abc"}}"#).unwrap();
        assert_eq!(msg, ClientMsg::SheetGet { hash: "abc".into() });
        assert_eq!(msg.event_name(), "sheet_get");
    }

    #[test]
    fn sparse_payloads_take_defaults() {
        let msg: ClientMsg = serde_json::from_str(r#"{"event":"move","data":{"dx":4}}"#).unwrap();
        assert_eq!(msg, ClientMsg::Move { dx: 4, dy: 0 });

        let msg: ClientMsg = serde_json::from_str(r#"{"event":"hello","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMsg::Hello(Handshake::default()));
    }

    #[test]
    fn world_snapshot_is_keyed_by_sid() {
        let mut world = WorldSnapshot::new();
        world.insert(
            SessionId::from("abc"),
            SessionView {
                x: 1,
                y: 2,
                name: "a".into(),
                color: "#fff".into(),
                appearance: AppearanceDescriptor::default(),
            },
        );
        let json = serde_json::to_value(ServerMsg::World(world)).unwrap();
        assert_eq!(json["event"], "world");
        assert_eq!(json["data"]["abc"]["x"], 1);
        assert_eq!(json["data"]["abc"]["appearance"]["cols"], 9);
    }

    #[test]
    fn chat_is_clamped_by_characters() {
        assert_eq!(clamp_chat(""), None);
        let long = "é".repeat(250);
        let clamped = clamp_chat(&long).unwrap();
        assert_eq!(clamped.chars().count(), MAX_CHAT_CHARS);
    }

    #[test]
    fn session_ids_are_unique_and_short_name_is_five_chars() {
        let a = SessionId::new_unique();
        let b = SessionId::new_unique();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 20);
        assert_eq!(a.short().len(), 5);
    }
}

//! Inbound wire protocol: envelope shape and command decoding.
//!
//! Frames are text JSON `{ "type": <tag>, "data"?: <payload> }`. Decoding maps
//! the string tag onto a closed enum so dispatch is an exhaustive match.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque track reference; the media server resolves it into a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw frame envelope before per-tag payload decoding.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Outbound frames share the same envelope shape.
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    pub tag: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Payload of a `Play` command: wholesale queue replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayRequest {
    #[serde(rename = "ItemIds")]
    pub item_ids: Vec<TrackId>,
    #[serde(rename = "StartIndex", default)]
    pub start_index: Option<usize>,
    #[serde(rename = "ControllingUserId", default)]
    pub controlling_user_id: Option<String>,
}

/// Playstate sub-commands understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaystateCommand {
    Seek,
    PlayPause,
    Stop,
    NextTrack,
    PreviousTrack,
}

impl PlaystateCommand {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Seek" => Some(Self::Seek),
            "PlayPause" => Some(Self::PlayPause),
            "Stop" => Some(Self::Stop),
            "NextTrack" => Some(Self::NextTrack),
            "PreviousTrack" => Some(Self::PreviousTrack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PlaystatePayload {
    #[serde(rename = "Command")]
    command: String,
    #[serde(rename = "SeekPositionTicks", default)]
    seek_position_ticks: Option<i64>,
}

/// Decoded `Playstate` command. Position ticks are 100 ns units.
#[derive(Debug, Clone, Copy)]
pub struct PlaystateRequest {
    pub command: PlaystateCommand,
    pub seek_position_ticks: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralCommand {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Arguments", default)]
    pub arguments: Option<Value>,
}

/// A decoded inbound message, one per frame.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Play(PlayRequest),
    Playstate(PlaystateRequest),
    GeneralCommand(GeneralCommand),
    KeepAlive,
    /// Recognized envelope, unrecognized tag or sub-command. Logged, dropped.
    Unknown { tag: String },
}

/// Decode one text frame into an [`InboundMessage`].
///
/// Malformed JSON (or a payload that does not match its tag's shape) is a
/// [`DecodeError`]; callers drop the frame and keep the link alive.
pub fn decode(text: &str) -> Result<InboundMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data = envelope.data.unwrap_or(Value::Null);
    let msg = match envelope.tag.as_str() {
        "Play" => InboundMessage::Play(serde_json::from_value(data)?),
        "Playstate" => {
            let payload: PlaystatePayload = serde_json::from_value(data)?;
            match PlaystateCommand::from_tag(&payload.command) {
                Some(command) => InboundMessage::Playstate(PlaystateRequest {
                    command,
                    seek_position_ticks: payload.seek_position_ticks,
                }),
                None => InboundMessage::Unknown {
                    tag: format!("Playstate/{}", payload.command),
                },
            }
        }
        "GeneralCommand" => InboundMessage::GeneralCommand(serde_json::from_value(data)?),
        "KeepAlive" => InboundMessage::KeepAlive,
        other => InboundMessage::Unknown {
            tag: other.to_string(),
        },
    };
    Ok(msg)
}

/// Serialize an outbound `{type, data?}` frame to its text form.
pub fn encode(tag: &str, data: Option<Value>) -> String {
    serde_json::to_string(&OutboundFrame { tag, data })
        .unwrap_or_else(|_| format!("{{\"type\":\"{tag}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_play_with_start_index() {
        let frame = r#"{"type":"Play","data":{"ItemIds":["a","b"],"StartIndex":1,"ControllingUserId":"u1"}}"#;
        let msg = decode(frame).unwrap();
        match msg {
            InboundMessage::Play(play) => {
                assert_eq!(play.item_ids, vec![TrackId("a".into()), TrackId("b".into())]);
                assert_eq!(play.start_index, Some(1));
                assert_eq!(play.controlling_user_id.as_deref(), Some("u1"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decodes_playstate_seek_ticks() {
        let frame = r#"{"type":"Playstate","data":{"Command":"Seek","SeekPositionTicks":50000000}}"#;
        match decode(frame).unwrap() {
            InboundMessage::Playstate(req) => {
                assert_eq!(req.command, PlaystateCommand::Seek);
                assert_eq!(req.seek_position_ticks, Some(50_000_000));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let frame = r#"{"type":"SyncPlay","data":{"Whatever":1}}"#;
        match decode(frame).unwrap() {
            InboundMessage::Unknown { tag } => assert_eq!(tag, "SyncPlay"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_playstate_command_is_not_an_error() {
        let frame = r#"{"type":"Playstate","data":{"Command":"Rewind"}}"#;
        match decode(frame).unwrap() {
            InboundMessage::Unknown { tag } => assert_eq!(tag, "Playstate/Rewind"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn keepalive_without_data() {
        match decode(r#"{"type":"KeepAlive"}"#).unwrap() {
            InboundMessage::KeepAlive => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_a_decode_error() {
        assert!(decode("not json").is_err());
        // Tag recognized but payload shape wrong.
        assert!(decode(r#"{"type":"Play","data":{"ItemIds":"oops"}}"#).is_err());
    }

    #[test]
    fn encode_omits_missing_data() {
        assert_eq!(encode("KeepAlive", None), r#"{"type":"KeepAlive"}"#);
        let frame = encode("Other", Some(serde_json::json!({"A": 1})));
        assert_eq!(frame, r#"{"type":"Other","data":{"A":1}}"#);
    }
}

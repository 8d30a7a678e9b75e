use crate::tempo::TempoState;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

pub const PASSWORD_FIELD: &str = "password";
pub const CODE_FIELD: &str = "code";
pub const TEMPO_FIELD: &str = "Tempo";
pub const TEMPO_CHANGE_FIELD: &str = "TempoChange";

/// Why an inbound frame could not be turned into a message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a JSON string: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("frame contents are not a JSON document: {0}")]
    Document(#[source] serde_json::Error),
    #[error("frame document is not an object")]
    NotAnObject,
    #[error("field `{field}` must be a {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// The three editor message kinds, which share a payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    TextEdit,
    TextEval,
    EstuaryEdit,
}

impl CodeKind {
    /// Checked in this order when a document carries more than one tag.
    pub const ALL: [CodeKind; 3] = [CodeKind::TextEdit, CodeKind::TextEval, CodeKind::EstuaryEdit];

    pub fn tag(self) -> &'static str {
        match self {
            CodeKind::TextEdit => "TextEdit",
            CodeKind::TextEval => "TextEval",
            CodeKind::EstuaryEdit => "EstuaryEdit",
        }
    }
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeUpdate {
    /// Value of the tag field, relayed untouched
    pub marker: Value,
    pub code: Option<Value>,
    pub credential: Option<String>,
}

/// A message received from a client
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    TextEdit(CodeUpdate),
    TextEval(CodeUpdate),
    EstuaryEdit(CodeUpdate),
    /// A bare `Tempo` field. Tempo is broadcast by the server only.
    TempoSet { credential: Option<String> },
    TempoChange {
        new_cps: f64,
        credential: Option<String>,
    },
    Malformed,
    Unrecognized,
}

impl InboundMessage {
    /// Decodes a frame, folding any decode error into [`InboundMessage::Malformed`].
    pub fn decode(raw: &str) -> Self {
        Self::try_decode(raw).unwrap_or(InboundMessage::Malformed)
    }

    /// Decodes a double-encoded frame: a JSON string whose contents are a
    /// JSON object.
    pub fn try_decode(raw: &str) -> Result<Self, DecodeError> {
        let inner: String = serde_json::from_str(raw).map_err(DecodeError::Envelope)?;
        let document: Value = serde_json::from_str(&inner).map_err(DecodeError::Document)?;

        match document {
            Value::Object(fields) => Self::from_fields(&fields),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, DecodeError> {
        let credential = fields
            .get(PASSWORD_FIELD)
            .and_then(Value::as_str)
            .map(str::to_owned);

        for kind in CodeKind::ALL {
            if let Some(marker) = present(fields, kind.tag()) {
                let update = CodeUpdate {
                    marker: marker.clone(),
                    code: fields.get(CODE_FIELD).cloned(),
                    credential,
                };
                return Ok(match kind {
                    CodeKind::TextEdit => InboundMessage::TextEdit(update),
                    CodeKind::TextEval => InboundMessage::TextEval(update),
                    CodeKind::EstuaryEdit => InboundMessage::EstuaryEdit(update),
                });
            }
        }

        if present(fields, TEMPO_FIELD).is_some() {
            return Ok(InboundMessage::TempoSet { credential });
        }

        if let Some(value) = present(fields, TEMPO_CHANGE_FIELD) {
            let new_cps = value.as_f64().ok_or(DecodeError::InvalidField {
                field: TEMPO_CHANGE_FIELD,
                expected: "number",
            })?;
            return Ok(InboundMessage::TempoChange {
                new_cps,
                credential,
            });
        }

        Ok(InboundMessage::Unrecognized)
    }

    pub fn credential(&self) -> Option<&str> {
        match self {
            InboundMessage::TextEdit(update)
            | InboundMessage::TextEval(update)
            | InboundMessage::EstuaryEdit(update) => update.credential.as_deref(),
            InboundMessage::TempoSet { credential }
            | InboundMessage::TempoChange { credential, .. } => credential.as_deref(),
            InboundMessage::Malformed | InboundMessage::Unrecognized => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::TextEdit(_) => CodeKind::TextEdit.tag(),
            InboundMessage::TextEval(_) => CodeKind::TextEval.tag(),
            InboundMessage::EstuaryEdit(_) => CodeKind::EstuaryEdit.tag(),
            InboundMessage::TempoSet { .. } => TEMPO_FIELD,
            InboundMessage::TempoChange { .. } => TEMPO_CHANGE_FIELD,
            InboundMessage::Malformed => "Malformed",
            InboundMessage::Unrecognized => "Unrecognized",
        }
    }
}

// A tag counts as present when the field exists and is not null.
fn present<'a>(fields: &'a Map<String, Value>, tag: &str) -> Option<&'a Value> {
    fields.get(tag).filter(|value| !value.is_null())
}

/// A message broadcast by the server. Carries no credential; code messages
/// always serialize an empty `password`.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Code {
        kind: CodeKind,
        marker: Value,
        code: Option<Value>,
    },
    Tempo(TempoState),
}

impl OutboundMessage {
    pub fn code(kind: CodeKind, update: CodeUpdate) -> Self {
        OutboundMessage::Code {
            kind,
            marker: update.marker,
            code: update.code,
        }
    }
}

impl Serialize for OutboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OutboundMessage::Code { kind, marker, code } => {
                let len = if code.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry(kind.tag(), marker)?;
                if let Some(code) = code {
                    map.serialize_entry(CODE_FIELD, code)?;
                }
                map.serialize_entry(PASSWORD_FIELD, "")?;
                map.end()
            }
            OutboundMessage::Tempo(state) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry(TEMPO_FIELD, &state.cps)?;
                map.serialize_entry("at", &state.anchor_time_micros)?;
                map.serialize_entry("beat", &state.anchor_beat)?;
                map.end()
            }
        }
    }
}

/// Encodes a document the way clients put it on the wire: serialized to a
/// JSON string, which is then serialized again as a JSON string literal.
pub fn encode_inbound(document: &Value) -> Result<String, serde_json::Error> {
    let inner = serde_json::to_string(document)?;
    serde_json::to_string(&inner)
}

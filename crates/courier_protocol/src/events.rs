#![forbid(unsafe_code)]

use courier_domain::{ContentType, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Versioned wire envelope. Events are tagged as
/// `{"v": 1, "event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<E> {
	pub v: u32,

	#[serde(flatten)]
	pub event: E,
}

impl<E> Envelope<E> {
	pub fn new(event: E) -> Self {
		Self {
			v: crate::PROTOCOL_VERSION,
			event,
		}
	}
}

/// Events a client may send after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
	/// Handshake; must be the first event on a connection.
	#[serde(rename = "hello")]
	Hello(Hello),

	#[serde(rename = "directMessage")]
	DirectMessage(DirectMessageIn),

	#[serde(rename = "signal")]
	Signal(SignalIn),

	#[serde(rename = "ping")]
	Ping(Ping),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
	/// Identity credential issued by the account service.
	#[serde(default)]
	pub token: String,

	#[serde(rename = "clientName", default)]
	pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageIn {
	pub subject: String,

	/// Unvalidated content payload; converted to [`MessageBody`] at the
	/// relay boundary and never carried past it in raw form.
	pub content: serde_json::Value,

	#[serde(rename = "toID")]
	pub to_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalIn {
	#[serde(rename = "toID")]
	pub to_id: UserId,

	/// Opaque negotiation payload; relayed verbatim, never interpreted.
	#[serde(rename = "signalData")]
	pub signal_data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ping {
	#[serde(rename = "clientTimeUnixMs", default)]
	pub client_time_unix_ms: i64,
}

/// Events the server may emit to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
	/// Presence announcement, sent once to the newly authenticated session.
	#[serde(rename = "userConnected")]
	UserConnected { name: String, id: UserId },

	#[serde(rename = "directMessage")]
	DirectMessage(DirectMessageOut),

	#[serde(rename = "signal")]
	Signal(SignalOut),

	#[serde(rename = "Error")]
	Error { message: String },

	#[serde(rename = "pong")]
	Pong(Pong),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageOut {
	#[serde(rename = "fromUser")]
	pub from_user: String,

	/// Canonical JSON serialization of the validated message body.
	pub content: String,

	pub subject: String,

	#[serde(rename = "createdAt")]
	pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOut {
	#[serde(rename = "fromID")]
	pub from_id: UserId,

	#[serde(rename = "signalData")]
	pub signal_data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pong {
	#[serde(rename = "clientTimeUnixMs")]
	pub client_time_unix_ms: i64,

	#[serde(rename = "serverTimeUnixMs")]
	pub server_time_unix_ms: i64,
}

/// Validated direct-message content, one case per content kind.
///
/// Wire shape: `{"contentType": "text", "data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentType", rename_all = "lowercase")]
pub enum MessageBody {
	Image { data: String },
	Video { data: String },
	Text { data: String },
	Audio { data: String },
}

impl MessageBody {
	pub fn content_type(&self) -> ContentType {
		match self {
			MessageBody::Image { .. } => ContentType::Image,
			MessageBody::Video { .. } => ContentType::Video,
			MessageBody::Text { .. } => ContentType::Text,
			MessageBody::Audio { .. } => ContentType::Audio,
		}
	}

	pub fn data(&self) -> &str {
		match self {
			MessageBody::Image { data }
			| MessageBody::Video { data }
			| MessageBody::Text { data }
			| MessageBody::Audio { data } => data,
		}
	}

	/// Canonical JSON form persisted with the message row.
	pub fn to_canonical_json(&self) -> String {
		serde_json::to_string(self).expect("message body serialization")
	}
}

/// Schema violation in a `directMessage` content payload.
///
/// The message is pre-sanitized for transmission back to the sender.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
	pub message: String,
}

/// Validate an inbound content payload into a typed [`MessageBody`].
///
/// Rejects unknown content types, missing fields, and empty `data`.
pub fn validate_message_content(value: &serde_json::Value) -> Result<MessageBody, ValidationError> {
	let body: MessageBody = serde_json::from_value(value.clone()).map_err(|e| ValidationError {
		message: sanitize_validation_message(&e.to_string()),
	})?;

	if body.data().is_empty() {
		return Err(ValidationError {
			message: "data is not allowed to be empty".to_string(),
		});
	}

	Ok(body)
}

/// Strip backslash and quote characters so schema errors embed cleanly in
/// an `Error` event payload.
fn sanitize_validation_message(msg: &str) -> String {
	msg.chars().filter(|c| *c != '\\' && *c != '"' && *c != '`').collect()
}

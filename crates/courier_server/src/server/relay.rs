#![forbid(unsafe_code)]

use std::sync::Arc;

use courier_domain::{RoomKey, UserId};
use courier_protocol::{DirectMessageOut, ServerEvent, SignalOut, validate_message_content};
use courier_store::{Message, MessageStore, NewMessage, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::server::room_hub::RoomHub;

/// Authenticated identity attached to a session at handshake.
#[derive(Debug, Clone)]
pub struct SessionUser {
	pub id: UserId,
	pub name: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
	/// Content failed schema validation; nothing was persisted.
	#[error("invalid message content: {0}")]
	Validation(String),

	/// The session's authenticated id no longer resolves to an account.
	#[error("sender account not found")]
	SenderUnresolved,

	/// `to_id` does not resolve to an account. The message row was still
	/// persisted; only live delivery was skipped.
	#[error("recipient {to_id} not found")]
	RecipientUnresolved { to_id: UserId },

	#[error("persistence failed: {0}")]
	Persistence(#[from] StoreError),
}

impl RelayError {
	/// Text carried back to the sender in an `Error` event. Internal
	/// detail never leaks; it is logged server-side instead.
	pub fn client_message(&self) -> String {
		match self {
			RelayError::Validation(msg) => msg.clone(),
			RelayError::SenderUnresolved => "authentication error, please re-authenticate".to_string(),
			RelayError::RecipientUnresolved { to_id } => format!("id {to_id} not found"),
			RelayError::Persistence(_) => "internal error, message not delivered".to_string(),
		}
	}
}

/// Message and signaling relay.
///
/// Direct messages are write-ahead: the row is the source of truth and
/// live fan-out is an optimization layered on top of it.
pub struct Relay {
	store: Arc<dyn MessageStore>,
	hub: RoomHub,
}

impl Relay {
	pub fn new(store: Arc<dyn MessageStore>, hub: RoomHub) -> Self {
		Self { store, hub }
	}

	/// Relay a direct message: validate, resolve both parties, persist,
	/// then fan out to the recipient's room if the recipient resolved.
	///
	/// An unresolved recipient is reported as an error to the sender but
	/// the row is persisted anyway; the stored message is the recipient's
	/// only recovery path once they obtain an account or reconnect.
	pub async fn send_direct_message(
		&self,
		sender: &SessionUser,
		subject: &str,
		content: &serde_json::Value,
		to_id: UserId,
	) -> Result<Message, RelayError> {
		let body = validate_message_content(content).map_err(|e| RelayError::Validation(e.message))?;

		let sender_row = self.store.find_user_by_id(sender.id).await?;
		if sender_row.is_none() {
			warn!(sender = %sender.id, "direct message from session with no account row");
			return Err(RelayError::SenderUnresolved);
		}

		let recipient = self.store.find_user_by_id(to_id).await?;

		let canonical = body.to_canonical_json();
		let message = self
			.store
			.create_message(NewMessage {
				subject: subject.to_string(),
				content: canonical.clone(),
				from_user_id: sender.id,
				to_user_id: to_id,
			})
			.await?;

		metrics::counter!("courier_server_messages_persisted_total").increment(1);

		if recipient.is_none() {
			debug!(message_id = message.id, to = %to_id, "recipient unresolved; persisted without live delivery");
			return Err(RelayError::RecipientUnresolved { to_id });
		}

		self.hub
			.publish(
				RoomKey::for_user(to_id),
				ServerEvent::DirectMessage(DirectMessageOut {
					from_user: sender.name.clone(),
					content: canonical,
					subject: subject.to_string(),
					created_at: message.created_at,
				}),
			)
			.await;

		metrics::counter!("courier_server_messages_relayed_total").increment(1);

		Ok(message)
	}

	/// Relay an opaque signaling payload to the recipient's room.
	///
	/// No validation, persistence, or existence check; an offline
	/// recipient means the payload is dropped silently.
	pub async fn relay_signal(&self, from: UserId, to_id: UserId, signal_data: serde_json::Value) {
		debug!(from = %from, to = %to_id, "relaying signal");
		metrics::counter!("courier_server_signals_relayed_total").increment(1);

		self.hub
			.publish(
				RoomKey::for_user(to_id),
				ServerEvent::Signal(SignalOut {
					from_id: from,
					signal_data,
				}),
			)
			.await;
	}
}

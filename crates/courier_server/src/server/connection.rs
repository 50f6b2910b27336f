#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use bytes::BytesMut;
use courier_domain::{RoomKey, SecretString, UserId};
use courier_protocol::framing::{DEFAULT_MAX_FRAME_SIZE, encode_frame, try_decode_frame_from_buffer};
use courier_protocol::{ClientEvent, Envelope, Hello, Pong, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::auth::verify_token;
use crate::server::relay::{Relay, RelayError, SessionUser};
use crate::server::room_hub::RoomHub;

/// Per-connection server settings.
#[derive(Clone)]
pub struct ConnectionSettings {
	pub max_frame_bytes: usize,

	/// Capacity of the per-session outbound event queue.
	pub out_queue_capacity: usize,

	/// Secret used to verify handshake tokens.
	pub auth_hmac_secret: SecretString,
}

impl ConnectionSettings {
	pub fn new(auth_hmac_secret: SecretString) -> Self {
		Self {
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			out_queue_capacity: 1024,
			auth_hmac_secret,
		}
	}
}

/// Drive one client connection: handshake, authenticate, subscribe the
/// session to its user's room, then relay events until disconnect.
///
/// Authentication runs exactly once, on the `hello` envelope; no other
/// handler is reachable before it succeeds.
pub async fn handle_connection(
	conn_id: u64,
	connection: quinn::Connection,
	relay: Arc<Relay>,
	hub: RoomHub,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	struct ConnectionGaugeGuard;
	impl Drop for ConnectionGaugeGuard {
		fn drop(&mut self) {
			metrics::gauge!("courier_server_active_connections").decrement(1.0);
		}
	}

	metrics::gauge!("courier_server_active_connections").increment(1.0);
	let _conn_guard = ConnectionGaugeGuard;

	let (mut send, mut recv) = connection.accept_bi().await.context("accept bidirectional stream")?;

	let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<ClientEvent>();
	let max_frame = settings.max_frame_bytes;
	let reader_task = tokio::spawn(async move {
		let mut buf = BytesMut::with_capacity(16 * 1024);
		let mut tmp = [0u8; 8192];

		loop {
			let n = match recv.read(&mut tmp).await {
				Ok(Some(n)) => n,
				Ok(None) => return Ok::<(), anyhow::Error>(()),
				Err(e) => return Err(anyhow!(e).context("stream read failed")),
			};

			metrics::counter!("courier_server_bytes_in_total").increment(n as u64);
			buf.extend_from_slice(&tmp[..n]);

			loop {
				match try_decode_frame_from_buffer::<Envelope<ClientEvent>>(&mut buf, max_frame) {
					Ok(Some(env)) => {
						metrics::counter!("courier_server_envelopes_in_total").increment(1);
						if ctrl_tx.send(env.event).is_err() {
							return Ok(());
						}
					}
					Ok(None) => break,
					Err(e) => {
						metrics::counter!("courier_server_decode_errors_total").increment(1);
						return Err(anyhow!(e).context("failed to decode frame"));
					}
				}
			}
		}
	});

	let hello = wait_for_hello(&mut ctrl_rx).await?;
	info!(conn_id, client_name = %hello.client_name, "received hello");

	let user = match verify_token(&hello.token, settings.auth_hmac_secret.expose()) {
		Ok(claims) => SessionUser {
			id: UserId::new(claims.sub),
			name: claims.name,
		},
		Err(e) => {
			warn!(conn_id, error = %e, "handshake rejected");
			metrics::counter!("courier_server_auth_rejections_total").increment(1);
			send_event(
				&mut send,
				ServerEvent::Error {
					message: "authentication error".to_string(),
				},
			)
			.await
			.ok();
			return Ok(());
		}
	};

	info!(conn_id, user = %user.id, "session authenticated");
	metrics::counter!("courier_server_auth_accepted_total").increment(1);

	// Single writer task owns the send stream; everything outbound goes
	// through this queue.
	let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(settings.out_queue_capacity);
	let writer_task = tokio::spawn(async move {
		while let Some(event) = out_rx.recv().await {
			if let Err(e) = send_event(&mut send, event).await {
				warn!(conn_id, error = %e, "outbound write failed");
				return;
			}
		}
	});

	let mut room_rx = hub.subscribe(RoomKey::for_user(user.id)).await;
	let out_tx_room = out_tx.clone();
	let forward_task = tokio::spawn(async move {
		while let Some(event) = room_rx.recv().await {
			if out_tx_room.send(event).await.is_err() {
				break;
			}
		}
	});

	// Presence announcement, to this session only.
	out_tx
		.send(ServerEvent::UserConnected {
			name: user.name.clone(),
			id: user.id,
		})
		.await
		.ok();

	run_session(conn_id, &user, &relay, &mut ctrl_rx, &out_tx).await;

	debug!(conn_id, user = %user.id, "connection closing");

	// Dropping the room receiver is the entire membership teardown; the
	// hub prunes the dead sender on its next publish.
	forward_task.abort();
	drop(out_tx);
	let _ = writer_task.await;
	let _ = reader_task.await;

	Ok(())
}

/// Post-auth event loop: relays events arriving on the session's decode
/// queue until the peer closes it. Runs against plain channels so the
/// relay semantics can be exercised without a QUIC endpoint.
pub(crate) async fn run_session(
	conn_id: u64,
	user: &SessionUser,
	relay: &Relay,
	ctrl_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
	out_tx: &mpsc::Sender<ServerEvent>,
) {
	while let Some(event) = ctrl_rx.recv().await {
		match event {
			ClientEvent::Hello(_) => {
				debug!(conn_id, "ignoring duplicate hello");
			}

			ClientEvent::DirectMessage(dm) => {
				match relay.send_direct_message(user, &dm.subject, &dm.content, dm.to_id).await {
					Ok(_) => {}
					Err(e) => {
						if let RelayError::Persistence(detail) = &e {
							warn!(conn_id, user = %user.id, error = %detail, "message persistence failed");
						}
						out_tx
							.send(ServerEvent::Error {
								message: e.client_message(),
							})
							.await
							.ok();
					}
				}
			}

			ClientEvent::Signal(sig) => {
				relay.relay_signal(user.id, sig.to_id, sig.signal_data).await;
			}

			ClientEvent::Ping(ping) => {
				out_tx
					.send(ServerEvent::Pong(Pong {
						client_time_unix_ms: ping.client_time_unix_ms,
						server_time_unix_ms: unix_ms_now(),
					}))
					.await
					.ok();
			}
		}
	}
}

pub(crate) async fn wait_for_hello(ctrl_rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> anyhow::Result<Hello> {
	while let Some(event) = ctrl_rx.recv().await {
		if let ClientEvent::Hello(h) = event {
			return Ok(h);
		}
		// Pre-hello traffic is dropped; nothing is reachable before auth.
		debug!("discarding event received before hello");
	}
	Err(anyhow!("connection closed before hello"))
}

fn unix_ms_now() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};

	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |d| d.as_millis() as i64)
}

async fn send_event(send: &mut quinn::SendStream, event: ServerEvent) -> anyhow::Result<()> {
	let frame = encode_frame(&Envelope::new(event), DEFAULT_MAX_FRAME_SIZE).map_err(|e| anyhow!(e))?;
	metrics::counter!("courier_server_envelopes_out_total").increment(1);
	metrics::counter!("courier_server_bytes_out_total").increment(frame.len() as u64);

	send.write_all(&frame).await.context("stream write")?;
	Ok(())
}

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use courier_domain::RoomKey;
use courier_protocol::ServerEvent;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Per-room fan-out hub for live delivery.
///
/// Constructed once in `main` and injected into the connection handler
/// and relays; tests substitute their own instance. Membership has no
/// explicit teardown: dropping a subscriber's receiver is the entire
/// cleanup, and closed senders are pruned lazily on the next publish.
#[derive(Debug, Clone)]
pub struct RoomHub {
	inner: Arc<Mutex<Inner>>,
	cfg: RoomHubConfig,
}

#[derive(Debug, Clone)]
pub struct RoomHubConfig {
	/// Maximum number of queued events per subscriber. Publishing to a
	/// full queue drops the event for that subscriber only.
	pub subscriber_queue_capacity: usize,
}

impl Default for RoomHubConfig {
	fn default() -> Self {
		Self {
			subscriber_queue_capacity: 1024,
		}
	}
}

impl RoomHub {
	pub fn new(cfg: RoomHubConfig) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner::default())),
			cfg,
		}
	}

	/// Subscribe to a room; every live session of the room's user holds
	/// one receiver, so delivery fans out to all devices.
	pub async fn subscribe(&self, room: RoomKey) -> mpsc::Receiver<ServerEvent> {
		let (tx, rx) = mpsc::channel(self.cfg.subscriber_queue_capacity);

		let mut inner = self.inner.lock().await;
		let entry = inner.rooms.entry(room).or_default();

		prune_closed_subscribers(entry);
		entry.subscribers.push(tx);

		debug!(room = %room, subs = entry.subscribers.len(), "room hub: subscribed");

		rx
	}

	/// Best-effort publish to every live subscriber of `room`.
	///
	/// Full subscriber queues drop the event for that subscriber; an
	/// empty or unknown room drops it entirely. Never blocks.
	pub async fn publish(&self, room: RoomKey, event: ServerEvent) {
		let mut inner = self.inner.lock().await;
		let Some(entry) = inner.rooms.get_mut(&room) else {
			return;
		};

		prune_closed_subscribers(entry);

		if entry.subscribers.is_empty() {
			inner.rooms.remove(&room);
			return;
		}

		let mut dropped: u64 = 0;
		for sub in entry.subscribers.iter() {
			match sub.try_send(event.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		prune_closed_subscribers(entry);
		if entry.subscribers.is_empty() {
			inner.rooms.remove(&room);
		}

		if dropped > 0 {
			metrics::counter!("courier_server_hub_dropped_events_total").increment(dropped);
			debug!(room = %room, dropped, "room hub: dropped due to full subscriber queues");
		}
	}

	/// Remove closed subscribers for a room, dropping the room if empty.
	pub async fn prune_room(&self, room: &RoomKey) {
		let mut inner = self.inner.lock().await;
		if let Some(entry) = inner.rooms.get_mut(room) {
			prune_closed_subscribers(entry);

			if entry.subscribers.is_empty() {
				inner.rooms.remove(room);
			}
		}
	}

	/// Snapshot of live subscriber counts per room.
	pub async fn room_subscriber_counts(&self) -> HashMap<RoomKey, usize> {
		let inner = self.inner.lock().await;
		inner
			.rooms
			.iter()
			.map(|(k, v)| (*k, v.subscribers.iter().filter(|s| !s.is_closed()).count()))
			.collect()
	}
}

#[derive(Debug, Default)]
struct Inner {
	rooms: HashMap<RoomKey, RoomEntry>,
}

#[derive(Debug, Default)]
struct RoomEntry {
	subscribers: Vec<mpsc::Sender<ServerEvent>>,
}

fn prune_closed_subscribers(entry: &mut RoomEntry) {
	entry.subscribers.retain(|s| !s.is_closed());
}

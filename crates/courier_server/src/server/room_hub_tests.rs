#![forbid(unsafe_code)]

use std::time::Duration;

use courier_domain::{RoomKey, UserId};
use courier_protocol::ServerEvent;
use tokio::time::timeout;

use crate::server::room_hub::{RoomHub, RoomHubConfig};

fn room(id: i64) -> RoomKey {
	RoomKey::for_user(UserId::new(id))
}

fn error_event(text: &str) -> ServerEvent {
	ServerEvent::Error {
		message: text.to_string(),
	}
}

#[tokio::test]
async fn subscriber_receives_events_for_its_room_only() {
	let hub = RoomHub::new(RoomHubConfig {
		subscriber_queue_capacity: 16,
	});

	let mut rx_a = hub.subscribe(room(1)).await;
	let _rx_b = hub.subscribe(room(2)).await;

	hub.publish(room(2), error_event("for-b")).await;

	let got_unexpected = timeout(Duration::from_millis(50), rx_a.recv()).await;
	assert!(
		got_unexpected.is_err(),
		"subscriber for room 1 unexpectedly received an item for room 2"
	);

	hub.publish(room(1), error_event("for-a")).await;

	let item = timeout(Duration::from_millis(250), rx_a.recv())
		.await
		.expect("expected to receive within timeout")
		.expect("channel open");

	match item {
		ServerEvent::Error { message } => assert_eq!(message, "for-a"),
		other => panic!("expected Error event, got: {other:?}"),
	}
}

#[tokio::test]
async fn every_session_of_a_user_receives_the_event() {
	let hub = RoomHub::new(RoomHubConfig::default());

	let mut device_1 = hub.subscribe(room(1)).await;
	let mut device_2 = hub.subscribe(room(1)).await;

	hub.publish(room(1), error_event("both")).await;

	for rx in [&mut device_1, &mut device_2] {
		let item = timeout(Duration::from_millis(250), rx.recv())
			.await
			.expect("expected delivery to every session")
			.expect("channel open");
		assert!(matches!(item, ServerEvent::Error { .. }));
	}
}

#[tokio::test]
async fn dropped_receivers_are_pruned() {
	let hub = RoomHub::new(RoomHubConfig {
		subscriber_queue_capacity: 16,
	});

	{
		let _rx = hub.subscribe(room(1)).await;
	}

	hub.prune_room(&room(1)).await;

	// Publishing to the emptied room is a silent no-op.
	hub.publish(room(1), error_event("nobody")).await;

	let counts = hub.room_subscriber_counts().await;
	assert_eq!(counts.get(&room(1)).copied().unwrap_or(0), 0);
}

#[tokio::test]
async fn full_subscriber_queue_drops_the_event() {
	let hub = RoomHub::new(RoomHubConfig {
		subscriber_queue_capacity: 1,
	});

	let mut rx = hub.subscribe(room(1)).await;

	hub.publish(room(1), error_event("first")).await;
	hub.publish(room(1), error_event("dropped")).await;

	let first = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected first item")
		.expect("channel open");
	match first {
		ServerEvent::Error { message } => assert_eq!(message, "first"),
		other => panic!("expected Error event first, got: {other:?}"),
	}

	hub.publish(room(1), error_event("third")).await;

	let next = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected third item")
		.expect("channel open");
	match next {
		ServerEvent::Error { message } => assert_eq!(message, "third", "second event should have been dropped"),
		other => panic!("expected Error event, got: {other:?}"),
	}
}

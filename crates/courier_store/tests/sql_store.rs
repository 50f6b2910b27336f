#![forbid(unsafe_code)]

use courier_domain::UserId;
use courier_store::{MessageFilter, MessageStore, NewMessage, NewUser, SqlStore, StoreError};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SqlStore {
	let path = dir.path().join("courier.db");
	let url = format!("sqlite://{}?mode=rwc", path.display());
	SqlStore::connect(&url).await.expect("sqlite store should open and migrate")
}

fn new_user(n: u32) -> NewUser {
	NewUser {
		name: format!("User{n}"),
		email: format!("user{n}@example.com"),
		password_hash: "x".to_string(),
	}
}

fn new_message(from: UserId, to: UserId, subject: &str) -> NewMessage {
	NewMessage {
		subject: subject.to_string(),
		content: r#"{"contentType":"text","data":"hi"}"#.to_string(),
		from_user_id: from,
		to_user_id: to,
	}
}

#[tokio::test]
async fn rejects_unknown_url_scheme() {
	let err = SqlStore::connect("mysql://nope").await.err().unwrap();
	assert!(matches!(err, StoreError::UnsupportedUrl));
}

#[tokio::test]
async fn user_roundtrip_and_unique_email() {
	let dir = TempDir::new().unwrap();
	let store = open_store(&dir).await;

	let created = store.create_user(new_user(1)).await.unwrap();
	let fetched = store.find_user_by_id(created.id).await.unwrap().unwrap();
	assert_eq!(fetched.name, "User1");
	assert_eq!(fetched.email, "user1@example.com");

	let by_email = store.find_user_by_email("user1@example.com").await.unwrap().unwrap();
	assert_eq!(by_email.id, created.id);

	// The duplicate is rejected by the UNIQUE constraint itself and must
	// surface as EmailExists, not as a raw database error.
	let dup = store.create_user(new_user(1)).await;
	match dup {
		Err(StoreError::EmailExists(email)) => assert_eq!(email, "user1@example.com"),
		other => panic!("expected EmailExists, got: {other:?}"),
	}
}

#[tokio::test]
async fn user_listing_and_search_page_through_accounts() {
	let dir = TempDir::new().unwrap();
	let store = open_store(&dir).await;

	for n in 1..=11 {
		store.create_user(new_user(n)).await.unwrap();
	}

	let (page1, total) = store.find_users_paged(1, 10).await.unwrap();
	assert_eq!(total, 11);
	assert_eq!(page1.len(), 10);
	assert_eq!(page1[0].name, "User1");

	let (page2, _) = store.find_users_paged(2, 10).await.unwrap();
	assert_eq!(page2.len(), 1);

	// LIKE on name or email, case-insensitive.
	let (hits, total) = store.search_users("USER1", 1, 10).await.unwrap();
	assert_eq!(total, 3); // User1, User10, User11
	assert_eq!(hits[0].name, "User1");

	let (none, total) = store.search_users("missing", 1, 10).await.unwrap();
	assert_eq!(total, 0);
	assert!(none.is_empty());
}

#[tokio::test]
async fn message_persists_even_when_recipient_row_is_absent() {
	let dir = TempDir::new().unwrap();
	let store = open_store(&dir).await;

	let sender = store.create_user(new_user(1)).await.unwrap();

	let msg = store
		.create_message(new_message(sender.id, UserId::new(9999), "orphan recipient"))
		.await
		.unwrap();

	assert!(!msg.is_read);
	assert!(msg.created_at > 0);

	let found = store.find_message_by_id(msg.id).await.unwrap().unwrap();
	assert_eq!(found.subject, "orphan recipient");
	assert_eq!(found.to_user_id, UserId::new(9999));
}

#[tokio::test]
async fn paging_and_filters() {
	let dir = TempDir::new().unwrap();
	let store = open_store(&dir).await;

	let a = store.create_user(new_user(1)).await.unwrap().id;
	let b = store.create_user(new_user(2)).await.unwrap().id;

	for i in 0..12 {
		store.create_message(new_message(a, b, &format!("m{i}"))).await.unwrap();
	}
	store.create_message(new_message(b, a, "reply")).await.unwrap();

	let (page1, total) = store.find_messages_paged(MessageFilter::All, 1, 10, false).await.unwrap();
	assert_eq!(total, 13);
	assert_eq!(page1.len(), 10);
	assert_eq!(page1[0].message.subject, "m0");

	let (page2, _) = store.find_messages_paged(MessageFilter::All, 2, 10, false).await.unwrap();
	assert_eq!(page2.len(), 3);

	let (from_b, total) = store.find_messages_paged(MessageFilter::From(b), 1, 10, false).await.unwrap();
	assert_eq!(total, 1);
	assert_eq!(from_b[0].message.subject, "reply");

	let (to_b, total) = store.find_messages_paged(MessageFilter::To(b), 1, 10, false).await.unwrap();
	assert_eq!(total, 12);
	assert_eq!(to_b.len(), 10);

	let (involving_a, total) = store
		.find_messages_paged(MessageFilter::Involving(a), 1, 20, false)
		.await
		.unwrap();
	assert_eq!(total, 13);
	assert_eq!(involving_a.len(), 13);
}

#[tokio::test]
async fn enrichment_left_joins_display_names() {
	let dir = TempDir::new().unwrap();
	let store = open_store(&dir).await;

	let sender = store.create_user(new_user(1)).await.unwrap();
	store
		.create_message(new_message(sender.id, UserId::new(404), "to nobody"))
		.await
		.unwrap();

	let (rows, _) = store.find_messages_paged(MessageFilter::All, 1, 10, true).await.unwrap();
	assert_eq!(rows[0].from_user_name.as_deref(), Some("User1"));
	assert_eq!(rows[0].to_user_name, None);
}

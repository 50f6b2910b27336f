#![forbid(unsafe_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use courier_domain::UserId;
use tokio::sync::Mutex;

use crate::{
	MessageStore, StoreError,
	models::{Message, MessageFilter, MessageRecord, NewMessage, NewUser, User, page_offset},
	unix_ms_now,
};

#[derive(Default)]
struct MemoryInner {
	users: HashMap<i64, User>,
	messages: Vec<Message>,
	next_user_id: i64,
	next_message_id: i64,
}

/// In-memory store for tests and for running with persistence disabled.
/// Data does not survive a restart.
#[derive(Default)]
pub struct MemoryStore {
	inner: Mutex<MemoryInner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

fn matches(filter: MessageFilter, msg: &Message) -> bool {
	match filter {
		MessageFilter::All => true,
		MessageFilter::From(id) => msg.from_user_id == id,
		MessageFilter::To(id) => msg.to_user_id == id,
		MessageFilter::Involving(id) => msg.from_user_id == id || msg.to_user_id == id,
	}
}

#[async_trait]
impl MessageStore for MemoryStore {
	async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
		let mut inner = self.inner.lock().await;

		if inner.users.values().any(|u| u.email == user.email) {
			return Err(StoreError::EmailExists(user.email));
		}

		inner.next_user_id += 1;
		let created = User {
			id: UserId::new(inner.next_user_id),
			name: user.name,
			email: user.email,
			password_hash: user.password_hash,
		};
		inner.users.insert(created.id.as_i64(), created.clone());

		Ok(created)
	}

	async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
		let inner = self.inner.lock().await;
		Ok(inner.users.get(&id.as_i64()).cloned())
	}

	async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
		let inner = self.inner.lock().await;
		Ok(inner.users.values().find(|u| u.email == email).cloned())
	}

	async fn find_users_paged(&self, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError> {
		let inner = self.inner.lock().await;

		let mut users: Vec<User> = inner.users.values().cloned().collect();
		users.sort_by_key(|u| u.id);

		let total = users.len() as u64;
		let offset = page_offset(page, page_size) as usize;
		let page_items = users.into_iter().skip(offset).take(page_size as usize).collect();

		Ok((page_items, total))
	}

	async fn search_users(&self, search: &str, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError> {
		let inner = self.inner.lock().await;
		let needle = search.to_lowercase();

		let mut hits: Vec<User> = inner
			.users
			.values()
			.filter(|u| u.name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle))
			.cloned()
			.collect();
		hits.sort_by(|a, b| a.name.cmp(&b.name));

		let total = hits.len() as u64;
		let offset = page_offset(page, page_size) as usize;
		let page_items = hits.into_iter().skip(offset).take(page_size as usize).collect();

		Ok((page_items, total))
	}

	async fn create_message(&self, msg: NewMessage) -> Result<Message, StoreError> {
		let mut inner = self.inner.lock().await;

		inner.next_message_id += 1;
		let created = Message {
			id: inner.next_message_id,
			subject: msg.subject,
			content: msg.content,
			is_read: false,
			from_user_id: msg.from_user_id,
			to_user_id: msg.to_user_id,
			created_at: unix_ms_now(),
		};
		inner.messages.push(created.clone());

		Ok(created)
	}

	async fn find_message_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
		let inner = self.inner.lock().await;
		Ok(inner.messages.iter().find(|m| m.id == id).cloned())
	}

	async fn find_messages_paged(
		&self,
		filter: MessageFilter,
		page: u32,
		page_size: u32,
		enrich: bool,
	) -> Result<(Vec<MessageRecord>, u64), StoreError> {
		let inner = self.inner.lock().await;

		let filtered: Vec<&Message> = inner.messages.iter().filter(|m| matches(filter, m)).collect();
		let total = filtered.len() as u64;
		let offset = page_offset(page, page_size) as usize;

		let records = filtered
			.into_iter()
			.skip(offset)
			.take(page_size as usize)
			.map(|m| {
				if enrich {
					MessageRecord {
						message: m.clone(),
						from_user_name: inner.users.get(&m.from_user_id.as_i64()).map(|u| u.name.clone()),
						to_user_name: inner.users.get(&m.to_user_id.as_i64()).map(|u| u.name.clone()),
					}
				} else {
					MessageRecord::plain(m.clone())
				}
			})
			.collect();

		Ok((records, total))
	}
}

#![forbid(unsafe_code)]

mod error;
mod memory;
mod models;
mod sql;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{Message, MessageFilter, MessageRecord, NewMessage, NewUser, PageInfo, User, page_offset, total_pages};
pub use sql::SqlStore;

use async_trait::async_trait;
use courier_domain::UserId;

/// Durable store access for `User` and `Message` entities.
///
/// Consistency of a single-row create and of reads is delegated to the
/// backing store; callers never need multi-row transactions.
#[async_trait]
pub trait MessageStore: Send + Sync {
	/// Create an account row; enforces unique email.
	async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

	async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

	async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

	/// Page through all accounts, oldest first. Returns items plus total.
	async fn find_users_paged(&self, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError>;

	/// Page through accounts whose name or email contains `search`,
	/// ordered by name. Matching is case-insensitive.
	async fn search_users(&self, search: &str, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError>;

	/// Persist a new message with `is_read = false`.
	async fn create_message(&self, msg: NewMessage) -> Result<Message, StoreError>;

	async fn find_message_by_id(&self, id: i64) -> Result<Option<Message>, StoreError>;

	/// Page through messages matching `filter`, oldest first.
	///
	/// Returns the page items plus the total row count for the filter.
	/// With `enrich`, sender/recipient display names are joined in.
	async fn find_messages_paged(
		&self,
		filter: MessageFilter,
		page: u32,
		page_size: u32,
		enrich: bool,
	) -> Result<(Vec<MessageRecord>, u64), StoreError>;
}

/// Current Unix time in milliseconds, used for `created_at` stamps.
pub(crate) fn unix_ms_now() -> i64 {
	use std::time::{Duration, SystemTime, UNIX_EPOCH};

	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::from_secs(0))
		.as_millis() as i64
}

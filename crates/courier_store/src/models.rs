#![forbid(unsafe_code)]

use courier_domain::UserId;
use serde::{Deserialize, Serialize};

/// Account row. The credential hash never leaves the process: it is
/// skipped on serialization and only compared by the (external) auth
/// surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub name: String,
	pub email: String,

	#[serde(skip_serializing, default)]
	pub password_hash: String,
}

/// Fields for account creation, consumed by the CRUD surface and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
	pub name: String,
	pub email: String,
	pub password_hash: String,
}

/// Persisted direct message. Immutable once created except `is_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub id: i64,

	pub subject: String,

	/// Canonical JSON serialization of the validated content body.
	pub content: String,

	#[serde(rename = "isRead")]
	pub is_read: bool,

	#[serde(rename = "fromUserID")]
	pub from_user_id: UserId,

	#[serde(rename = "toUserID")]
	pub to_user_id: UserId,

	/// Unix milliseconds.
	#[serde(rename = "createdAt")]
	pub created_at: i64,
}

/// Fields for message creation; `is_read` starts false and `created_at`
/// is stamped by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
	pub subject: String,
	pub content: String,
	pub from_user_id: UserId,
	pub to_user_id: UserId,
}

/// A message plus optional sender/recipient display enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
	#[serde(flatten)]
	pub message: Message,

	#[serde(rename = "fromUserName", skip_serializing_if = "Option::is_none")]
	pub from_user_name: Option<String>,

	#[serde(rename = "toUserName", skip_serializing_if = "Option::is_none")]
	pub to_user_name: Option<String>,
}

impl MessageRecord {
	pub fn plain(message: Message) -> Self {
		Self {
			message,
			from_user_name: None,
			to_user_name: None,
		}
	}
}

/// Message listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFilter {
	All,
	/// Sent by the user.
	From(UserId),
	/// Received by the user.
	To(UserId),
	/// Sent or received by the user (logical OR).
	Involving(UserId),
}

/// Pagination envelope returned by the read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
	#[serde(rename = "currentPage")]
	pub current_page: u32,

	#[serde(rename = "totalPages")]
	pub total_pages: u64,

	#[serde(rename = "pageSize")]
	pub page_size: u32,
}

/// Row offset for a 1-indexed page; pages below 1 clamp to 1.
pub fn page_offset(page: u32, page_size: u32) -> u64 {
	(page.max(1) as u64 - 1) * page_size as u64
}

/// `ceil(total / page_size)`.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
	if page_size == 0 {
		return 0;
	}
	total.div_ceil(page_size as u64)
}

#![forbid(unsafe_code)]

mod secret;

pub use secret::SecretString;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric user identity assigned by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
	pub const fn new(id: i64) -> Self {
		Self(id)
	}

	pub const fn as_i64(self) -> i64 {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<i64> for UserId {
	fn from(id: i64) -> Self {
		Self(id)
	}
}

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
	#[error("invalid numeric id: {0}")]
	InvalidNumber(String),
}

/// Delivery channel key for a user's personal room.
///
/// A `RoomKey` can only be built from a `UserId` (or a strict parse of the
/// `user-<id>` wire form), so routing never depends on ad-hoc string
/// concatenation. The mapping is a pure function of the user id: every
/// session of the same user subscribes to the same room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomKey(UserId);

impl RoomKey {
	/// Prefix used by the wire form of room names.
	pub const PREFIX: &'static str = "user-";

	pub const fn for_user(user: UserId) -> Self {
		Self(user)
	}

	pub const fn user(self) -> UserId {
		self.0
	}

	/// Parse the `user-<id>` wire form.
	pub fn parse(s: &str) -> Result<Self, ParseIdError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		let rest = s
			.strip_prefix(Self::PREFIX)
			.ok_or_else(|| ParseIdError::InvalidFormat(format!("expected user-<id>, got {s}")))?;

		let id: i64 = rest.parse().map_err(|_| ParseIdError::InvalidNumber(rest.to_string()))?;
		if id < 0 {
			return Err(ParseIdError::InvalidNumber(rest.to_string()));
		}

		Ok(Self(UserId::new(id)))
	}
}

impl fmt::Display for RoomKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}", Self::PREFIX, self.0)
	}
}

impl From<UserId> for RoomKey {
	fn from(user: UserId) -> Self {
		Self::for_user(user)
	}
}

impl FromStr for RoomKey {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomKey::parse(s)
	}
}

/// Message content kinds accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
	Image,
	Video,
	Text,
	Audio,
}

impl ContentType {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ContentType::Image => "image",
			ContentType::Video => "video",
			ContentType::Text => "text",
			ContentType::Audio => "audio",
		}
	}
}

impl fmt::Display for ContentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ContentType {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"image" => Ok(ContentType::Image),
			"video" => Ok(ContentType::Video),
			"text" => Ok(ContentType::Text),
			"audio" => Ok(ContentType::Audio),
			other => Err(ParseIdError::InvalidFormat(format!("unknown content type: {other}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn room_key_is_deterministic() {
		let u = UserId::new(42);
		assert_eq!(RoomKey::for_user(u), RoomKey::for_user(u));
		assert_eq!(RoomKey::for_user(u).to_string(), "user-42");
	}

	#[test]
	fn distinct_users_get_distinct_rooms() {
		assert_ne!(RoomKey::for_user(UserId::new(1)), RoomKey::for_user(UserId::new(2)));
	}

	#[test]
	fn room_key_parse_roundtrip() {
		let rk = RoomKey::parse("user-7").unwrap();
		assert_eq!(rk.user(), UserId::new(7));
		assert_eq!(rk.to_string(), "user-7");
		assert_eq!("user-7".parse::<RoomKey>().unwrap(), rk);
	}

	#[test]
	fn room_key_rejects_malformed() {
		assert!(RoomKey::parse("").is_err());
		assert!(RoomKey::parse("user-").is_err());
		assert!(RoomKey::parse("usr-3").is_err());
		assert!(RoomKey::parse("user-abc").is_err());
		assert!(RoomKey::parse("user--3").is_err());
	}

	#[test]
	fn content_type_parse_and_display() {
		assert_eq!("text".parse::<ContentType>().unwrap(), ContentType::Text);
		assert_eq!("AUDIO".parse::<ContentType>().unwrap(), ContentType::Audio);
		assert!("pdf".parse::<ContentType>().is_err());
		assert_eq!(ContentType::Image.to_string(), "image");
	}
}

#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),

	#[error("unsupported database_url (use sqlite: or postgres:)")]
	UnsupportedUrl,

	#[error("email already exists: {0}")]
	EmailExists(String),
}

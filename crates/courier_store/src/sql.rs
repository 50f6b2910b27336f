#![forbid(unsafe_code)]

use async_trait::async_trait;
use courier_domain::UserId;
use sqlx::{PgPool, Row, SqlitePool, postgres::PgPoolOptions, sqlite::SqlitePoolOptions};

use crate::{
	MessageStore, StoreError,
	models::{Message, MessageFilter, MessageRecord, NewMessage, NewUser, User, page_offset},
	unix_ms_now,
};

enum SqlBackend {
	Sqlite(SqlitePool),
	Postgres(PgPool),
}

/// SQL-backed store. The backend is chosen from the database URL scheme
/// and migrations run on connect.
pub struct SqlStore {
	backend: SqlBackend,
}

impl SqlStore {
	pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
		if database_url.starts_with("sqlite:") {
			let pool = SqlitePoolOptions::new().max_connections(8).connect(database_url).await?;
			sqlx::migrate!("migrations/sqlite").run(&pool).await?;
			Ok(Self {
				backend: SqlBackend::Sqlite(pool),
			})
		} else if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
			let pool = PgPoolOptions::new().max_connections(8).connect(database_url).await?;
			sqlx::migrate!("migrations/postgres").run(&pool).await?;
			Ok(Self {
				backend: SqlBackend::Postgres(pool),
			})
		} else {
			Err(StoreError::UnsupportedUrl)
		}
	}
}

fn user_from_parts(id: i64, name: String, email: String, password_hash: String) -> User {
	User {
		id: UserId::new(id),
		name,
		email,
		password_hash,
	}
}

#[allow(clippy::too_many_arguments)]
fn message_from_parts(
	id: i64,
	subject: String,
	content: String,
	is_read: bool,
	from_user_id: i64,
	to_user_id: i64,
	created_at: i64,
) -> Message {
	Message {
		id,
		subject,
		content,
		is_read,
		from_user_id: UserId::new(from_user_id),
		to_user_id: UserId::new(to_user_id),
		created_at,
	}
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
	matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// WHERE clause and bound ids for a filter. Placeholders differ per
/// backend, so the caller passes the style in.
fn filter_clause(filter: MessageFilter, pg: bool) -> (String, Vec<i64>) {
	let p = |n: usize| if pg { format!("${n}") } else { "?".to_string() };

	match filter {
		MessageFilter::All => (String::new(), Vec::new()),
		MessageFilter::From(id) => (format!("WHERE m.from_user_id = {}", p(1)), vec![id.as_i64()]),
		MessageFilter::To(id) => (format!("WHERE m.to_user_id = {}", p(1)), vec![id.as_i64()]),
		MessageFilter::Involving(id) => (
			format!("WHERE m.from_user_id = {} OR m.to_user_id = {}", p(1), p(2)),
			vec![id.as_i64(), id.as_i64()],
		),
	}
}

#[async_trait]
impl MessageStore for SqlStore {
	async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
		// The UNIQUE constraint on email is the only duplicate check; a
		// pre-read would race with concurrent registrations.
		let inserted: Result<i64, sqlx::Error> = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				sqlx::query("INSERT INTO users (name, email, password_hash) VALUES (?, ?, ?) RETURNING id")
					.bind(&user.name)
					.bind(&user.email)
					.bind(&user.password_hash)
					.fetch_one(pool)
					.await
					.and_then(|row| row.try_get(0))
			}
			SqlBackend::Postgres(pool) => {
				sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING id")
					.bind(&user.name)
					.bind(&user.email)
					.bind(&user.password_hash)
					.fetch_one(pool)
					.await
					.and_then(|row| row.try_get(0))
			}
		};

		let id: i64 = match inserted {
			Ok(id) => id,
			Err(e) if is_unique_violation(&e) => return Err(StoreError::EmailExists(user.email)),
			Err(e) => return Err(e.into()),
		};

		Ok(user_from_parts(id, user.name, user.email, user.password_hash))
	}

	async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
		let row: Option<(i64, String, String, String)> = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				sqlx::query_as("SELECT id, name, email, password_hash FROM users WHERE id = ?")
					.bind(id.as_i64())
					.fetch_optional(pool)
					.await?
			}
			SqlBackend::Postgres(pool) => {
				sqlx::query_as("SELECT id, name, email, password_hash FROM users WHERE id = $1")
					.bind(id.as_i64())
					.fetch_optional(pool)
					.await?
			}
		};

		Ok(row.map(|(id, name, email, hash)| user_from_parts(id, name, email, hash)))
	}

	async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
		let row: Option<(i64, String, String, String)> = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				sqlx::query_as("SELECT id, name, email, password_hash FROM users WHERE email = ?")
					.bind(email)
					.fetch_optional(pool)
					.await?
			}
			SqlBackend::Postgres(pool) => {
				sqlx::query_as("SELECT id, name, email, password_hash FROM users WHERE email = $1")
					.bind(email)
					.fetch_optional(pool)
					.await?
			}
		};

		Ok(row.map(|(id, name, email, hash)| user_from_parts(id, name, email, hash)))
	}

	async fn find_users_paged(&self, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError> {
		let offset = page_offset(page, page_size);
		let select =
			format!("SELECT id, name, email, password_hash FROM users ORDER BY id ASC LIMIT {page_size} OFFSET {offset}");

		let (total, rows): (i64, Vec<(i64, String, String, String)>) = match &self.backend {
			SqlBackend::Sqlite(pool) => (
				sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await?,
				sqlx::query_as(&select).fetch_all(pool).await?,
			),
			SqlBackend::Postgres(pool) => (
				sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await?,
				sqlx::query_as(&select).fetch_all(pool).await?,
			),
		};

		let users = rows
			.into_iter()
			.map(|(id, name, email, hash)| user_from_parts(id, name, email, hash))
			.collect();
		Ok((users, total as u64))
	}

	async fn search_users(&self, search: &str, page: u32, page_size: u32) -> Result<(Vec<User>, u64), StoreError> {
		let pattern = format!("%{search}%");
		let offset = page_offset(page, page_size);

		// Sqlite LIKE is already case-insensitive for ASCII; Postgres needs ILIKE.
		let (total, rows): (i64, Vec<(i64, String, String, String)>) = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE name LIKE ? OR email LIKE ?")
					.bind(&pattern)
					.bind(&pattern)
					.fetch_one(pool)
					.await?;
				let select = format!(
					"SELECT id, name, email, password_hash FROM users WHERE name LIKE ? OR email LIKE ? \
					 ORDER BY name ASC LIMIT {page_size} OFFSET {offset}"
				);
				let rows = sqlx::query_as(&select).bind(&pattern).bind(&pattern).fetch_all(pool).await?;
				(count, rows)
			}
			SqlBackend::Postgres(pool) => {
				let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE name ILIKE $1 OR email ILIKE $2")
					.bind(&pattern)
					.bind(&pattern)
					.fetch_one(pool)
					.await?;
				let select = format!(
					"SELECT id, name, email, password_hash FROM users WHERE name ILIKE $1 OR email ILIKE $2 \
					 ORDER BY name ASC LIMIT {page_size} OFFSET {offset}"
				);
				let rows = sqlx::query_as(&select).bind(&pattern).bind(&pattern).fetch_all(pool).await?;
				(count, rows)
			}
		};

		let users = rows
			.into_iter()
			.map(|(id, name, email, hash)| user_from_parts(id, name, email, hash))
			.collect();
		Ok((users, total as u64))
	}

	async fn create_message(&self, msg: NewMessage) -> Result<Message, StoreError> {
		let created_at = unix_ms_now();

		let id: i64 = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				let row = sqlx::query(
					"INSERT INTO messages (subject, content, is_read, from_user_id, to_user_id, created_at) \
					 VALUES (?, ?, 0, ?, ?, ?) RETURNING id",
				)
				.bind(&msg.subject)
				.bind(&msg.content)
				.bind(msg.from_user_id.as_i64())
				.bind(msg.to_user_id.as_i64())
				.bind(created_at)
				.fetch_one(pool)
				.await?;
				row.try_get(0)?
			}
			SqlBackend::Postgres(pool) => {
				let row = sqlx::query(
					"INSERT INTO messages (subject, content, is_read, from_user_id, to_user_id, created_at) \
					 VALUES ($1, $2, FALSE, $3, $4, $5) RETURNING id",
				)
				.bind(&msg.subject)
				.bind(&msg.content)
				.bind(msg.from_user_id.as_i64())
				.bind(msg.to_user_id.as_i64())
				.bind(created_at)
				.fetch_one(pool)
				.await?;
				row.try_get(0)?
			}
		};

		Ok(message_from_parts(
			id,
			msg.subject,
			msg.content,
			false,
			msg.from_user_id.as_i64(),
			msg.to_user_id.as_i64(),
			created_at,
		))
	}

	async fn find_message_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
		let row: Option<(i64, String, String, bool, i64, i64, i64)> = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				sqlx::query_as(
					"SELECT id, subject, content, is_read, from_user_id, to_user_id, created_at FROM messages WHERE id = ?",
				)
				.bind(id)
				.fetch_optional(pool)
				.await?
			}
			SqlBackend::Postgres(pool) => {
				sqlx::query_as(
					"SELECT id, subject, content, is_read, from_user_id, to_user_id, created_at FROM messages WHERE id = $1",
				)
				.bind(id)
				.fetch_optional(pool)
				.await?
			}
		};

		Ok(row.map(|(id, subject, content, is_read, from, to, at)| {
			message_from_parts(id, subject, content, is_read, from, to, at)
		}))
	}

	async fn find_messages_paged(
		&self,
		filter: MessageFilter,
		page: u32,
		page_size: u32,
		enrich: bool,
	) -> Result<(Vec<MessageRecord>, u64), StoreError> {
		let pg = matches!(self.backend, SqlBackend::Postgres(_));
		let (clause, binds) = filter_clause(filter, pg);
		let offset = page_offset(page, page_size);

		let count_sql = format!("SELECT COUNT(*) FROM messages m {clause}");
		let total: i64 = match &self.backend {
			SqlBackend::Sqlite(pool) => {
				let mut q = sqlx::query_scalar(&count_sql);
				for b in &binds {
					q = q.bind(b);
				}
				q.fetch_one(pool).await?
			}
			SqlBackend::Postgres(pool) => {
				let mut q = sqlx::query_scalar(&count_sql);
				for b in &binds {
					q = q.bind(b);
				}
				q.fetch_one(pool).await?
			}
		};

		let select = if enrich {
			format!(
				"SELECT m.id, m.subject, m.content, m.is_read, m.from_user_id, m.to_user_id, m.created_at, \
				 fu.name, tu.name \
				 FROM messages m \
				 LEFT JOIN users fu ON fu.id = m.from_user_id \
				 LEFT JOIN users tu ON tu.id = m.to_user_id \
				 {clause} ORDER BY m.id ASC LIMIT {page_size} OFFSET {offset}"
			)
		} else {
			format!(
				"SELECT m.id, m.subject, m.content, m.is_read, m.from_user_id, m.to_user_id, m.created_at \
				 FROM messages m {clause} ORDER BY m.id ASC LIMIT {page_size} OFFSET {offset}"
			)
		};

		let mut records = Vec::new();

		if enrich {
			type EnrichedRow = (i64, String, String, bool, i64, i64, i64, Option<String>, Option<String>);
			let rows: Vec<EnrichedRow> = match &self.backend {
				SqlBackend::Sqlite(pool) => {
					let mut q = sqlx::query_as(&select);
					for b in &binds {
						q = q.bind(b);
					}
					q.fetch_all(pool).await?
				}
				SqlBackend::Postgres(pool) => {
					let mut q = sqlx::query_as(&select);
					for b in &binds {
						q = q.bind(b);
					}
					q.fetch_all(pool).await?
				}
			};

			for (id, subject, content, is_read, from, to, at, from_name, to_name) in rows {
				records.push(MessageRecord {
					message: message_from_parts(id, subject, content, is_read, from, to, at),
					from_user_name: from_name,
					to_user_name: to_name,
				});
			}
		} else {
			let rows: Vec<(i64, String, String, bool, i64, i64, i64)> = match &self.backend {
				SqlBackend::Sqlite(pool) => {
					let mut q = sqlx::query_as(&select);
					for b in &binds {
						q = q.bind(b);
					}
					q.fetch_all(pool).await?
				}
				SqlBackend::Postgres(pool) => {
					let mut q = sqlx::query_as(&select);
					for b in &binds {
						q = q.bind(b);
					}
					q.fetch_all(pool).await?
				}
			};

			for (id, subject, content, is_read, from, to, at) in rows {
				records.push(MessageRecord::plain(message_from_parts(id, subject, content, is_read, from, to, at)));
			}
		}

		Ok((records, total as u64))
	}
}

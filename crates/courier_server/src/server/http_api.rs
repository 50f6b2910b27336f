#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_domain::UserId;
use courier_store::{MessageFilter, MessageStore, PageInfo, total_pages};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::warn;

use crate::server::cache::ResponseCache;

/// Default page size for message listings.
pub const PAGE_SIZE: u32 = 10;

/// Shared state for the read-only REST surface.
pub struct HttpApiState {
	pub store: Arc<dyn MessageStore>,
	pub cache: Arc<ResponseCache>,
	pub cache_ttl: Duration,
	pub page_size: u32,
}

/// Unknown id on a lookup route; carries the client-facing text.
#[derive(Debug, Error)]
#[error("{0}")]
struct NotFound(String);

pub fn spawn_http_api(bind: SocketAddr, state: Arc<HttpApiState>) {
	tokio::spawn(async move {
		if let Err(err) = run_http_api(bind, state).await {
			warn!(error = %err, "http api server stopped");
		}
	});
}

async fn run_http_api(bind: SocketAddr, state: Arc<HttpApiState>) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	loop {
		let (stream, _addr) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = Arc::clone(&state);
		tokio::spawn(async move {
			let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				warn!(error = %err, "http api connection error");
			}
		});
	}
}

async fn handle_request(req: Request<Incoming>, state: Arc<HttpApiState>) -> Result<Response<Full<Bytes>>, hyper::Error> {
	if req.method() != Method::GET {
		return Ok(json_response(
			StatusCode::METHOD_NOT_ALLOWED,
			error_body("method not allowed"),
		));
	}

	let path = req.uri().path().to_string();
	let query = req.uri().query().map(str::to_string);

	// Cache key is the path+query, e.g. "messages?page=3".
	let cache_key = match &query {
		Some(q) => format!("{}?{}", path.trim_start_matches('/'), q),
		None => path.trim_start_matches('/').to_string(),
	};

	let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
	let page = parse_page(query.as_deref());

	let result = state
		.cache
		.get_or_compute(&cache_key, state.cache_ttl, || async {
			match segments.as_slice() {
				["users"] => users_page(&state, page).await,
				["users", id] => user_by_id(&state, id).await,
				["users", search, "findusers"] => user_search(&state, search, page).await,
				["messages"] => messages_page(&state, MessageFilter::All, page).await,
				["messages", id] => message_by_id(&state, id).await,
				["messages", uid, "user"] => user_messages(&state, uid, page, UserFilterKind::Involving).await,
				["messages", uid, "user", "sent"] => user_messages(&state, uid, page, UserFilterKind::Sent).await,
				["messages", uid, "user", "inbox"] => user_messages(&state, uid, page, UserFilterKind::Inbox).await,
				_ => Err(NotFound("route not found".to_string()).into()),
			}
		})
		.await;

	match result {
		Ok(body) => Ok(json_response(StatusCode::OK, body)),
		Err(err) => {
			if let Some(nf) = err.downcast_ref::<NotFound>() {
				Ok(json_response(StatusCode::BAD_REQUEST, error_body(&nf.0)))
			} else {
				warn!(error = %err, path = %path, "http api read failed");
				Ok(json_response(
					StatusCode::INTERNAL_SERVER_ERROR,
					error_body("internal error"),
				))
			}
		}
	}
}

enum UserFilterKind {
	Involving,
	Sent,
	Inbox,
}

async fn user_by_id(state: &HttpApiState, raw_id: &str) -> anyhow::Result<String> {
	let not_found = || NotFound(format!("No User with the id {raw_id}"));

	let id: i64 = raw_id.parse().map_err(|_| not_found())?;
	let user = state
		.store
		.find_user_by_id(UserId::new(id))
		.await?
		.ok_or_else(not_found)?;

	Ok(serde_json::json!({"result": "success", "data": user}).to_string())
}

async fn users_page(state: &HttpApiState, page: u32) -> anyhow::Result<String> {
	let (users, total) = state.store.find_users_paged(page, state.page_size).await?;
	Ok(paged_body(serde_json::to_value(users)?, page, total, state.page_size))
}

async fn user_search(state: &HttpApiState, search: &str, page: u32) -> anyhow::Result<String> {
	let (users, total) = state.store.search_users(search, page, state.page_size).await?;
	Ok(paged_body(serde_json::to_value(users)?, page, total, state.page_size))
}

async fn message_by_id(state: &HttpApiState, raw_id: &str) -> anyhow::Result<String> {
	let not_found = || NotFound(format!("No Message with the id {raw_id}"));

	let id: i64 = raw_id.parse().map_err(|_| not_found())?;
	let message = state.store.find_message_by_id(id).await?.ok_or_else(not_found)?;

	Ok(serde_json::json!({"result": "success", "data": message}).to_string())
}

async fn user_messages(state: &HttpApiState, raw_uid: &str, page: u32, kind: UserFilterKind) -> anyhow::Result<String> {
	let uid: i64 = raw_uid
		.parse()
		.map_err(|_| NotFound(format!("No User with the id {raw_uid}")))?;
	let user = UserId::new(uid);

	let filter = match kind {
		UserFilterKind::Involving => MessageFilter::Involving(user),
		UserFilterKind::Sent => MessageFilter::From(user),
		UserFilterKind::Inbox => MessageFilter::To(user),
	};

	messages_page(state, filter, page).await
}

async fn messages_page(state: &HttpApiState, filter: MessageFilter, page: u32) -> anyhow::Result<String> {
	let (records, total) = state
		.store
		.find_messages_paged(filter, page, state.page_size, true)
		.await?;

	Ok(paged_body(serde_json::to_value(records)?, page, total, state.page_size))
}

fn paged_body(data: serde_json::Value, page: u32, total: u64, page_size: u32) -> String {
	let pagination = PageInfo {
		current_page: page,
		total_pages: total_pages(total, page_size),
		page_size,
	};

	serde_json::json!({
		"result": "success",
		"data": data,
		"pagination": pagination,
	})
	.to_string()
}

fn parse_page(query: Option<&str>) -> u32 {
	let Some(query) = query else {
		return 1;
	};

	query
		.split('&')
		.find_map(|pair| pair.strip_prefix("page="))
		.and_then(|v| v.parse::<u32>().ok())
		.map(|p| p.max(1))
		.unwrap_or(1)
}

fn error_body(message: &str) -> String {
	serde_json::json!({"result": "error", "message": message}).to_string()
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
	Response::builder()
		.status(status)
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(body)))
		.unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

#[cfg(test)]
mod tests {
	use courier_store::{MemoryStore, NewMessage, NewUser};

	use super::*;

	fn state_with(store: Arc<dyn MessageStore>, cache: Arc<ResponseCache>) -> Arc<HttpApiState> {
		Arc::new(HttpApiState {
			store,
			cache,
			cache_ttl: Duration::from_secs(120),
			page_size: PAGE_SIZE,
		})
	}

	async fn seeded_state() -> Arc<HttpApiState> {
		let store = Arc::new(MemoryStore::new());
		let alice = store
			.create_user(NewUser {
				name: "Alice".to_string(),
				email: "alice@example.com".to_string(),
				password_hash: "x".to_string(),
			})
			.await
			.unwrap();
		let bob = store
			.create_user(NewUser {
				name: "Bob".to_string(),
				email: "bob@example.com".to_string(),
				password_hash: "x".to_string(),
			})
			.await
			.unwrap();

		for i in 0..12 {
			store
				.create_message(NewMessage {
					subject: format!("m{i}"),
					content: r#"{"contentType":"text","data":"hi"}"#.to_string(),
					from_user_id: alice.id,
					to_user_id: bob.id,
				})
				.await
				.unwrap();
		}

		state_with(store, Arc::new(ResponseCache::new(true, 64)))
	}

	#[tokio::test]
	async fn user_lookup_renders_success_envelope() {
		let state = seeded_state().await;
		let body = user_by_id(&state, "1").await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();

		assert_eq!(json["result"], "success");
		assert_eq!(json["data"]["name"], "Alice");
		assert!(json["data"].get("password_hash").is_none());
	}

	#[tokio::test]
	async fn unknown_user_uses_original_error_text() {
		let state = seeded_state().await;
		let err = user_by_id(&state, "99").await.unwrap_err();
		let nf = err.downcast_ref::<NotFound>().expect("NotFound error");
		assert_eq!(nf.0, "No User with the id 99");

		let err = message_by_id(&state, "99").await.unwrap_err();
		let nf = err.downcast_ref::<NotFound>().expect("NotFound error");
		assert_eq!(nf.0, "No Message with the id 99");
	}

	#[tokio::test]
	async fn user_listing_paginates_with_envelope() {
		let state = seeded_state().await;
		let body = users_page(&state, 1).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();

		assert_eq!(json["result"], "success");
		assert_eq!(json["data"].as_array().unwrap().len(), 2);
		assert_eq!(json["data"][0]["name"], "Alice");
		assert!(json["data"][0].get("password_hash").is_none());
		assert_eq!(json["pagination"]["currentPage"], 1);
		assert_eq!(json["pagination"]["totalPages"], 1);
		assert_eq!(json["pagination"]["pageSize"], 10);
	}

	#[tokio::test]
	async fn user_search_matches_name_or_email() {
		let state = seeded_state().await;

		let body = user_search(&state, "bob", 1).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();
		assert_eq!(json["result"], "success");
		assert_eq!(json["data"].as_array().unwrap().len(), 1);
		assert_eq!(json["data"][0]["email"], "bob@example.com");

		let body = user_search(&state, "example.com", 1).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();
		assert_eq!(json["data"].as_array().unwrap().len(), 2);

		let body = user_search(&state, "nobody", 1).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();
		assert_eq!(json["data"].as_array().unwrap().len(), 0);
		assert_eq!(json["pagination"]["totalPages"], 0);
	}

	#[tokio::test]
	async fn message_listing_paginates_with_envelope() {
		let state = seeded_state().await;
		let body = messages_page(&state, MessageFilter::All, 2).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&body).unwrap();

		assert_eq!(json["result"], "success");
		assert_eq!(json["data"].as_array().unwrap().len(), 2);
		assert_eq!(json["pagination"]["currentPage"], 2);
		assert_eq!(json["pagination"]["totalPages"], 2);
		assert_eq!(json["pagination"]["pageSize"], 10);

		// Enrichment joins display names.
		assert_eq!(json["data"][0]["fromUserName"], "Alice");
		assert_eq!(json["data"][0]["toUserName"], "Bob");
	}

	#[tokio::test]
	async fn sent_and_inbox_filters_split_directions() {
		let state = seeded_state().await;

		let sent = messages_page(&state, MessageFilter::From(UserId::new(1)), 1).await.unwrap();
		let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
		assert_eq!(sent["pagination"]["totalPages"], 2);

		let inbox = messages_page(&state, MessageFilter::To(UserId::new(1)), 1).await.unwrap();
		let inbox: serde_json::Value = serde_json::from_str(&inbox).unwrap();
		assert_eq!(inbox["data"].as_array().unwrap().len(), 0);
		assert_eq!(inbox["pagination"]["totalPages"], 0);
	}

	#[test]
	fn page_parsing_defaults_and_clamps() {
		assert_eq!(parse_page(None), 1);
		assert_eq!(parse_page(Some("page=3")), 3);
		assert_eq!(parse_page(Some("page=0")), 1);
		assert_eq!(parse_page(Some("page=abc")), 1);
		assert_eq!(parse_page(Some("limit=5&page=2")), 2);
	}
}

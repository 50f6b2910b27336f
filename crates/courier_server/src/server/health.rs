#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::warn;

/// Per-component readiness, flipped as the gateway brings each piece up.
/// `/readyz` reports the components individually and goes 200 only once
/// the store and the QUIC endpoint are both up.
#[derive(Clone, Default)]
pub struct HealthState {
	inner: Arc<Components>,
}

#[derive(Default)]
struct Components {
	store: AtomicBool,
	endpoint: AtomicBool,
}

impl HealthState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn mark_store_ready(&self) {
		self.inner.store.store(true, Ordering::Relaxed);
	}

	pub fn mark_endpoint_ready(&self) {
		self.inner.endpoint.store(true, Ordering::Relaxed);
	}

	fn snapshot(&self) -> (bool, bool) {
		(
			self.inner.store.load(Ordering::Relaxed),
			self.inner.endpoint.load(Ordering::Relaxed),
		)
	}
}

pub fn spawn_health_server(bind: SocketAddr, state: HealthState) {
	tokio::spawn(async move {
		let listener = match TcpListener::bind(bind).await {
			Ok(l) => l,
			Err(err) => {
				warn!(error = %err, %bind, "health server failed to bind");
				return;
			}
		};

		loop {
			let (stream, _addr) = match listener.accept().await {
				Ok(conn) => conn,
				Err(err) => {
					warn!(error = %err, "health server accept failed");
					continue;
				}
			};

			let state = state.clone();
			tokio::spawn(async move {
				let service = service_fn(move |req: Request<Incoming>| {
					let (status, body) = render(req.method(), req.uri().path(), &state);
					async move {
						Ok::<_, hyper::Error>(
							Response::builder()
								.status(status)
								.body(Full::new(body))
								.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
						)
					}
				});
				if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
					warn!(error = %err, "health connection error");
				}
			});
		}
	});
}

/// Liveness is unconditional; readiness reflects the component flags.
fn render(method: &Method, path: &str, state: &HealthState) -> (StatusCode, Bytes) {
	if method != Method::GET {
		return (StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
	}

	match path {
		"/healthz" => (StatusCode::OK, Bytes::from_static(b"ok")),
		"/readyz" => {
			let (store, endpoint) = state.snapshot();
			let status = if store && endpoint {
				StatusCode::OK
			} else {
				StatusCode::SERVICE_UNAVAILABLE
			};
			let body = serde_json::json!({"store": store, "endpoint": endpoint}).to_string();
			(status, Bytes::from(body))
		}
		_ => (StatusCode::NOT_FOUND, Bytes::new()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn healthz_is_always_live() {
		let state = HealthState::new();
		let (status, body) = render(&Method::GET, "/healthz", &state);
		assert_eq!(status, StatusCode::OK);
		assert_eq!(&body[..], b"ok");
	}

	#[test]
	fn readyz_reports_components_and_flips_with_them() {
		let state = HealthState::new();

		let (status, body) = render(&Method::GET, "/readyz", &state);
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(json["store"], false);
		assert_eq!(json["endpoint"], false);

		state.mark_store_ready();
		let (status, _) = render(&Method::GET, "/readyz", &state);
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "endpoint still down");

		state.mark_endpoint_ready();
		let (status, body) = render(&Method::GET, "/readyz", &state);
		assert_eq!(status, StatusCode::OK);
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(json["store"], true);
		assert_eq!(json["endpoint"], true);
	}

	#[test]
	fn non_get_and_unknown_paths_are_rejected() {
		let state = HealthState::new();

		let (status, _) = render(&Method::POST, "/healthz", &state);
		assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

		let (status, _) = render(&Method::GET, "/metrics", &state);
		assert_eq!(status, StatusCode::NOT_FOUND);
	}
}

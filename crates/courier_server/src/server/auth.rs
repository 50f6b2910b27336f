#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

/// Claims carried by a verified access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthClaims {
	/// Account id of the token holder.
	pub sub: i64,

	/// Display name used for presence and message attribution.
	#[serde(default)]
	pub name: String,

	/// Expiry, unix seconds.
	pub exp: u64,
}

#[derive(Debug, Error)]
pub enum AuthError {
	/// Empty or absent token. Always a rejection; a connection is never
	/// admitted without presenting a credential.
	#[error("missing token")]
	MissingToken,

	#[error("invalid token format")]
	InvalidFormat,

	#[error("invalid token signature")]
	InvalidSignature,

	#[error("token expired")]
	Expired,

	#[error("malformed token claims")]
	MalformedClaims,
}

/// Verify a `v1.<payload_b64>.<sig_b64>` HMAC-SHA256 access token.
///
/// Signature is checked before the claims are decoded, with a
/// constant-time comparison.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthClaims, AuthError> {
	let token = token.trim();
	if token.is_empty() {
		return Err(AuthError::MissingToken);
	}

	let parts = token.split('.').collect::<Vec<_>>();
	if parts.len() != 3 || parts[0] != "v1" {
		return Err(AuthError::InvalidFormat);
	}

	let payload_b64 = parts[1];
	let sig_b64 = parts[2];

	let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| AuthError::InvalidFormat)?;
	let expected_sig = sign(payload_b64.as_bytes(), secret.as_bytes());
	let provided_sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| AuthError::InvalidFormat)?;

	if !constant_time_eq(&expected_sig, &provided_sig) {
		return Err(AuthError::InvalidSignature);
	}

	let claims: AuthClaims = serde_json::from_slice(&payload).map_err(|_| AuthError::MalformedClaims)?;
	let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
	if claims.exp <= now {
		return Err(AuthError::Expired);
	}

	Ok(claims)
}

fn sign(payload_b64: &[u8], secret: &[u8]) -> Vec<u8> {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac key");
	mac.update(payload_b64);
	mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}

	diff == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	const SECRET: &str = "test-secret";

	fn mint(sub: i64, name: &str, exp: u64, secret: &str) -> String {
		let payload = serde_json::json!({"sub": sub, "name": name, "exp": exp});
		let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
		let sig_b64 = URL_SAFE_NO_PAD.encode(sign(payload_b64.as_bytes(), secret.as_bytes()));
		format!("v1.{payload_b64}.{sig_b64}")
	}

	fn far_future() -> u64 {
		SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600
	}

	#[test]
	fn accepts_valid_token() {
		let token = mint(7, "User7", far_future(), SECRET);
		let claims = verify_token(&token, SECRET).expect("valid token");
		assert_eq!(claims.sub, 7);
		assert_eq!(claims.name, "User7");
	}

	#[test]
	fn missing_token_is_always_rejected() {
		assert!(matches!(verify_token("", SECRET), Err(AuthError::MissingToken)));
		assert!(matches!(verify_token("   ", SECRET), Err(AuthError::MissingToken)));
	}

	#[test]
	fn rejects_wrong_signature() {
		let token = mint(7, "User7", far_future(), "other-secret");
		assert!(matches!(verify_token(&token, SECRET), Err(AuthError::InvalidSignature)));
	}

	#[test]
	fn rejects_tampered_payload() {
		let token = mint(7, "User7", far_future(), SECRET);
		let parts: Vec<&str> = token.split('.').collect();
		let forged_payload = URL_SAFE_NO_PAD.encode(
			serde_json::json!({"sub": 8, "name": "User8", "exp": far_future()})
				.to_string()
				.as_bytes(),
		);
		let forged = format!("v1.{}.{}", forged_payload, parts[2]);
		assert!(matches!(verify_token(&forged, SECRET), Err(AuthError::InvalidSignature)));
	}

	#[test]
	fn rejects_expired_token() {
		let token = mint(7, "User7", 1, SECRET);
		assert!(matches!(verify_token(&token, SECRET), Err(AuthError::Expired)));
	}

	#[test]
	fn rejects_bad_format() {
		assert!(matches!(verify_token("v2.a.b", SECRET), Err(AuthError::InvalidFormat)));
		assert!(matches!(verify_token("v1.onlyone", SECRET), Err(AuthError::InvalidFormat)));
		assert!(matches!(verify_token("not-a-token", SECRET), Err(AuthError::InvalidFormat)));
	}

	#[test]
	fn rejects_malformed_claims() {
		let payload_b64 = URL_SAFE_NO_PAD.encode(b"{\"not\": \"claims\"}");
		let sig_b64 = URL_SAFE_NO_PAD.encode(sign(payload_b64.as_bytes(), SECRET.as_bytes()));
		let token = format!("v1.{payload_b64}.{sig_b64}");
		assert!(matches!(verify_token(&token, SECRET), Err(AuthError::MalformedClaims)));
	}
}

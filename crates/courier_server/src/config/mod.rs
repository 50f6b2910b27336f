#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use courier_domain::SecretString;
use serde::Deserialize;
use tracing::info;

/// Default config path: `~/.courier/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".courier").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub persistence: PersistenceSettings,
	pub cache: CacheSettings,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
	/// PEM-encoded certificate path for QUIC/TLS.
	pub tls_cert_path: Option<PathBuf>,
	/// PEM-encoded private key path for QUIC/TLS.
	pub tls_key_path: Option<PathBuf>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
	/// Optional REST read API bind address (host:port).
	pub http_bind: Option<String>,
	/// HMAC secret for handshake access tokens. Required.
	pub auth_hmac_secret: Option<SecretString>,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceSettings {
	/// Enable the SQL store; disabled runs on the in-memory store.
	pub enabled: bool,
	/// Database URL (sqlite: or postgres:).
	pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
	pub enabled: bool,
	/// Read-API response TTL in seconds.
	pub ttl_secs: u64,
	/// Entry cap before the cache sweeps and clears.
	pub max_entries: usize,
}

impl Default for CacheSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			ttl_secs: 120,
			max_entries: 4096,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	persistence: FilePersistenceSettings,

	#[serde(default)]
	cache: FileCacheSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	tls_cert_path: Option<String>,
	tls_key_path: Option<String>,
	metrics_bind: Option<String>,
	health_bind: Option<String>,
	http_bind: Option<String>,
	auth_hmac_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePersistenceSettings {
	enabled: Option<bool>,
	database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileCacheSettings {
	enabled: Option<bool>,
	ttl_secs: Option<u64>,
	max_entries: Option<usize>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let cache_defaults = CacheSettings::default();

		Self {
			server: ServerSettings {
				tls_cert_path: file.server.tls_cert_path.filter(|s| !s.trim().is_empty()).map(PathBuf::from),
				tls_key_path: file.server.tls_key_path.filter(|s| !s.trim().is_empty()).map(PathBuf::from),
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				health_bind: file.server.health_bind.filter(|s| !s.trim().is_empty()),
				http_bind: file.server.http_bind.filter(|s| !s.trim().is_empty()),
				auth_hmac_secret: file
					.server
					.auth_hmac_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
			},
			persistence: PersistenceSettings {
				enabled: file.persistence.enabled.unwrap_or(false),
				database_url: file.persistence.database_url.filter(|s| !s.trim().is_empty()),
			},
			cache: CacheSettings {
				enabled: file.cache.enabled.unwrap_or(cache_defaults.enabled),
				ttl_secs: file.cache.ttl_secs.unwrap_or(cache_defaults.ttl_secs),
				max_entries: file.cache.max_entries.unwrap_or(cache_defaults.max_entries),
			},
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("COURIER_TLS_CERT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.tls_cert_path = Some(PathBuf::from(v));
			info!("server config: tls_cert_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_TLS_KEY") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.tls_key_path = Some(PathBuf::from(v));
			info!("server config: tls_key_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_AUTH_HMAC_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.auth_hmac_secret = Some(SecretString::new(v));
			info!("server auth: auth_hmac_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_HEALTH_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.health_bind = Some(v);
			info!("server config: health_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_HTTP_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.http_bind = Some(v);
			info!("server config: http_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_PERSISTENCE_ENABLED")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.persistence.enabled = enabled;
		info!(enabled, "persistence: enabled overridden by env");
	}

	if let Ok(v) = std::env::var("COURIER_PERSISTENCE_DATABASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.persistence.database_url = Some(v);
			info!("persistence: database_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("COURIER_CACHE_ENABLED")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.cache.enabled = enabled;
		info!(enabled, "cache: enabled overridden by env");
	}

	if let Ok(v) = std::env::var("COURIER_CACHE_TTL_SECS")
		&& let Ok(ttl) = v.trim().parse::<u64>()
	{
		cfg.cache.ttl_secs = ttl;
		info!(ttl, "cache: ttl_secs overridden by env");
	}

	if let Ok(v) = std::env::var("COURIER_CACHE_MAX_ENTRIES")
		&& let Ok(max) = v.trim().parse::<usize>()
	{
		cfg.cache.max_entries = max;
		info!(max, "cache: max_entries overridden by env");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_config() {
		let cfg: FileConfig = toml::from_str(
			r#"
			[server]
			auth_hmac_secret = "s3cret"
			http_bind = "127.0.0.1:8080"

			[persistence]
			enabled = true
			database_url = "sqlite://courier.db"

			[cache]
			enabled = false
			ttl_secs = 30
			"#,
		)
		.unwrap();
		let cfg = ServerConfig::from_file(cfg);

		assert_eq!(cfg.server.http_bind.as_deref(), Some("127.0.0.1:8080"));
		assert!(cfg.persistence.enabled);
		assert_eq!(cfg.persistence.database_url.as_deref(), Some("sqlite://courier.db"));
		assert!(!cfg.cache.enabled);
		assert_eq!(cfg.cache.ttl_secs, 30);
		assert_eq!(cfg.cache.max_entries, CacheSettings::default().max_entries);
	}

	#[test]
	fn empty_file_yields_defaults() {
		let cfg = ServerConfig::from_file(FileConfig::default());

		assert!(cfg.server.auth_hmac_secret.is_none());
		assert!(!cfg.persistence.enabled);
		assert!(cfg.cache.enabled);
		assert_eq!(cfg.cache.ttl_secs, 120);
	}
}

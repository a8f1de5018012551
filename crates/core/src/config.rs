use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub tables: TablesConfig,
    pub ingest: IngestConfig,
    pub objects: ObjectStoreConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TICKSINK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TICKSINK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            tables: TablesConfig::from_env_profiled(p),
            ingest: IngestConfig::from_env_profiled(p),
            objects: ObjectStoreConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:      region={}, endpoint={}, static_credentials={}",
            self.aws.region,
            self.aws.endpoint_url.as_deref().unwrap_or("(default)"),
            self.aws.has_static_credentials()
        );
        tracing::info!(
            "  tables:   files={}, ticks={}, fundamentals={}",
            self.tables.files, self.tables.ticks, self.tables.fundamentals
        );
        tracing::info!(
            "  ingest:   tick_prefix={}, fundamentals_prefix={}, ttl_days={}/{}/{}",
            self.ingest.tick_prefix,
            self.ingest.fundamentals_prefix,
            self.ingest.tick_ttl_days,
            self.ingest.fundamentals_ttl_days,
            self.ingest.marker_ttl_days
        );
        tracing::info!("  objects:  backend={}", self.objects.backend);
        tracing::info!(
            "  queue:    url={}",
            self.queue.queue_url.as_deref().unwrap_or("(none)")
        );
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Endpoint override with a scheme attached; SDKs require absolute URLs.
    pub fn endpoint_with_scheme(&self) -> Option<String> {
        let endpoint = self.endpoint_url.as_deref()?;
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Some(endpoint.to_string())
        } else {
            Some(format!("https://{endpoint}"))
        }
    }
}

// ── Key-value tables ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    /// File-level import markers, keyed by `file_name`.
    pub files: String,
    /// Tick samples, keyed by `(symbol, timestamp)`.
    pub ticks: String,
    /// Fundamentals snapshots, keyed by `(symbol, as_of)`.
    pub fundamentals: String,
}

impl TablesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            files: profiled_env_or(p, "FILES_TABLE", "imported_files"),
            ticks: profiled_env_or(p, "TICKS_TABLE", "ticks"),
            fundamentals: profiled_env_or(p, "FUNDAMENTALS_TABLE", "fundamentals"),
        }
    }
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            files: "imported_files".into(),
            ticks: "ticks".into(),
            fundamentals: "fundamentals".into(),
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub tick_prefix: String,
    pub fundamentals_prefix: String,
    /// Days until tick records expire (0 = no ttl attribute).
    pub tick_ttl_days: u32,
    pub fundamentals_ttl_days: u32,
    pub marker_ttl_days: u32,
    /// Ceiling on the decompressed payload size.
    pub max_payload_mb: u32,
}

impl IngestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tick_prefix: profiled_env_or(p, "TICK_PREFIX", "magnificent7"),
            fundamentals_prefix: profiled_env_or(p, "FUNDAMENTALS_PREFIX", "fundamentals"),
            tick_ttl_days: profiled_env_u32(p, "TICK_TTL_DAYS", 90),
            fundamentals_ttl_days: profiled_env_u32(p, "FUNDAMENTALS_TTL_DAYS", 90),
            marker_ttl_days: profiled_env_u32(p, "IMPORT_MARKER_TTL_DAYS", 0),
            max_payload_mb: profiled_env_u32(p, "MAX_PAYLOAD_MB", 256),
        }
    }

    pub fn max_payload_bytes(&self) -> u64 {
        u64::from(self.max_payload_mb) * 1024 * 1024
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tick_prefix: "magnificent7".into(),
            fundamentals_prefix: "fundamentals".into(),
            tick_ttl_days: 90,
            fundamentals_ttl_days: 90,
            marker_ttl_days: 0,
            max_payload_mb: 256,
        }
    }
}

// ── Object store ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// "s3", "local", "memory"
    pub backend: String,
    /// Root directory for the local backend; buckets are subdirectories.
    pub local_root: PathBuf,
}

impl ObjectStoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "OBJECT_STORE", "s3"),
            local_root: PathBuf::from(profiled_env_or(p, "LOCAL_OBJECT_ROOT", "data/objects")),
        }
    }
}

// ── Queue ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: Option<String>,
    pub visibility_timeout_secs: u32,
    pub max_messages: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_opt(p, "QUEUE_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 300),
            max_messages: profiled_env_u32(p, "QUEUE_MAX_MESSAGES", 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        let keys = [
            "TICKSINK_PROFILE",
            "TICKS_TABLE",
            "TEST_TICKS_TABLE",
            "TICK_PREFIX",
            "TICK_TTL_DAYS",
            "AWS_ENDPOINT_URL",
        ];
        for k in keys {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let cfg = Config::for_profile("");
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.tables.ticks, "ticks");
        assert_eq!(cfg.ingest.tick_prefix, "magnificent7");
        assert_eq!(cfg.ingest.tick_ttl_days, 90);
        assert_eq!(cfg.ingest.marker_ttl_days, 0);
    }

    #[test]
    fn profiled_env_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("TICKS_TABLE", "base_ticks");
        env::set_var("TEST_TICKS_TABLE", "test_ticks");

        assert_eq!(Config::for_profile("test").tables.ticks, "test_ticks");
        assert_eq!(Config::for_profile("").tables.ticks, "base_ticks");

        clear_env();
    }

    #[test]
    fn invalid_number_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("TICK_TTL_DAYS", "forever");
        assert_eq!(Config::for_profile("").ingest.tick_ttl_days, 90);

        clear_env();
    }

    #[test]
    fn endpoint_gets_scheme() {
        let mut aws = AwsConfig {
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: Some("localhost:4566".into()),
        };
        assert_eq!(aws.endpoint_with_scheme().as_deref(), Some("https://localhost:4566"));

        aws.endpoint_url = Some("http://localhost:4566".into());
        assert_eq!(aws.endpoint_with_scheme().as_deref(), Some("http://localhost:4566"));

        aws.endpoint_url = None;
        assert!(aws.endpoint_with_scheme().is_none());
    }

    #[test]
    fn payload_ceiling_in_bytes() {
        let cfg = IngestConfig { max_payload_mb: 2, ..IngestConfig::default() };
        assert_eq!(cfg.max_payload_bytes(), 2 * 1024 * 1024);
    }
}

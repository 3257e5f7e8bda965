//! Layered configuration: compiled-in defaults, then an optional `.ini`
//! file, then environment variable overrides. Per-process identity (bind
//! addresses, peer to join, dev-mode) is intentionally NOT here — that
//! stays on the CLI (`cli.rs`), matching the separation the codebase this
//! was adapted from draws between "ambient deployment config" and
//! "this process's identity".

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;
use log::{info, warn};

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub ping: Duration,
    pub find_successor: Duration,
    pub get: Duration,
    pub put: Duration,
    pub delete: Duration,
    pub exists: Duration,
    pub stabilize: Duration,
    pub replicate: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            ping: Duration::from_secs(2),
            find_successor: Duration::from_secs(4),
            get: Duration::from_secs(6),
            put: Duration::from_secs(10),
            delete: Duration::from_secs(6),
            exists: Duration::from_secs(6),
            stabilize: Duration::from_secs(6),
            replicate: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub m_bits: u32,
    pub replication_k: usize,
    pub stabilize_interval: Duration,
    pub replication_interval: Duration,
    pub discovery_interval: Duration,
    pub timer_interval: Duration,
    pub default_port: u16,
    pub network_alias: String,
    pub node_host: Option<String>,
    pub use_tls: bool,
    pub tls_ca_cert: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub timeouts: Timeouts,
    pub store_path: PathBuf,
    pub cache_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            m_bits: 8,
            replication_k: 3,
            stabilize_interval: Duration::from_secs(3),
            replication_interval: Duration::from_secs(3),
            discovery_interval: Duration::from_secs(5),
            timer_interval: Duration::from_secs(5),
            default_port: 5000,
            network_alias: "ringsocial".to_string(),
            node_host: None,
            use_tls: false,
            tls_ca_cert: None,
            tls_cert: None,
            tls_key: None,
            timeouts: Timeouts::default(),
            store_path: PathBuf::from("database.json"),
            cache_path: PathBuf::from("peer_cache.json"),
        }
    }
}

impl Config {
    /// Loads defaults, overlays an `.ini` file at `ini_path` if given and
    /// present, then overlays environment variables. Never fails on a
    /// missing or malformed ini file — it's logged and skipped, same
    /// tolerance the local store gives a corrupted database file.
    pub fn load(ini_path: Option<&PathBuf>) -> Config {
        let mut config = Config::default();

        if let Some(path) = ini_path {
            match Ini::load_from_file(path) {
                Ok(ini) => config.apply_ini(&ini),
                Err(e) => warn!("Failed to load config file {:?}: {}, using defaults", path, e),
            }
        }

        config.apply_env();
        info!(
            "Config loaded: m_bits={} replication_k={} default_port={}",
            config.m_bits, config.replication_k, config.default_port
        );
        config
    }

    fn apply_ini(&mut self, ini: &Ini) {
        let section = ini.section::<String>(None);

        macro_rules! ini_u32 {
            ($key:literal, $field:expr) => {
                if let Some(v) = section.and_then(|s| s.get($key)).and_then(|v| v.parse().ok()) {
                    $field = v;
                }
            };
        }
        macro_rules! ini_secs {
            ($key:literal, $field:expr) => {
                if let Some(v) = section.and_then(|s| s.get($key)).and_then(|v| v.parse::<u64>().ok()) {
                    $field = Duration::from_millis(v);
                }
            };
        }

        ini_u32!("M_BITS", self.m_bits);
        if let Some(v) = section
            .and_then(|s| s.get("REPLICATION_K"))
            .and_then(|v| v.parse().ok())
        {
            self.replication_k = v;
        }
        ini_secs!("STABILIZE_INTERVAL_MS", self.stabilize_interval);
        ini_secs!("REPLICATION_INTERVAL_MS", self.replication_interval);
        ini_secs!("DISCOVERY_INTERVAL_MS", self.discovery_interval);
        ini_secs!("TIMER_INTERVAL_MS", self.timer_interval);

        if let Some(v) = section
            .and_then(|s| s.get("DEFAULT_PORT"))
            .and_then(|v| v.parse().ok())
        {
            self.default_port = v;
        }
        if let Some(v) = section.and_then(|s| s.get("NETWORK_ALIAS")) {
            self.network_alias = v.to_string();
        }
        if let Some(v) = section.and_then(|s| s.get("NODE_HOST")) {
            self.node_host = Some(v.to_string());
        }
        if let Some(v) = section.and_then(|s| s.get("USE_TLS")) {
            self.use_tls = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = section.and_then(|s| s.get("TLS_CA_CERT")) {
            self.tls_ca_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = section.and_then(|s| s.get("TLS_CERT")) {
            self.tls_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = section.and_then(|s| s.get("TLS_KEY")) {
            self.tls_key = Some(PathBuf::from(v));
        }
    }

    fn apply_env(&mut self) {
        use std::env::var;

        if let Ok(v) = var("M_BITS") {
            if let Ok(v) = v.parse() {
                self.m_bits = v;
            }
        }
        if let Ok(v) = var("REPLICATION_K") {
            if let Ok(v) = v.parse() {
                self.replication_k = v;
            }
        }
        if let Ok(v) = var("STABILIZE_INTERVAL_MS") {
            if let Ok(v) = v.parse() {
                self.stabilize_interval = Duration::from_millis(v);
            }
        }
        if let Ok(v) = var("REPLICATION_INTERVAL_MS") {
            if let Ok(v) = v.parse() {
                self.replication_interval = Duration::from_millis(v);
            }
        }
        if let Ok(v) = var("DISCOVERY_INTERVAL_MS") {
            if let Ok(v) = v.parse() {
                self.discovery_interval = Duration::from_millis(v);
            }
        }
        if let Ok(v) = var("TIMER_INTERVAL_MS") {
            if let Ok(v) = v.parse() {
                self.timer_interval = Duration::from_millis(v);
            }
        }
        if let Ok(v) = var("DEFAULT_PORT") {
            if let Ok(v) = v.parse() {
                self.default_port = v;
            }
        }
        if let Ok(v) = var("NETWORK_ALIAS") {
            self.network_alias = v;
        }
        if let Ok(v) = var("NODE_HOST") {
            self.node_host = Some(v);
        }
        if let Ok(v) = var("USE_TLS") {
            self.use_tls = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = var("TLS_CA_CERT") {
            self.tls_ca_cert = Some(PathBuf::from(v));
        }
        if let Ok(v) = var("TLS_CERT") {
            self.tls_cert = Some(PathBuf::from(v));
        }
        if let Ok(v) = var("TLS_KEY") {
            self.tls_key = Some(PathBuf::from(v));
        }
        if let Ok(v) = var("STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Ok(v) = var("CACHE_PATH") {
            self.cache_path = PathBuf::from(v);
        }

        // m_bits above 64 can't be represented by the u64 ring id this
        // implementation uses; clamp rather than silently truncate further.
        if self.m_bits < 1 {
            self.m_bits = 1;
        } else if self.m_bits > 64 {
            warn!("M_BITS={} exceeds the 64-bit ring id this implementation supports; clamping to 64", self.m_bits);
            self.m_bits = 64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.m_bits, 8);
        assert_eq!(config.replication_k, 3);
    }

    #[test]
    fn m_bits_clamped_to_64() {
        std::env::set_var("M_BITS", "200");
        let config = Config::load(None);
        assert_eq!(config.m_bits, 64);
        std::env::remove_var("M_BITS");
    }
}

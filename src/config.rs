use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub uploads_dir: PathBuf,
    pub public_url_prefix: String,
    pub worker_poll_interval: Duration,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let uploads_dir = env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string());
        let public_url_prefix =
            env::var("PUBLIC_URL_PREFIX").unwrap_or_else(|_| "/uploads".to_string());
        let poll_ms = env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            uploads_dir: PathBuf::from(uploads_dir),
            public_url_prefix,
            worker_poll_interval: Duration::from_millis(poll_ms),
            bind_addr,
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

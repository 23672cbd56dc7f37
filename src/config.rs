use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    pub storage_bucket: String,
    pub feed_page_size: u32,
    pub max_thread_depth: u32,
    pub request_timeout_secs: u64,
    pub max_read_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            api_base_url: env::var("API_BASE_URL")?,
            api_key: env::var("API_KEY")?,
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "images".to_string()),
            feed_page_size: env::var("FEED_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_thread_depth: env::var("MAX_THREAD_DEPTH")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_read_retries: env::var("MAX_READ_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            retry_backoff_ms: env::var("RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .unwrap_or(250),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            storage_bucket: "images".to_string(),
            feed_page_size: 10,
            max_thread_depth: 5,
            request_timeout_secs: 10,
            max_read_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

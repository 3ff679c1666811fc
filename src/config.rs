use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub dataset_path: PathBuf,
    pub kb_dir: PathBuf,
    pub ask_default_k: usize,
    pub ask_max_k: usize,
    pub generation_provider: Option<String>,
    pub generation_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub ollama_host: String,
    pub generation_timeout_seconds: u64,
    /// Mean depth (m bgl) beyond which a selection is flagged critical.
    pub critical_depth_m: f64,
    /// Year-over-year mean change (m) treated as a real shift rather
    /// than noise.
    pub decline_threshold_m: f64,
    /// Minimum pre-to-post-monsoon recovery (m) considered adequate.
    pub recovery_threshold_m: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw = env::var("BHUJAL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let dataset_path = PathBuf::from(
            env::var("BHUJAL_DATASET_PATH").unwrap_or_else(|_| "data/water_levels.csv".to_string()),
        );

        let kb_dir = PathBuf::from(env::var("BHUJAL_KB_DIR").unwrap_or_else(|_| "kb".to_string()));

        let ask_default_k = env::var("BHUJAL_ASK_DEFAULT_K")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(5);

        let ask_max_k = env::var("BHUJAL_ASK_MAX_K")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25);

        let generation_provider = non_empty(env::var("BHUJAL_GENERATION_PROVIDER").ok());
        let generation_model = non_empty(env::var("BHUJAL_GENERATION_MODEL").ok());
        let openai_api_key = non_empty(env::var("OPENAI_API_KEY").ok());

        let openai_base_url = env::var("BHUJAL_OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let ollama_host =
            env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());

        let generation_timeout_seconds = env::var("BHUJAL_GENERATION_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let critical_depth_m = env::var("BHUJAL_CRITICAL_DEPTH_M")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(25.0);

        let decline_threshold_m = env::var("BHUJAL_DECLINE_THRESHOLD_M")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.25);

        let recovery_threshold_m = env::var("BHUJAL_RECOVERY_THRESHOLD_M")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.5);

        Ok(Self {
            bind_addr,
            dataset_path,
            kb_dir,
            ask_default_k,
            ask_max_k,
            generation_provider,
            generation_model,
            openai_api_key,
            openai_base_url,
            ollama_host,
            generation_timeout_seconds,
            critical_depth_m,
            decline_threshold_m,
            recovery_threshold_m,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

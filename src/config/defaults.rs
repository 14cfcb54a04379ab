//! Default values for configuration

/// Default Firecrawl poll interval (milliseconds)
pub fn default_poll_interval_ms() -> u64 {
    2000
}

/// Default Firecrawl request timeout in seconds
pub fn default_crawl_timeout() -> u64 {
    30
}

/// Default Qdrant collection name
pub fn default_collection_name() -> String {
    "demo_collection".to_string()
}

/// Default distance metric
pub fn default_distance() -> String {
    "cosine".to_string()
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    "http://127.0.0.1:7997".to_string()
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches bge-small-en-v1.5)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default OpenAI-compatible API base
pub fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Default chat model
pub fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Default wait for the next streamed chat chunk (seconds)
pub fn default_chat_idle_timeout() -> u64 {
    60
}

/// Default dashboard bind address
pub fn default_bind_addr() -> String {
    "127.0.0.1:8501".to_string()
}

/// Default page limit offered by the dashboard slider
pub fn default_page_limit() -> u32 {
    10
}

/// Upper bound for the page limit
pub fn default_max_page_limit() -> u32 {
    100
}

/// Default idle lifetime of a browser session (seconds)
pub fn default_session_ttl() -> u64 {
    3600
}

/// Default ceiling on live browser sessions
pub fn default_max_sessions() -> usize {
    1000
}

/// Default log directory
pub fn default_log_dir() -> String {
    "logs".to_string()
}

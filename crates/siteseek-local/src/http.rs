use crate::config::AssistantConfig;
use siteseek_core::{Error, Result};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("siteseek/", env!("CARGO_PKG_VERSION"));

/// The shared client: cookies are kept so same-origin requests carry the
/// session the way a browser's credentialed fetch would.
pub fn build_client(config: &AssistantConfig) -> Result<reqwest::Client> {
    let mut b = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true);
    if config.request_timeout_ms > 0 {
        b = b.timeout(Duration::from_millis(config.request_timeout_ms));
    }
    b.build().map_err(|e| Error::Fetch(e.to_string()))
}

/// Whether a `Content-Type` value names JSON (`application/json`, `+json` types).
pub fn is_json_content_type(ct: &str) -> bool {
    let ct = ct.to_ascii_lowercase();
    let essence = ct.split(';').next().unwrap_or("").trim();
    essence == "application/json" || essence.ends_with("+json") || essence == "text/json"
}

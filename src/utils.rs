use once_cell::sync::Lazy;

use crate::app::DEFAULT_BASE_URL;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

/// Base URL as the backend expects it: scheme present, no trailing slash or
/// whitespace. An empty value falls back to the default backend.
pub fn normalize_base_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

//! Environment helpers for the chat engine

use std::env;

/// Environment variable holding the default backend URL.
pub const API_URL_ENV: &str = "CHAT_ENGINE_API_URL";

/// Environment variable holding the default model name.
pub const MODEL_ENV: &str = "CHAT_ENGINE_MODEL";

/// Get the backend URL from the environment or the fallback
///
/// Priority:
/// 1. `CHAT_ENGINE_API_URL` environment variable (if set and non-empty)
/// 2. fallback parameter
///
/// # Examples
///
/// ```rust,no_run
/// use chat_engine::get_api_url;
///
/// let url = get_api_url(Some("http://localhost:3000/api/chat"));
/// ```
pub fn get_api_url(fallback: Option<&str>) -> Option<String> {
    read_env(API_URL_ENV).or_else(|| fallback.map(str::to_string))
}

/// Get the model name from the environment or the fallback
///
/// Priority:
/// 1. `CHAT_ENGINE_MODEL` environment variable (if `prefer_env` is true)
/// 2. fallback parameter
///
/// # Examples
///
/// ```rust,no_run
/// use chat_engine::get_model;
///
/// // Read from environment, falling back to a fixed name
/// let model = get_model(Some("gpt-4.1-mini"), true);
///
/// // Force fallback (ignore environment)
/// let model = get_model(Some("specific-model"), false);
/// ```
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Some(model) = read_env(MODEL_ENV) {
            return Some(model);
        }
    }

    fallback.map(str::to_string)
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

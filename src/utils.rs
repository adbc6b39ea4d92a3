/// Small helpers shared across the engine
pub mod backoff;

use std::time::{SystemTime, UNIX_EPOCH};

pub use backoff::{BackoffStrategy, exponential_backoff};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Replace `${MACRO}` occurrences in a tracking URL or payload value
pub fn expand_macros(template: &str, macros: &[(&str, String)]) -> String {
    macros
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("${{{}}}", name), value)
        })
}

use std::time::Duration;
use url::Url;

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff before retry number `attempt` (1-based):
/// `base`, `2 * base`, `4 * base`, ... capped at thirty seconds.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let millis = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// Resolve an href found on `base` into an absolute URL without fragment
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let mut resolved = base.join(href.trim()).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}

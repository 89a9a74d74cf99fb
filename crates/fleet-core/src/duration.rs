//! Duration strings used in `fleet.toml` (`"5s"`, `"500ms"`, `"2m"`).

use std::time::Duration;

/// Parse `"<n>ms"`, `"<n>s"`, `"<n>m"` or a bare `<n>` (seconds).
/// Values that do not fit a `Duration` are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let unit_at = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (amount, unit) = s.split_at(unit_at);
    let amount: u64 = amount.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" | "" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

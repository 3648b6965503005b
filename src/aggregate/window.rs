/// Window used when a request has no window or an unparseable one.
pub const DEFAULT_WINDOW_SECS: u64 = 900;

/// Parses a window such as `15m` into seconds.
///
/// | Suffix | Unit    |
/// |--------|---------|
/// | `s`    | seconds |
/// | `m`    | minutes |
/// | `h`    | hours   |
/// | `d`    | days    |
///
/// Returns `None` for anything else, including a zero magnitude.
pub fn parse_window(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let unit = raw.chars().last()?;
    let magnitude = &raw[..raw.len() - unit.len_utf8()];
    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u64 = magnitude.parse().ok()?;
    let factor = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return None,
    };

    match value.checked_mul(factor) {
        Some(0) | None => None,
        Some(secs) => Some(secs),
    }
}

/// Resolves an optional window string, falling back to [`DEFAULT_WINDOW_SECS`].
pub fn window_secs_or_default(raw: Option<&str>) -> u64 {
    raw.and_then(parse_window).unwrap_or(DEFAULT_WINDOW_SECS)
}

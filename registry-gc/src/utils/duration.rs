use std::time::Duration;

/// Parses human durations such as `90s`, `1h30m`, `1h 30m`, `500us` or `1d`.
///
/// A bare `0` is accepted, and a leading `-` yields [`Duration::ZERO`], which
/// callers treat as "disabled".
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    let parsed = humantime::parse_duration(body)
        .map_err(|e| format!("invalid duration `{input}`: {e}"))?;
    if negative {
        return Ok(Duration::ZERO);
    }
    Ok(parsed)
}

//! `24h0m0s`-style durations for `--expiration`

use std::time::Duration;

/// Parse a sequence of `<number><unit>` terms where unit is `h`, `m` or `s`,
/// e.g. `24h`, `90m`, `1h30m`, `24h0m0s`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".into());
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let scale = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown unit {other:?} in {input:?} (use h, m, s)")),
        };
        if digits.is_empty() {
            return Err(format!("unit {c:?} without a number in {input:?}"));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("number too large in {input:?}"))?;
        total = value
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration too large: {input:?}"))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after {digits:?} in {input:?} (use h, m, s)"));
    }
    Ok(Duration::from_secs(total))
}

/// Render whole seconds as `XhYmZs`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

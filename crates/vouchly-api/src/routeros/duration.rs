// RouterOS duration strings
//
// RouterOS prints durations as unit-suffixed groups (`1w2d3h4m5s`,
// `350ms`), older builds as `1d02:03:04`, and some fields as plain seconds.

use std::time::Duration;

/// Parse a RouterOS duration. Returns `None` for anything malformed.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok().map(Duration::from_secs);
    }

    let (units, clock) = if raw.contains(':') {
        match raw.rfind(|c: char| c.is_ascii_alphabetic()) {
            Some(idx) => (&raw[..=idx], Some(&raw[idx + 1..])),
            None => ("", Some(raw)),
        }
    } else {
        (raw, None)
    };

    let mut total_ms = parse_unit_groups(units)?;
    if let Some(clock) = clock {
        total_ms = total_ms.checked_add(parse_clock(clock)?)?;
    }
    Some(Duration::from_millis(total_ms))
}

fn parse_unit_groups(units: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut value: u64 = 0;
    let mut seen_digit = false;
    let mut chars = units.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(d) = c.to_digit(10) {
            value = value.checked_mul(10)?.checked_add(u64::from(d))?;
            seen_digit = true;
            continue;
        }
        if !seen_digit {
            return None;
        }
        let factor: u64 = match c {
            'w' => 604_800_000,
            'd' => 86_400_000,
            'h' => 3_600_000,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            'm' => 60_000,
            's' => 1_000,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(factor)?)?;
        value = 0;
        seen_digit = false;
    }

    // A trailing number without a unit is malformed.
    if seen_digit { None } else { Some(total) }
}

fn parse_clock(clock: &str) -> Option<u64> {
    let mut parts = clock.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let h: u64 = h.parse().ok()?;
    let m: u64 = m.parse().ok()?;
    let s: u64 = s.parse().ok()?;
    if m >= 60 || s >= 60 {
        return None;
    }
    h.checked_mul(3600)?
        .checked_add(m * 60 + s)?
        .checked_mul(1000)
}

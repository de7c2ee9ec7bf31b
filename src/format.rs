//! Human-readable rendering for progress output.

/// `bytes` in SI units with one decimal, e.g. `"1.5 MB"`.
pub fn human_bytes_si(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    // 999.95 would round up to "1000.0", so promote it.
    while value >= 999.95 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// A ratio as a percentage with up to six fractional digits, trailing zeros
/// trimmed but at least one kept (`0.5` -> `"50.0%"`).
pub fn percent(ratio: f64) -> String {
    let s = format!("{:.6}", ratio * 100.0);
    let trimmed = s.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{}0%", trimmed)
    } else {
        format!("{}%", trimmed)
    }
}

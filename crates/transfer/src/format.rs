const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

/// Formats a byte count for humans, using 1024 as the base.
///
/// Values under 1 KiB print as whole bytes; larger values use two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Format bytes in human-readable format (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= KIB && unit_index < UNITS.len() - 1 {
        size /= KIB;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Bytes as megabytes with two decimals, without a unit suffix.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / MIB)
}

/// Parse a human-readable volume such as `"12.50 MB"`, `"3 KB"` or `"800 B"`
/// back into bytes. A bare number is taken as bytes. Units are binary and
/// case-insensitive.
pub fn parse_volume(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "KB" | "KIB" | "K" => KIB,
        "MB" | "MIB" | "M" => MIB,
        "GB" | "GIB" | "G" => MIB * KIB,
        "TB" | "TIB" | "T" => MIB * MIB,
        _ => return None,
    };

    Some((value * multiplier).round() as u64)
}

//! Byte size parsing and formatting.

/// Parse a listing size such as `1.2 MB`, `700K`, `3 GiB` or `512 B`.
///
/// Decimal units (`KB`, `MB`, ... and the bare `K`, `M`, ...) are
/// 1000-based; binary units (`KiB`, `MiB`, ...) are 1024-based. Commas are
/// treated as thousands separators. Returns `None` for anything else,
/// including the `-` placeholder used for directories.
pub fn parse_size(raw: &str) -> Option<u64> {
    let text = raw.trim().replace(',', "");
    if text.is_empty() {
        return None;
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    if number.is_empty() {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    let multiplier = unit_multiplier(unit.trim())?;

    Some((value * multiplier as f64).round() as u64)
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" | "byte" | "bytes" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return None,
    };
    Some(multiplier)
}

/// Human-readable size, 1024-based with one decimal (`1.5MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["", "K", "M", "G", "T", "P"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}EB")
}

/// Like [`format_size`], with `Unknown` for missing values.
pub fn format_optional_size(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "Unknown".to_string(), format_size)
}

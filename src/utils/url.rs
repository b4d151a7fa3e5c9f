// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Last path segment of a URL, percent-decoded, without query or fragment.
///
/// # Examples
/// ```
/// use romscout::utils::url::file_name_from_url;
///
/// assert_eq!(
///     file_name_from_url("https://example.com/gb/Tetris%20(World).zip?x=1"),
///     Some("Tetris (World).zip".to_string())
/// );
/// ```
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode_binary(last.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);
    if decoded.trim().is_empty() {
        None
    } else {
        Some(decoded.into_owned())
    }
}

/// Build a safe local file name for a download.
///
/// Prefers the URL's file name, falls back to the entry name, then to
/// `download`. `+` becomes a space; anything other than word characters,
/// `.`, `-`, whitespace and parentheses is replaced by a space; whitespace
/// is collapsed. If the result lost its extension, the extension of the URL
/// file name or the entry name is appended again.
pub fn sanitize_file_name(url: &str, name: Option<&str>) -> String {
    let base = file_name_from_url(url).unwrap_or_default();
    let name = name.unwrap_or("").trim();

    let candidate = if !base.is_empty() {
        base.as_str()
    } else if !name.is_empty() {
        name
    } else {
        "download"
    };

    let cleaned: String = candidate
        .replace('+', " ")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '.' | '-' | '(' | ')')
            {
                c
            } else {
                ' '
            }
        })
        .collect();
    let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().all(|c| c == '.') {
        cleaned = "download".to_string();
    }

    if !cleaned.contains('.') {
        let ext = extension(&base).or_else(|| extension(name));
        if let Some(ext) = ext {
            cleaned = format!("{cleaned}.{ext}");
        }
    }
    cleaned
}

fn extension(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.trim();
    if ext.is_empty() || !ext.chars().all(|c| c.is_alphanumeric()) {
        None
    } else {
        Some(ext)
    }
}

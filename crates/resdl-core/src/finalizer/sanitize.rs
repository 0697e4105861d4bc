//! Local file name derivation for delivered artifacts.

const NAME_MAX: usize = 255;
const FALLBACK: &str = "download.bin";

/// Turns a remote file name into a safe single path component.
///
/// Separators, NUL and control characters become `_` (runs collapse to one),
/// leading/trailing dots and whitespace are dropped, and the result is cut to
/// 255 bytes. Names that end up empty, `.` or `..` fall back to `download.bin`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if matches!(c, '/' | '\\' | '\0') || c.is_control() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    match &trimmed[..end] {
        "" | "_" => FALLBACK.to_string(),
        name => name.to_string(),
    }
}

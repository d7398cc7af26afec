//! Helpers for putting untrusted player text (chat lines, display names) into logs.

/// Longest preview of player text written to a log line.
const MAX_PREVIEW: usize = 120;

/// Render player-supplied text as a single bounded log line.
///
/// Control characters are escaped (`\n`, `\r`, `\t`, `\xNN`), backslashes are
/// doubled, and anything past `MAX_PREVIEW` characters is cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

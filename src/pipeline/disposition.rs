//! `Content-Disposition` parsing for attachment downloads.

use std::borrow::Cow;

pub fn is_attachment(disposition: &str) -> bool {
    disposition.to_ascii_lowercase().contains("attachment")
}

/// Picks the file name for an attachment and reduces it to a safe base name.
///
/// Priority: `explicit`, then `filename*=`, then `filename=`. Returns an empty
/// string when none of them yields a name.
pub fn resolve_filename(disposition: &str, explicit: Option<&str>) -> String {
    let raw = match explicit.filter(|name| !name.trim().is_empty()) {
        Some(name) => name.to_string(),
        None => extended_filename(disposition)
            .or_else(|| plain_filename(disposition))
            .unwrap_or_default(),
    };
    sanitize(&raw)
}

/// `filename*=UTF-8''<percent-encoded>`; other charsets are decoded as-is.
fn extended_filename(disposition: &str) -> Option<String> {
    let value = param(disposition, "filename*")?;
    let encoded = match find_ignore_case(value, "utf-8''") {
        Some(idx) => &value[idx + "utf-8''".len()..],
        None => value,
    };
    Some(percent_decode(encoded.trim()))
}

/// `filename="..."`, `filename='...'` or a bare token.
fn plain_filename(disposition: &str) -> Option<String> {
    let value = param(disposition, "filename")?;
    let unquoted = value.trim_start_matches(['"', '\'']);
    let name: String = unquoted
        .chars()
        .take_while(|c| !matches!(c, '"' | '\'' | ';'))
        .collect();
    if name.is_empty() { None } else { Some(name) }
}

fn param<'a>(disposition: &'a str, wanted: &str) -> Option<&'a str> {
    disposition.split(';').find_map(|segment| {
        let (name, value) = segment.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case(wanted)
            .then(|| value.trim())
    })
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn percent_decode(encoded: &str) -> String {
    match urlencoding::decode(encoded) {
        Ok(Cow::Borrowed(decoded)) => decoded.to_string(),
        Ok(Cow::Owned(decoded)) => decoded,
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes()))
            .into_owned(),
    }
}

fn sanitize(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let trimmed = spaced.trim();
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed).trim();
    match base {
        "." | ".." => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_attachment_case_insensitively() {
        assert!(is_attachment("Attachment; filename=a.txt"));
        assert!(!is_attachment("inline"));
    }

    #[test]
    fn decodes_extended_utf8_name() {
        let name = resolve_filename(
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf",
            None,
        );
        assert_eq!(name, "résumé.pdf");
    }

    #[test]
    fn extended_name_wins_over_plain() {
        let name = resolve_filename(
            "attachment; filename=\"fallback.pdf\"; filename*=utf-8''report%202024.pdf",
            None,
        );
        assert_eq!(name, "report 2024.pdf");
    }

    #[test]
    fn quoted_name_has_plus_replaced() {
        assert_eq!(
            resolve_filename("attachment; filename=\"a b+c.txt\"", None),
            "a b c.txt"
        );
    }

    #[test]
    fn path_components_are_stripped() {
        assert_eq!(
            resolve_filename("attachment; filename=../../etc/passwd", None),
            "passwd"
        );
        assert_eq!(
            resolve_filename("attachment; filename=\"..\\\\windows\\\\win.ini\"", None),
            "win.ini"
        );
        assert_eq!(resolve_filename("attachment; filename=..", None), "");
    }

    #[test]
    fn explicit_name_takes_priority() {
        assert_eq!(
            resolve_filename("attachment; filename=server.csv", Some("users.csv")),
            "users.csv"
        );
        assert_eq!(
            resolve_filename("attachment; filename=server.csv", Some("  ")),
            "server.csv"
        );
    }

    #[test]
    fn missing_name_is_empty() {
        assert_eq!(resolve_filename("attachment", None), "");
    }
}

//! Field splitting for backend output lines.
//!
//! Backends escape spaces inside instance names and TXT strings, either as
//! the DNS decimal escape `\032` or as a backslash-space. Splitting on
//! whitespace first would tear those values apart, so every line goes
//! through the same four steps:
//!
//! 1. each space escape is replaced by [`PLACEHOLDER`]
//! 2. the line is split on whitespace
//! 3. fields that are shown to the user are passed to [`decode_display`],
//!    which turns the placeholder back into a space and decodes the
//!    remaining DNS escapes
//! 4. fields used as keys (instance names, hostnames) stay as they are

/// Stands in for an escaped space between steps 1 and 3. Taken from the
/// Unicode private use area so it cannot be confused with backend text.
pub const PLACEHOLDER: char = '\u{E000}';

/// Escape sequences that encode a literal space.
pub const SPACE_ESCAPES: &[&str] = &[r"\032", r"\ "];

/// Split a raw backend line into fields.
///
/// Returns `None` if the line already contains [`PLACEHOLDER`]; decoding
/// such a line would turn backend data into spaces.
pub fn tokenize(line: &str) -> Option<Vec<String>> {
    if line.contains(PLACEHOLDER) {
        tracing::warn!("Dropping line containing the escape placeholder: {:?}", line);
        return None;
    }

    let protected = protect_spaces(line);
    Some(protected.split_whitespace().map(str::to_string).collect())
}

/// Replace space escapes with [`PLACEHOLDER`], scanning escapes left to
/// right so that `\\032` stays an escaped backslash followed by `032`.
fn protect_spaces(line: &str) -> String {
    let mut protected = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(idx) = rest.find('\\') {
        protected.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(escape) = SPACE_ESCAPES.iter().find(|e| tail.starts_with(**e)) {
            protected.push(PLACEHOLDER);
            rest = &tail[escape.len()..];
        } else {
            // Any other escape is copied as a pair for decode_display
            let pair: usize = tail.chars().take(2).map(char::len_utf8).sum();
            protected.push_str(&tail[..pair]);
            rest = &tail[pair..];
        }
    }

    protected.push_str(rest);
    protected
}

/// Decode a field for display: placeholders and DNS escapes (`\DDD`
/// decimal bytes, `\X` literal characters) become plain text.
pub fn decode_display(field: &str) -> String {
    let mut bytes = Vec::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        match c {
            PLACEHOLDER => bytes.push(b' '),
            '\\' => {
                let digits: String = chars.clone().take(3).collect();
                if digits.len() == 3 && digits.chars().all(|d| d.is_ascii_digit()) {
                    if let Ok(byte) = digits.parse::<u8>() {
                        bytes.push(byte);
                        chars.nth(2);
                        continue;
                    }
                }
                match chars.next() {
                    Some(next) => push_char(&mut bytes, next),
                    None => bytes.push(b'\\'),
                }
            }
            other => push_char(&mut bytes, other),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Split the tail of a TXT line into its quoted strings.
///
/// The fields are rejoined first so that unescaped spaces inside quotes
/// survive. Each string is unquoted and decoded; empty strings are dropped.
pub fn split_quoted(fields: &[String]) -> Vec<String> {
    let joined = fields.join(" ");
    joined
        .split("\" \"")
        .map(|token| decode_display(token.trim_matches('"')))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Escape spaces so an already DNS-escaped value survives [`tokenize`]
/// as a single field.
pub fn escape_spaces(value: &str) -> String {
    value.replace(' ', r"\032")
}

/// Escape raw text so that [`tokenize`] followed by [`decode_display`]
/// gives it back unchanged, including inside a quoted TXT string.
pub fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str(r"\092"),
            ' ' => escaped.push_str(r"\032"),
            '"' => escaped.push_str(r"\034"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_spaces_stay_in_one_field() {
        let fields = tokenize(r"My\032Web\ Server._http._tcp.local. SRV 0 0 80 host.local.").unwrap();
        assert_eq!(fields.len(), 6);
        assert_eq!(decode_display(&fields[0]), "My Web Server._http._tcp.local.");
    }

    #[test]
    fn test_escape_decodes_like_plain_text() {
        let escaped = tokenize(r"Living\032Room").unwrap();
        let plain = "Living Room";
        assert_eq!(decode_display(&escaped[0]), plain);
        assert_eq!(decode_display(plain), plain);
    }

    #[test]
    fn test_other_dns_escapes() {
        assert_eq!(decode_display(r"v1\.2"), "v1.2");
        assert_eq!(decode_display(r"back\\slash"), r"back\slash");
        assert_eq!(decode_display(r"caf\195\169"), "café");
        assert_eq!(decode_display("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_escaped_backslash_is_not_a_space_escape() {
        let fields = tokenize(r"Share\\032X._http._tcp. SRV 0 0 80 h.local.").unwrap();
        assert_eq!(fields.len(), 6);
        assert!(!fields[0].contains(PLACEHOLDER));
        assert_eq!(decode_display(&fields[0]), r"Share\032X._http._tcp.");

        // Escaped backslash followed by a real space still splits
        let fields = tokenize(r"dir\\ next").unwrap();
        assert_eq!(fields, vec![r"dir\\", "next"]);

        // An escape right after an escaped backslash is still recognised
        let fields = tokenize(r"a\\\032b").unwrap();
        assert_eq!(decode_display(&fields[0]), r"a\ b");
    }

    #[test]
    fn test_placeholder_collision_is_rejected() {
        let line = format!("evil{}name SRV 0 0 80 host.local.", PLACEHOLDER);
        assert!(tokenize(&line).is_none());
    }

    #[test]
    fn test_split_quoted() {
        let fields = tokenize(r#""path=/" "" "note=two words" "a\032b""#).unwrap();
        assert_eq!(
            split_quoted(&fields),
            vec!["path=/", "note=two words", "a b"],
        );
    }

    #[test]
    fn test_escape_spaces_round_trip() {
        let fields = tokenize(&escape_spaces("Kitchen Display")).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(decode_display(&fields[0]), "Kitchen Display");
    }

    #[test]
    fn test_escape_field_survives_quoting() {
        let raw = r#"say "hi" \o/"#;
        let line = format!("\"{}\" \"second\"", escape_field(raw));
        let fields = tokenize(&line).unwrap();
        assert_eq!(split_quoted(&fields), vec![raw, "second"]);
    }
}

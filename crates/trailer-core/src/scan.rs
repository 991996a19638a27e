//! Locating JSON objects embedded in HTML/JS text.

/// Return the JSON object that starts at the first `{` at or after `from`,
/// ending at its balanced closing brace.
///
/// Braces inside string literals (and escaped quotes inside those strings)
/// are ignored, so a payload containing `"};</script>"` in a value is not cut
/// short. Returns `None` when there is no `{` or the object never closes.
pub fn balanced_object(text: &str, from: usize) -> Option<&str> {
    let start = from + text.get(from..)?.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // All delimiters are ASCII, so byte-wise scanning never splits a UTF-8
    // sequence at a position that is later used for slicing.
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Iterate over objects assigned to `marker`, e.g. `marker = {...}` or
/// `"marker": {...}`.
///
/// Only quotes, `=`, `:`, `]` and whitespace may sit between an occurrence
/// of the marker and its opening brace. Occurrences followed by anything else
/// (`= null;`, `) {` in a condition) are skipped.
pub fn objects_after_marker<'a>(text: &'a str, marker: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.match_indices(marker).filter_map(move |(idx, _)| {
        let after = idx + marker.len();
        let rest = &text[after..];
        let brace = rest.find(|c: char| !is_assignment_glue(c))?;
        if rest[brace..].starts_with('{') {
            balanced_object(text, after + brace)
        } else {
            None
        }
    })
}

fn is_assignment_glue(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '=' | ':' | ']')
}

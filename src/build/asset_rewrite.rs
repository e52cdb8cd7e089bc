//! Rewriting literal public-asset references inside bundled JS/CSS (spec
//! §4.H steps 3-4): any quoted absolute path that names a file actually
//! present under `src/public/` gets the asset prefix spliced in.
//!
//! CSS `url(...)` references are rewritten too, with or without quotes
//! (spec §9 open questions: the source matches both forms; only the
//! unquoted form is explicitly tested, so an implementer should handle
//! both for safety).

use std::collections::BTreeSet;

/// Rewrite every quoted literal in `source` that exactly names a path in
/// `public_paths` (each entry is `/`-leading, relative to `src/public`),
/// prefixing it with `/<asset_prefix>`, plus any CSS `url(...)` reference
/// (quoted or bare) naming such a path.
pub fn rewrite_asset_references(
    source: &str,
    public_paths: &BTreeSet<String>,
    asset_prefix: &str,
) -> String {
    if public_paths.is_empty() {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' {
            if let Some(end) = find_matching_quote(source, i + 1, quote) {
                let literal = &source[i + 1..end];
                if public_paths.contains(literal) {
                    out.push(quote as char);
                    out.push('/');
                    out.push_str(asset_prefix);
                    out.push_str(literal);
                    out.push(quote as char);
                    i = end + 1;
                    continue;
                }
            }
        }
        if source[i..].starts_with("url(") {
            if let Some((literal_start, literal_end, close)) = bare_url_literal(source, i + 4) {
                let literal = &source[literal_start..literal_end];
                if public_paths.contains(literal) {
                    out.push_str("url(");
                    out.push('/');
                    out.push_str(asset_prefix);
                    out.push_str(literal);
                    out.push(')');
                    i = close + 1;
                    continue;
                }
            }
        }
        out.push(source[i..].chars().next().unwrap());
        i += source[i..].chars().next().unwrap().len_utf8();
    }
    out
}

/// Find an unquoted `url(<path>)` literal starting right after `url(`.
/// Returns `(literal_start, literal_end, index_of_closing_paren)`, or
/// `None` if the content is quoted (handled by the main quote scan) or
/// doesn't close on the same line.
fn bare_url_literal(source: &str, from: usize) -> Option<(usize, usize, usize)> {
    let bytes = source.as_bytes();
    if from >= bytes.len() || bytes[from] == b'"' || bytes[from] == b'\'' {
        return None;
    }
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b')' => return Some((from, i, i)),
            b'\n' => return None,
            _ => i += 1,
        }
    }
    None
}

fn find_matching_quote(source: &str, from: usize, quote: u8) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            return Some(i);
        }
        if bytes[i] == b'\n' {
            return None;
        }
        i += 1;
    }
    None
}

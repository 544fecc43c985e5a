//! Parameter introspection for declared handler signatures.
//!
//! Handlers are registered with a signature string such as
//! `"({ __longToken, schoolId, page = 1 })"`. The ordered names extracted here
//! are the only signal deciding which middlewares attach to a handler.

/// Prefix marking a parameter as a request for a middleware's output
pub const SPECIAL_PREFIX: &str = "__";

pub fn is_special(name: &str) -> bool {
    name.starts_with(SPECIAL_PREFIX)
}

/// Extract formal parameter names in declaration order.
///
/// Accepts `(a, b = 1)`, a single destructured parameter `({ a, b })` or
/// `{ a, b }`, and a bare `a, b` list. Defaults are stripped, `key: alias`
/// yields `key` and rest elements are skipped. Anything that does not parse
/// yields an empty list.
pub fn param_names(signature: &str) -> Vec<String> {
    parse_signature(signature).unwrap_or_default()
}

/// Declared names carrying the special prefix, order preserved
pub fn special_params(params: &[String]) -> Vec<String> {
    params.iter().filter(|p| is_special(p)).cloned().collect()
}

fn parse_signature(signature: &str) -> Option<Vec<String>> {
    let trimmed = signature.trim();

    let list = if trimmed.starts_with('(') {
        let close = matching_close(trimmed, 0)?;
        // Anything after the parameter list (a body, an arrow) is ignored
        &trimmed[1..close]
    } else {
        trimmed
    };

    let list = list.trim();
    if list.is_empty() {
        return Some(Vec::new());
    }

    if list.starts_with('{') {
        let close = matching_close(list, 0)?;
        let rest = list[close + 1..].trim();
        // `{ a, b } = {}` is still a single destructured parameter
        if !rest.is_empty() && !rest.starts_with('=') {
            return None;
        }
        return parse_list(&list[1..close], true);
    }

    parse_list(list, false)
}

fn parse_list(list: &str, destructured: bool) -> Option<Vec<String>> {
    let mut names = Vec::new();

    for piece in split_top_level(list, ',')? {
        let piece = piece.trim();
        if piece.is_empty() {
            // trailing comma
            continue;
        }
        if piece.starts_with("...") {
            continue;
        }

        let head = strip_default(piece);
        let name = if destructured {
            // `key: alias` keeps the property name
            head.split(':').next().unwrap_or("").trim()
        } else {
            head.trim()
        };

        if !is_identifier(name) {
            return None;
        }
        names.push(name.to_string());
    }

    Some(names)
}

fn strip_default(piece: &str) -> &str {
    match piece.find('=') {
        Some(idx) => &piece[..idx],
        None => piece,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Index of the bracket closing the one opened at `open`
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside any brackets or quotes
fn split_top_level(text: &str, sep: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.checked_sub(1)?,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

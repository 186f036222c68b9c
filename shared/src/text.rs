/// Placeholder shown when a report carries neither a name nor any text.
pub const NO_TEXT: &str = "No Text";

/// Description used when a report has no HTML body.
pub const EMPTY_DESCRIPTION_HTML: &str = "<p class=\"report-text\">No text available.</p>";

pub const DEFAULT_ICON: &str = "megaphone.png";

const NAME_LIMIT: usize = 80;
const LABEL_LIMIT: usize = 40;

/// Replace every HTML tag with a space, collapse whitespace runs and trim.
pub fn strip_tags(html: &str) -> String {
    let mut spaced = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        // A `<` with no later `>` is plain text.
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        spaced.push_str(&rest[..open]);
        spaced.push(' ');
        rest = &rest[open + close + 1..];
    }
    spaced.push_str(rest);
    collapse_whitespace(&spaced)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `s` to `limit` characters, appending `...` when anything was removed.
pub fn truncate_with_ellipsis(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}

/// Display name used by the builder.
///
/// An explicit name that already ends in an ellipsis was truncated upstream,
/// so the full plain text is preferred over it.
pub fn long_name(name: &str, plain_text: &str) -> String {
    let name = name.trim();
    let text = plain_text.trim();
    let looks_truncated = name.ends_with("...") || name.ends_with('…');
    let base = if name.is_empty() || looks_truncated { text } else { name };
    if base.is_empty() {
        return NO_TEXT.to_string();
    }
    truncate_with_ellipsis(base, NAME_LIMIT)
}

/// Short marker label.
pub fn label_text(text: &str, fallback_name: &str) -> String {
    let base = [text, fallback_name]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(NO_TEXT)
        .trim();
    truncate_with_ellipsis(base, LABEL_LIMIT)
}

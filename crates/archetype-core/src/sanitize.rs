use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\r\n\t ]+").unwrap())
}

/// Clean a single-line text value before it is stored.
///
/// Strips markup, folds line breaks and tabs into single spaces, collapses
/// runs of whitespace and trims both ends.
pub fn text_field(input: &str) -> String {
    let stripped = tag_re().replace_all(input, "");
    let collapsed = whitespace_re().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Escape a value for use in HTML text or a double-quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(text_field("  <b>Jane</b>\n\tDoe  "), "Jane Doe");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(text_field("a@b.com"), "a@b.com");
    }

    #[test]
    fn escapes_attribute_breakers() {
        assert_eq!(
            escape_html(r#""><script>"#),
            "&quot;&gt;&lt;script&gt;"
        );
    }
}

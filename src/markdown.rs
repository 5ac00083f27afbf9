//! Scanners for the bits of markdown a document context cares about:
//! the YAML front-matter block, inline `#tags` and `[[wikilinks]]`.

/// Split a leading `---` fenced block from the rest of the text.
///
/// Returns `(front_matter, body)`. The block must open on the first line and
/// close with a `---` or `...` line; otherwise the whole text is body.
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let body = &rest[offset + line.len()..];
            return (Some(&rest[..offset]), body);
        }
        offset += line.len();
    }

    (None, text)
}

/// Inline hashtags, without the leading `#`, in order of appearance.
///
/// A tag is `#` followed by word characters, `-` or `/`, and must not be
/// glued to a preceding word character, `#` or `&`.
pub fn hashtags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let glued =
            prev.is_some_and(|p| is_word_char(p) || p == '#' || p == '&');
        prev = Some(ch);
        if ch != '#' || glued {
            continue;
        }

        let start = idx + ch.len_utf8();
        let mut end = start;
        while let Some(&(next_idx, next)) = chars.peek() {
            if is_word_char(next) || next == '-' || next == '/' {
                end = next_idx + next.len_utf8();
                prev = Some(next);
                chars.next();
            } else {
                break;
            }
        }
        if end > start {
            tags.push(text[start..end].to_string());
        }
    }

    tags
}

/// Targets of `[[target]]` and `[[target|alias]]` links.
pub fn wikilinks(text: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("[[") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("]]") else {
            break;
        };
        let inner = &after[..close];
        let target = inner.split('|').next().unwrap_or_default();
        if !target.is_empty() && !target.contains('[') {
            links.push(target.to_string());
        }
        rest = &after[close + 2..];
    }

    links
}

/// Escape text for an HTML text node or attribute value.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_matter_is_split() {
        let text = "---\ntitle: Hi\ntags: [a]\n---\n# Body\n";
        let (fm, body) = split_front_matter(text);
        assert_eq!(fm, Some("title: Hi\ntags: [a]\n"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn front_matter_accepts_dots_terminator() {
        let (fm, body) = split_front_matter("---\na: 1\n...\nrest");
        assert_eq!(fm, Some("a: 1\n"));
        assert_eq!(body, "rest");
    }

    #[test]
    fn unterminated_front_matter_is_body() {
        let text = "---\na: 1\nno end";
        assert_eq!(split_front_matter(text), (None, text));
    }

    #[test]
    fn no_front_matter() {
        let text = "# Title\n---\n";
        assert_eq!(split_front_matter(text), (None, text));
    }

    #[test]
    fn empty_front_matter() {
        let (fm, body) = split_front_matter("---\n---\nbody");
        assert_eq!(fm, Some(""));
        assert_eq!(body, "body");
    }

    #[test]
    fn hashtags_found() {
        let tags = hashtags("text #one and #two-parts, #nested/tag.");
        assert_eq!(tags, vec!["one", "two-parts", "nested/tag"]);
    }

    #[test]
    fn headings_are_not_tags() {
        assert!(hashtags("# Heading\n## Sub").is_empty());
    }

    #[test]
    fn glued_hashes_are_not_tags() {
        assert!(hashtags("page#anchor &#39; ##x").is_empty());
    }

    #[test]
    fn hashtag_at_start_of_line() {
        assert_eq!(hashtags("#x"), vec!["x"]);
        assert_eq!(hashtags("(#y)"), vec!["y"]);
    }

    #[test]
    fn wikilinks_found() {
        let links = wikilinks("see [[Note]] and [[dir/Other|alias]] [[]]");
        assert_eq!(links, vec!["Note", "dir/Other"]);
    }

    #[test]
    fn unclosed_wikilink_ignored() {
        assert!(wikilinks("[[broken").is_empty());
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}

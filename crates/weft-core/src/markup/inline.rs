//! Inline transforms: emphasis, strikethrough, code spans, checkboxes,
//! links and images with a scheme allowlist.
//!
//! An explicit scanner rather than regex. Unclosed delimiters fall back
//! to literal text; a disallowed URL scheme renders the raw markup as
//! plain text instead of a link.

use url::Url;
use weft_types::document::Inline;

const LINK_SCHEMES: &[&str] = &["http", "https", "mailto"];
const IMAGE_SCHEMES: &[&str] = &["http", "https"];

/// Parses one line (or joined paragraph) of inline text into spans.
pub(super) fn parse_inline(input: &str) -> Vec<Inline> {
    let mut nodes = Vec::new();
    let mut buf = String::new();
    let mut s = input;

    if let Some((checked, rest)) = strip_checkbox(s) {
        nodes.push(Inline::Checkbox { checked });
        s = rest;
    }

    while let Some(ch) = s.chars().next() {
        match ch {
            '`' => {
                if let Some(end) = s[1..].find('`') {
                    flush(&mut buf, &mut nodes);
                    nodes.push(Inline::Code(s[1..1 + end].to_string()));
                    s = &s[1 + end + 1..];
                } else {
                    buf.push('`');
                    s = &s[1..];
                }
            }
            '*' => {
                let stars = s.chars().take_while(|c| *c == '*').count().min(3);
                let delim = &s[..stars];
                match s[stars..].find(delim) {
                    Some(end) if end > 0 => {
                        let inner = s[stars..stars + end].to_string();
                        flush(&mut buf, &mut nodes);
                        nodes.push(match stars {
                            3 => Inline::StrongEmphasis(inner),
                            2 => Inline::Strong(inner),
                            _ => Inline::Emphasis(inner),
                        });
                        s = &s[stars + end + stars..];
                    }
                    _ => {
                        buf.push_str(delim);
                        s = &s[stars..];
                    }
                }
            }
            '~' if s.starts_with("~~") => match s[2..].find("~~") {
                Some(end) if end > 0 => {
                    flush(&mut buf, &mut nodes);
                    nodes.push(Inline::Strikethrough(s[2..2 + end].to_string()));
                    s = &s[2 + end + 2..];
                }
                _ => {
                    buf.push_str("~~");
                    s = &s[2..];
                }
            },
            '!' if s[1..].starts_with('[') => {
                if let Some((alt, target, consumed)) = parse_bracket(&s[1..])
                    && allowed_scheme(&target, IMAGE_SCHEMES)
                {
                    flush(&mut buf, &mut nodes);
                    nodes.push(Inline::Image { alt, src: target });
                    s = &s[1 + consumed..];
                } else {
                    buf.push('!');
                    s = &s[1..];
                }
            }
            '[' => {
                if let Some((text, target, consumed)) = parse_bracket(s)
                    && allowed_scheme(&target, LINK_SCHEMES)
                {
                    flush(&mut buf, &mut nodes);
                    nodes.push(Inline::Link { text, href: target });
                    s = &s[consumed..];
                } else {
                    buf.push('[');
                    s = &s[1..];
                }
            }
            _ => {
                buf.push(ch);
                s = &s[ch.len_utf8()..];
            }
        }
    }

    flush(&mut buf, &mut nodes);
    nodes
}

fn flush(buf: &mut String, nodes: &mut Vec<Inline>) {
    if !buf.is_empty() {
        nodes.push(Inline::Text(std::mem::take(buf)));
    }
}

fn strip_checkbox(s: &str) -> Option<(bool, &str)> {
    for (marker, checked) in [("[ ] ", false), ("[x] ", true), ("[X] ", true)] {
        if let Some(rest) = s.strip_prefix(marker) {
            return Some((checked, rest));
        }
    }
    None
}

/// Parses `[text](target)` at the start of `s`, returning text, target
/// and the number of bytes consumed.
fn parse_bracket(s: &str) -> Option<(String, String, usize)> {
    let close = s.find("](")?;
    let text = &s[1..close];
    if text.contains('[') || text.contains('\n') {
        return None;
    }
    let after = &s[close + 2..];
    let end = after.find(')')?;
    let target = &after[..end];
    Some((text.to_string(), target.to_string(), close + 2 + end + 1))
}

fn allowed_scheme(target: &str, schemes: &[&str]) -> bool {
    Url::parse(target).is_ok_and(|url| schemes.contains(&url.scheme()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emphasis_variants() {
        assert_eq!(
            parse_inline("a **b** *c* ***d***"),
            vec![
                Inline::Text("a ".to_string()),
                Inline::Strong("b".to_string()),
                Inline::Text(" ".to_string()),
                Inline::Emphasis("c".to_string()),
                Inline::Text(" ".to_string()),
                Inline::StrongEmphasis("d".to_string()),
            ]
        );
    }

    #[test]
    fn test_strikethrough_and_code() {
        assert_eq!(
            parse_inline("~~gone~~ `let x = *1*;`"),
            vec![
                Inline::Strikethrough("gone".to_string()),
                Inline::Text(" ".to_string()),
                Inline::Code("let x = *1*;".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_delimiters_stay_literal() {
        assert_eq!(
            parse_inline("**open and `half"),
            vec![Inline::Text("**open and `half".to_string())]
        );
    }

    #[test]
    fn test_link_scheme_allowlist() {
        assert_eq!(
            parse_inline("[ok](https://example.com)"),
            vec![Inline::Link {
                text: "ok".to_string(),
                href: "https://example.com".to_string()
            }]
        );
        assert_eq!(
            parse_inline("[mail](mailto:a@b.c)"),
            vec![Inline::Link {
                text: "mail".to_string(),
                href: "mailto:a@b.c".to_string()
            }]
        );
        // javascript: is not on the allowlist; renders as plain text.
        assert_eq!(
            parse_inline("[bad](javascript:alert(1))"),
            vec![Inline::Text("[bad](javascript:alert(1))".to_string())]
        );
    }

    #[test]
    fn test_image_scheme_allowlist_excludes_mailto() {
        assert_eq!(
            parse_inline("![alt](https://example.com/a.png)"),
            vec![Inline::Image {
                alt: "alt".to_string(),
                src: "https://example.com/a.png".to_string()
            }]
        );
        assert_eq!(
            parse_inline("![alt](mailto:a@b.c)"),
            vec![Inline::Text("![alt](mailto:a@b.c)".to_string())]
        );
    }

    #[test]
    fn test_leading_checkbox() {
        assert_eq!(
            parse_inline("[x] ship it"),
            vec![
                Inline::Checkbox { checked: true },
                Inline::Text("ship it".to_string()),
            ]
        );
        assert_eq!(
            parse_inline("[ ] later"),
            vec![
                Inline::Checkbox { checked: false },
                Inline::Text("later".to_string()),
            ]
        );
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(
            parse_inline("nothing fancy here"),
            vec![Inline::Text("nothing fancy here".to_string())]
        );
    }
}

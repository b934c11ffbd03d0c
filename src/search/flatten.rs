//! Markdown flattener / Markdown 拍平
//!
//! Turns a Markdown document into the plain text the tokenizer sees: no
//! markup, no HTML, formula bodies preserved verbatim (their symbols are
//! useful search terms). Implemented as a small descent over block and
//! inline grammar; only flattened text is needed, never rendering.
//! / 只产出纯文本，不做渲染。
//!
//! Block formulas `$$…$$` open at a block start or right after a blank
//! line; `\$` is allowed inside, an unescaped `$` terminates the body.
//! Inline formulas `$…$` stay on one line. List markers are recognized
//! after any single line terminator, not only at a block start.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use thiserror::Error;

/// Documents above this size are refused (the indexer then writes the row
/// with the tiers that succeeded) / 超限文档拒绝拍平
pub const MAX_DOCUMENT_BYTES: usize = 1 << 20;

/// Bracket nesting beyond this is emitted raw / 括号嵌套上限
const MAX_INLINE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("document exceeds {MAX_DOCUMENT_BYTES} bytes")]
    DocumentTooLarge,
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}(?:\s+|$)").unwrap());
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[-*+]|\d{1,9}[.)])\s+").unwrap());
static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>").unwrap());
static HTML_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^<!--.*?-->").unwrap());
static HTML_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^&#?[A-Za-z0-9]{1,32};").unwrap());

/// Flatten a Markdown document to plain text / 拍平 Markdown 文档
///
/// Referentially transparent: the output depends only on the input text.
pub fn flatten(markdown: &str) -> Result<String, FlattenError> {
    if markdown.len() > MAX_DOCUMENT_BYTES {
        return Err(FlattenError::DocumentTooLarge);
    }

    let text = markdown.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<String> = Vec::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(text);

    while let Some(chunk) = queue.pop_front() {
        match split_block_formula(&chunk) {
            Some((before, body, after)) => {
                // Text before the formula is ordinary blocks; the body is
                // an atomic paragraph; the remainder re-enters the queue
                // at the head / 公式体原样保留，剩余文本回到队首
                flatten_plain(before, &mut out);
                let body = body.trim();
                if !body.is_empty() {
                    out.push(collapse_whitespace(body));
                }
                if !after.is_empty() {
                    queue.push_front(after.to_string());
                }
            }
            None => flatten_plain(&chunk, &mut out),
        }
    }

    Ok(out.join("\n"))
}

/// Find the first block formula: `$$` at chunk start or right after a
/// blank line, closed by an unescaped `$$` / 查找首个块级公式
fn split_block_formula(chunk: &str) -> Option<(&str, &str, &str)> {
    let bytes = chunk.as_bytes();
    let mut search_from = 0;

    while let Some(found) = chunk[search_from..].find("$$") {
        let open = search_from + found;
        let at_block_start = open == 0 || chunk[..open].ends_with("\n\n");

        if at_block_start {
            let body_start = open + 2;
            let mut i = body_start;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 2,
                    b'$' => {
                        if i > body_start && i + 1 < bytes.len() && bytes[i + 1] == b'$' {
                            return Some((&chunk[..open], &chunk[body_start..i], &chunk[i + 2..]));
                        }
                        // Unescaped single dollar terminates the candidate
                        break;
                    }
                    _ => i += 1,
                }
            }
        }

        search_from = open + 2;
    }

    None
}

/// Process text with no block formulas in it / 处理不含块级公式的文本
fn flatten_plain(text: &str, out: &mut Vec<String>) {
    let mut fence: Option<char> = None;

    for line in text.lines() {
        if let Some(fence_char) = fence {
            let trimmed = line.trim();
            let run = trimmed.chars().take_while(|&c| c == fence_char).count();
            if run >= 3 && trimmed.chars().all(|c| c == fence_char) {
                fence = None;
            } else if !trimmed.is_empty() {
                // Code content is atomic: kept verbatim, fences dropped
                // / 代码内容原样保留
                out.push(collapse_whitespace(trimmed));
            }
            continue;
        }

        let mut rest = line.trim_start();

        if let Some(fence_char) = fence_open(rest) {
            fence = Some(fence_char);
            continue;
        }

        // Blockquote markers / 引用标记
        while let Some(stripped) = rest.strip_prefix('>') {
            rest = stripped.trim_start();
        }

        if let Some(m) = HEADING.find(rest) {
            rest = &rest[m.end()..];
        }

        // List markers are recognized per line, so a list starting
        // mid-block still sheds its markers / 列表标记逐行识别
        if let Some(m) = LIST_MARKER.find(rest) {
            rest = &rest[m.end()..];
        }

        let inline = flatten_inline(rest, 0);
        let inline = inline.trim();
        if !inline.is_empty() {
            out.push(collapse_whitespace(inline));
        }
    }
}

fn fence_open(line: &str) -> Option<char> {
    for fence_char in ['`', '~'] {
        if line.chars().take_while(|&c| c == fence_char).count() >= 3 {
            return Some(fence_char);
        }
    }
    None
}

/// Inline pass: formulas atomic, HTML removed, markup stripped, links and
/// images reduced to their visible text / 行内处理
fn flatten_inline(s: &str, depth: usize) -> String {
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];
        let c = rest.chars().next().expect("offset is on a char boundary");

        match c {
            '\\' => {
                let mut it = rest.chars();
                it.next();
                match it.next() {
                    Some(next) if next.is_ascii_punctuation() => {
                        out.push(next);
                        i += 1 + next.len_utf8();
                    }
                    _ => {
                        out.push('\\');
                        i += 1;
                    }
                }
            }
            '`' => {
                let run = rest.chars().take_while(|&x| x == '`').count();
                let closer = "`".repeat(run);
                match s[i + run..].find(&closer) {
                    Some(pos) => {
                        // Code span content is atomic / 行内代码原样保留
                        out.push_str(&s[i + run..i + run + pos]);
                        i += run + pos + run;
                    }
                    None => {
                        out.push('`');
                        i += 1;
                    }
                }
            }
            '$' => match scan_inline_formula(rest) {
                Some((body, consumed)) => {
                    out.push_str(body);
                    i += consumed;
                }
                None => {
                    out.push('$');
                    i += 1;
                }
            },
            '<' => {
                if let Some(m) = HTML_COMMENT.find(rest) {
                    i += m.end();
                } else if let Some(m) = HTML_TAG.find(rest) {
                    i += m.end();
                } else {
                    out.push('<');
                    i += 1;
                }
            }
            '&' => match HTML_ENTITY.find(rest) {
                Some(m) => i += m.end(),
                None => {
                    out.push('&');
                    i += 1;
                }
            },
            '!' if rest.len() > 1 && rest.as_bytes()[1] == b'[' => {
                match parse_bracket(&s[i + 2..]) {
                    Some((inner, consumed)) => {
                        out.push_str(&descend(inner, depth));
                        i += 2 + consumed;
                    }
                    None => {
                        out.push('!');
                        i += 1;
                    }
                }
            }
            '[' => match parse_bracket(&s[i + 1..]) {
                Some((inner, consumed)) => {
                    out.push_str(&descend(inner, depth));
                    i += 1 + consumed;
                }
                None => {
                    i += 1;
                }
            },
            '*' | '_' | '~' => i += 1,
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    out
}

fn descend(inner: &str, depth: usize) -> String {
    if depth >= MAX_INLINE_DEPTH {
        inner.to_string()
    } else {
        flatten_inline(inner, depth + 1)
    }
}

/// Scan `$…$` starting at a dollar sign; `\$` allowed inside, newlines are
/// not / 扫描行内公式
fn scan_inline_formula(rest: &str) -> Option<(&str, usize)> {
    let bytes = rest.as_bytes();
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'$' => {
                if i == 1 {
                    return None;
                }
                return Some((&rest[1..i], i + 1));
            }
            _ => i += 1,
        }
    }

    None
}

/// Bracketed run starting right after `[`; returns the inner text and the
/// bytes consumed including the closing bracket and a `(…)` or `[…]`
/// destination / 解析括号段
fn parse_bracket(after_open: &str) -> Option<(&str, usize)> {
    let bytes = after_open.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'[' => {
                depth += 1;
                i += 1;
            }
            b']' => {
                depth -= 1;
                if depth == 0 {
                    let inner = &after_open[..i];
                    let consumed = i + 1 + skip_destination(&after_open[i + 1..]);
                    return Some((inner, consumed));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    None
}

/// Length of a `(…)` or `[label]` destination suffix, zero if absent
/// / 目标后缀长度
fn skip_destination(tail: &str) -> usize {
    let bytes = tail.as_bytes();
    let (open, close) = match bytes.first() {
        Some(b'(') => (b'(', b')'),
        Some(b'[') => (b'[', b']'),
        _ => return 0,
    };

    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == open => {
                depth += 1;
                i += 1;
            }
            b if b == close => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }

    0
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_is_stripped() {
        let text = "# Title\n\nSome **bold** and _italic_ text.\n\n> a quote line";
        let flat = flatten(text).unwrap();
        assert_eq!(flat, "Title\nSome bold and italic text.\na quote line");
    }

    #[test]
    fn test_lists_recognized_after_single_newline() {
        let text = "Shopping:\n- bread\n- milk\n1. first\n2) second";
        let flat = flatten(text).unwrap();
        assert_eq!(flat, "Shopping:\nbread\nmilk\nfirst\nsecond");
    }

    #[test]
    fn test_block_formula_at_document_start() {
        let flat = flatten("$$a+b=c$$\ntrailing").unwrap();
        assert_eq!(flat, "a+b=c\ntrailing");
    }

    #[test]
    fn test_block_formula_after_blank_line() {
        let text = "Euler's identity:\n\n$$e^{i\\pi}+1=0$$\n\nEnd.";
        let flat = flatten(text).unwrap();
        assert_eq!(flat, "Euler's identity:\ne^{i\\pi}+1=0\nEnd.");
    }

    #[test]
    fn test_dollars_after_single_newline_are_not_a_block_formula() {
        // Needs a blank line before the opener / 开启符前需要空行
        let text = "text\n$$x=1$$";
        let flat = flatten(text).unwrap();
        assert!(!flat.contains("$$"));
        assert!(flat.contains("x=1"));
    }

    #[test]
    fn test_block_formula_with_escaped_dollar() {
        let flat = flatten("$$price \\$5$$").unwrap();
        assert_eq!(flat, "price \\$5");
    }

    #[test]
    fn test_unterminated_block_formula_is_plain_text() {
        let flat = flatten("$$a+b\nmore text").unwrap();
        // Falls through to inline handling, nothing is lost
        assert!(flat.contains("a+b"));
        assert!(flat.contains("more text"));
    }

    #[test]
    fn test_inline_formula() {
        let flat = flatten("The value $x^2+1$ grows.").unwrap();
        assert_eq!(flat, "The value x^2+1 grows.");
    }

    #[test]
    fn test_inline_formula_with_escaped_dollar() {
        let flat = flatten("Total $a\\$b$ here").unwrap();
        assert_eq!(flat, "Total a\\$b here");
    }

    #[test]
    fn test_escaped_dollars_are_literal() {
        let flat = flatten("Price \\$5 and \\$6").unwrap();
        assert_eq!(flat, "Price $5 and $6");
    }

    #[test]
    fn test_inline_formula_cannot_span_lines() {
        let flat = flatten("a $x\ny$ b").unwrap();
        assert_eq!(flat, "a $x\ny$ b");
    }

    #[test]
    fn test_html_tags_and_entities_removed() {
        let flat = flatten("<div class=\"x\">Hello <b>world</b></div> &amp; more").unwrap();
        assert_eq!(flat, "Hello world more");
    }

    #[test]
    fn test_html_comment_removed() {
        let flat = flatten("before <!-- hidden --> after").unwrap();
        assert_eq!(flat, "before after");
    }

    #[test]
    fn test_text_between_tags_is_kept() {
        let flat = flatten("<span>музыка</span> и <em>книги</em>").unwrap();
        assert_eq!(flat, "музыка и книги");
    }

    #[test]
    fn test_links_and_images_reduce_to_text() {
        let flat = flatten("See [the site](https://example.com) and ![logo](logo.png).").unwrap();
        assert_eq!(flat, "See the site and logo.");
    }

    #[test]
    fn test_code_spans_are_atomic() {
        let flat = flatten("Run `make $TARGET` now").unwrap();
        assert_eq!(flat, "Run make $TARGET now");
    }

    #[test]
    fn test_fenced_code_keeps_content_drops_fences() {
        let text = "```rust\nlet x = 1;\n```\nafter";
        let flat = flatten(text).unwrap();
        assert_eq!(flat, "let x = 1;\nafter");
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let text = "# A\n\n$$f(x)$$\n\n- one\n- two";
        assert_eq!(flatten(text).unwrap(), flatten(text).unwrap());
    }

    #[test]
    fn test_oversized_document_is_refused() {
        let text = "a".repeat(MAX_DOCUMENT_BYTES + 1);
        assert!(matches!(
            flatten(&text),
            Err(FlattenError::DocumentTooLarge)
        ));
    }
}

//! Report layout normalisation
//!
//! Rewrites LLM output into a fixed layout:
//! - one sentence per line
//! - exactly one blank line before every header
//! - exactly one blank line on each side of a `---` rule
//! - numbered items without blank lines, except between items 1 and 2 and
//!   between items 3 and 4
//! - no other blank lines
//!
//! Fenced code blocks and tables are kept verbatim.

use regex::Regex;
use std::sync::LazyLock;

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.\s+").expect("valid regex"));

static INLINE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(\d+)\.\s+").expect("valid regex"));

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]\s+)?\d+[.)]$").expect("valid regex"));

static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3,}$").expect("valid regex"));

/// One logical line before blank-line placement
enum Line {
    Text(String),
    /// Code block or table, emitted unchanged
    Verbatim(String),
}

/// Normalises the layout of a Markdown report
pub fn normalize_layout(content: &str) -> String {
    let mut lines = Vec::new();
    for line in protect_blocks(content) {
        match line {
            Line::Verbatim(block) => lines.push(Line::Verbatim(block)),
            Line::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if is_header(trimmed) || is_rule(trimmed) {
                    lines.push(Line::Text(text.trim_end().to_string()));
                    continue;
                }
                for item in split_inline_list(&text) {
                    for sentence in split_sentences(&item) {
                        lines.push(Line::Text(sentence));
                    }
                }
            }
        }
    }

    place_blank_lines(lines).trim().to_string()
}

fn is_header(line: &str) -> bool {
    line.starts_with('#')
}

fn is_rule(line: &str) -> bool {
    RULE.is_match(line)
}

fn list_number(line: &str) -> Option<u64> {
    LIST_ITEM
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

/// Splits the input into text lines and verbatim blocks
fn protect_blocks(content: &str) -> Vec<Line> {
    let mut result = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            let mut block = vec![line];
            for next in lines.by_ref() {
                block.push(next);
                if next.trim_start().starts_with("```") {
                    break;
                }
            }
            result.push(Line::Verbatim(block.join("\n")));
        } else if trimmed.starts_with('|') {
            let mut block = vec![line];
            while let Some(next) = lines.peek() {
                if !next.trim_start().starts_with('|') {
                    break;
                }
                block.push(next);
                lines.next();
            }
            result.push(Line::Verbatim(block.join("\n")));
        } else {
            result.push(Line::Text(line.to_string()));
        }
    }

    result
}

/// Splits `1. a 2. b 3. c` into one item per line
///
/// A following number only starts a new item when it is the previous one
/// plus one, so figures like `version 12. ` are left alone.
fn split_inline_list(line: &str) -> Vec<String> {
    let Some(first) = LIST_ITEM.captures(line) else {
        return vec![line.to_string()];
    };
    let Ok(mut expected) = first[1].parse::<u64>().map(|n| n + 1) else {
        return vec![line.to_string()];
    };

    let mut parts = Vec::new();
    let mut start = 0;
    let mut search_from = first.get(0).map_or(0, |m| m.end());

    loop {
        let rest = &line[search_from..];
        let found = INLINE_ITEM
            .captures_iter(rest)
            .find(|caps| caps[1].parse::<u64>().ok() == Some(expected));
        let Some(caps) = found else {
            break;
        };
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        parts.push(line[start..search_from + whole.start()].trim_end().to_string());
        start = search_from + number.start();
        search_from += whole.end();
        expected += 1;
    }

    parts.push(line[start..].to_string());
    parts
}

/// Breaks a line after each sentence terminator
///
/// Latin terminators need following whitespace and a letter; CJK
/// terminators split directly. A leading list marker such as `1.` is not
/// treated as a sentence end.
fn split_sentences(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if matches!(c, '。' | '！' | '？') {
            if i + 1 < chars.len() && !matches!(chars[i + 1], '。' | '！' | '？') {
                sentences.push(current.trim_end().to_string());
                current.clear();
                i += 1;
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                continue;
            }
        } else if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j > i + 1
                && j < chars.len()
                && chars[j].is_alphabetic()
                && !LIST_MARKER.is_match(current.trim())
            {
                sentences.push(current.trim_end().to_string());
                current.clear();
                i = j;
                continue;
            }
        }

        i += 1;
    }

    if !current.trim().is_empty() {
        sentences.push(current.trim_end().to_string());
    }
    sentences
}

fn push_blank(out: &mut Vec<String>) {
    if out.last().is_some_and(|last| !last.is_empty()) {
        out.push(String::new());
    }
}

fn place_blank_lines(lines: Vec<Line>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut last_item: Option<u64> = None;

    for line in lines {
        let text = match line {
            Line::Verbatim(block) => {
                out.push(block);
                continue;
            }
            Line::Text(text) => text,
        };
        let trimmed = text.trim();

        if is_header(trimmed) {
            push_blank(&mut out);
            out.push(text);
            last_item = None;
        } else if is_rule(trimmed) {
            push_blank(&mut out);
            out.push(trimmed.to_string());
            out.push(String::new());
            last_item = None;
        } else if let Some(number) = list_number(trimmed) {
            if matches!((last_item, number), (Some(1), 2) | (Some(3), 4)) {
                push_blank(&mut out);
            }
            out.push(text);
            last_item = Some(number);
        } else {
            out.push(text);
        }
    }

    out.join("\n")
}

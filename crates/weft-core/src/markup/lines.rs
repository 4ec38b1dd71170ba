//! Line-oriented block grouping with bounded lookahead per construct.
//!
//! Operates on the text left after fence/marker/reasoning extraction.
//! Order of checks matters: a horizontal rule must win over a `*` list
//! bullet, and a lone pipe-bearing line must fall through to inline
//! handling rather than becoming a one-row table.

use weft_types::document::{Block, Inline, ListItem};

use super::inline::parse_inline;

pub(super) fn group_blocks(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some(block) = parse_heading(trimmed) {
            blocks.push(block);
            i += 1;
            continue;
        }

        if is_horizontal_rule(trimmed) {
            blocks.push(Block::HorizontalRule);
            i += 1;
            continue;
        }

        if table_starts_at(&lines, i) {
            let mut j = i + 1;
            while j < lines.len() && is_table_continuation(lines[j].trim()) {
                j += 1;
            }
            blocks.push(parse_table(&lines[i..j]));
            i = j;
            continue;
        }

        if trimmed.starts_with('>') {
            let mut j = i;
            while j < lines.len() && lines[j].trim().starts_with('>') {
                j += 1;
            }
            blocks.push(parse_blockquote(&lines[i..j]));
            i = j;
            continue;
        }

        if parse_list_marker(lines[i]).is_some() {
            let mut j = i;
            while j < lines.len() && parse_list_marker(lines[j]).is_some() {
                j += 1;
            }
            blocks.push(parse_list(&lines[i..j]));
            i = j;
            continue;
        }

        // Paragraph: consecutive inline lines join with forced breaks.
        let mut j = i + 1;
        while j < lines.len() && is_inline_line(&lines, j) {
            j += 1;
        }
        blocks.push(parse_paragraph(&lines[i..j]));
        i = j;
    }

    blocks
}

/// True when line `j` continues a paragraph rather than starting a block.
fn is_inline_line(lines: &[&str], j: usize) -> bool {
    let trimmed = lines[j].trim();
    !trimmed.is_empty()
        && parse_heading(trimmed).is_none()
        && !is_horizontal_rule(trimmed)
        && !trimmed.starts_with('>')
        && parse_list_marker(lines[j]).is_none()
        && !table_starts_at(lines, j)
}

fn parse_paragraph(lines: &[&str]) -> Block {
    let mut content = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            content.push(Inline::HardBreak);
        }
        content.extend(parse_inline(line.trim()));
    }
    Block::Paragraph { content }
}

fn parse_heading(trimmed: &str) -> Option<Block> {
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].strip_prefix(' ')?;
    Some(Block::Heading {
        level: hashes as u8,
        content: parse_inline(rest.trim()),
    })
}

fn is_horizontal_rule(trimmed: &str) -> bool {
    let Some(first) = trimmed.chars().next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_')
        && trimmed.len() >= 3
        && trimmed.chars().all(|c| c == first)
}

fn parse_blockquote(lines: &[&str]) -> Block {
    let mut content = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            content.push(Inline::HardBreak);
        }
        let inner = line.trim().trim_start_matches('>');
        content.extend(parse_inline(inner.strip_prefix(' ').unwrap_or(inner)));
    }
    Block::Blockquote { content }
}

// ---------------------------------------------------------------------------
// Tables

fn is_table_row(trimmed: &str) -> bool {
    trimmed.matches('|').count() >= 2
}

fn is_table_separator(trimmed: &str) -> bool {
    !trimmed.is_empty()
        && trimmed.contains('-')
        && trimmed.chars().all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

fn is_table_continuation(trimmed: &str) -> bool {
    is_table_row(trimmed) || is_table_separator(trimmed)
}

/// A table needs at least two consecutive qualifying lines; a single
/// pipe-bearing line is not a table.
fn table_starts_at(lines: &[&str], i: usize) -> bool {
    is_table_row(lines[i].trim())
        && lines
            .get(i + 1)
            .is_some_and(|next| is_table_continuation(next.trim()))
}

fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn parse_table(lines: &[&str]) -> Block {
    let headers = split_cells(lines[0]);
    let mut body = &lines[1..];
    // A separator row immediately after the headers is consumed.
    if body.first().is_some_and(|l| is_table_separator(l.trim())) {
        body = &body[1..];
    }
    let rows = body.iter().map(|l| split_cells(l)).collect();
    Block::Table { headers, rows }
}

// ---------------------------------------------------------------------------
// Lists

/// Returns `(indent, ordered, item text)` when the line is a list entry.
fn parse_list_marker(line: &str) -> Option<(usize, bool, &str)> {
    let rest = line.trim_start();
    let indent = line.len() - rest.len();

    for bullet in ["- ", "* ", "+ "] {
        if let Some(text) = rest.strip_prefix(bullet) {
            return Some((indent, false, text));
        }
    }

    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits > 0
        && let Some(text) = rest[digits..].strip_prefix(". ")
    {
        return Some((indent, true, text));
    }
    None
}

fn parse_list(lines: &[&str]) -> Block {
    let entries: Vec<(usize, bool, &str)> =
        lines.iter().filter_map(|l| parse_list_marker(l)).collect();

    let min_indent = entries.iter().map(|e| e.0).min().unwrap_or(0);
    let mut indents: Vec<usize> = entries.iter().map(|e| e.0).collect();
    indents.sort_unstable();
    indents.dedup();
    // Nesting step is the smallest positive indent delta seen in the group.
    let step = indents
        .windows(2)
        .map(|w| w[1] - w[0])
        .min()
        .unwrap_or(1)
        .max(1);

    let ordered = entries.first().is_some_and(|e| e.1);
    let items = entries
        .iter()
        .map(|(indent, _, text)| ListItem {
            depth: (indent - min_indent) / step,
            content: parse_inline(text),
        })
        .collect();

    Block::List { ordered, items }
}

//! Markup transformer: one content run's raw text → ordered blocks.
//!
//! Single pass with bounded lookahead, in a fixed order: code fences are
//! pulled out first and replaced by opaque tokens, then image markers,
//! then reasoning spans are split off, then what remains goes through
//! line-level grouping and inline transforms, and finally the tokens are
//! swapped back for real `CodeBlock`/`ImagePlaceholder` nodes. Nothing
//! downstream of fence extraction ever re-scans fenced content.

mod inline;
mod lines;
mod reasoning;

pub use reasoning::REASONING_FAMILY;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;
use weft_types::document::{Block, Inline};

use self::reasoning::Segment;
use crate::images::ImageResolver;

/// Delimiter wrapped around opaque placeholder tokens. A control
/// character cannot be produced by any inline rule, so tokens survive
/// markup transformation verbatim.
const TOKEN_MARK: char = '\u{0}';

const IMAGE_MARKER_PREFIX: &str = "[image:";

static IMAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[image:[A-Za-z0-9_-]+\]").expect("image marker pattern"));

/// Per-turn state threaded through the transformer: the reasoning step
/// counter and the image registry handle. Never module-level statics, so
/// concurrent turns stay isolated.
pub struct TransformContext<'a> {
    images: &'a ImageResolver,
    next_step: u32,
}

impl<'a> TransformContext<'a> {
    pub fn new(images: &'a ImageResolver) -> Self {
        Self {
            images,
            next_step: 1,
        }
    }

    fn next_reasoning_step(&mut self) -> u32 {
        let step = self.next_step;
        self.next_step += 1;
        step
    }

    fn register_image(&self, id: &str) {
        self.images.register(id);
    }
}

/// Transforms one content run into ordered blocks.
///
/// Block order mirrors source order; reasoning accordions are numbered
/// through `ctx` so the count is monotonic per turn, not per run.
pub fn transform(text: &str, ctx: &mut TransformContext<'_>) -> Vec<Block> {
    if text.is_empty() {
        return Vec::new();
    }

    let (text, codes) = extract_fences(text);
    let (text, images) = extract_image_markers(&text, ctx);

    let mut blocks = Vec::new();
    for segment in reasoning::split_reasoning(&text) {
        match segment {
            Segment::Reasoning(content) => blocks.push(Block::ReasoningAccordion {
                step: ctx.next_reasoning_step(),
                family: REASONING_FAMILY.to_string(),
                content,
            }),
            Segment::Ordinary(chunk) => blocks.extend(lines::group_blocks(&chunk)),
        }
    }

    substitute_placeholders(blocks, &codes, &images)
}

/// Finds the first image marker in `text`, returning its byte range and
/// resource id. Used by the tool-result summarizer to hoist images.
pub(crate) fn first_image_marker(text: &str) -> Option<(Range<usize>, String)> {
    let found = IMAGE_MARKER.find(text)?;
    let id = text[found.start() + IMAGE_MARKER_PREFIX.len()..found.end() - 1].to_string();
    Some((found.range(), id))
}

fn opaque_token(kind: &str) -> String {
    format!("{TOKEN_MARK}{kind}:{}{TOKEN_MARK}", Uuid::new_v4())
}

// ---------------------------------------------------------------------------
// Stage 1: code fences

struct PendingCode {
    token: String,
    language: Option<String>,
    code: String,
    /// Original fence text, for re-insertion into reasoning content.
    raw: String,
}

struct FenceState {
    delim: char,
    info: String,
    body: Vec<String>,
}

/// A fence line is ``` or ~~~ (three or more) with at most three leading
/// spaces; the remainder is the info string.
fn fence_line(line: &str) -> Option<(char, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let body = &line[indent..];
    for delim in ['`', '~'] {
        let count = body.chars().take_while(|c| *c == delim).count();
        if count >= 3 {
            return Some((delim, body[count..].trim()));
        }
    }
    None
}

fn extract_fences(text: &str) -> (String, Vec<PendingCode>) {
    let mut out = String::new();
    let mut codes = Vec::new();
    let mut open: Option<FenceState> = None;

    for line in text.split('\n') {
        let open_delim = open.as_ref().map(|state| state.delim);
        if let Some(delim) = open_delim {
            let closes = fence_line(line)
                .is_some_and(|(close, info)| close == delim && info.is_empty());
            if closes {
                if let Some(state) = open.take() {
                    push_code(&mut out, &mut codes, state);
                }
            } else if let Some(state) = open.as_mut() {
                state.body.push(line.to_string());
            }
        } else if let Some((delim, info)) = fence_line(line) {
            open = Some(FenceState {
                delim,
                info: info.to_string(),
                body: Vec::new(),
            });
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    // An unclosed fence consumes the remainder of the span.
    if let Some(state) = open.take() {
        push_code(&mut out, &mut codes, state);
    }

    if out.ends_with('\n') {
        out.pop();
    }
    (out, codes)
}

fn push_code(out: &mut String, codes: &mut Vec<PendingCode>, state: FenceState) {
    let token = opaque_token("code");
    let fence = state.delim.to_string().repeat(3);
    let code = state.body.join("\n");
    let raw = format!("{fence}{}\n{code}\n{fence}", state.info);
    let language = state.info.split_whitespace().next().map(str::to_string);
    codes.push(PendingCode {
        token: token.clone(),
        language,
        code,
        raw,
    });
    out.push_str(&token);
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Stage 2: image markers

struct PendingImage {
    token: String,
    resource_id: String,
    raw: String,
}

fn extract_image_markers(
    text: &str,
    ctx: &mut TransformContext<'_>,
) -> (String, Vec<PendingImage>) {
    if !text.contains(IMAGE_MARKER_PREFIX) {
        return (text.to_string(), Vec::new());
    }

    let mut images = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for found in IMAGE_MARKER.find_iter(text) {
        let id = &text[found.start() + IMAGE_MARKER_PREFIX.len()..found.end() - 1];
        let token = opaque_token("img");
        ctx.register_image(id);
        out.push_str(&text[last..found.start()]);
        out.push_str(&token);
        last = found.end();
        images.push(PendingImage {
            token,
            resource_id: id.to_string(),
            raw: found.as_str().to_string(),
        });
    }
    out.push_str(&text[last..]);
    (out, images)
}

// ---------------------------------------------------------------------------
// Stage 5: placeholder re-substitution

enum Piece {
    Inline(Inline),
    Block(Block),
}

fn substitute_placeholders(
    blocks: Vec<Block>,
    codes: &[PendingCode],
    images: &[PendingImage],
) -> Vec<Block> {
    if codes.is_empty() && images.is_empty() {
        return blocks;
    }

    let mut repl: HashMap<String, Block> = HashMap::new();
    let mut raw: HashMap<String, String> = HashMap::new();
    for code in codes {
        repl.insert(
            code.token.clone(),
            Block::CodeBlock {
                language: code.language.clone(),
                code: code.code.clone(),
            },
        );
        raw.insert(code.token.clone(), code.raw.clone());
    }
    for image in images {
        repl.insert(
            image.token.clone(),
            Block::ImagePlaceholder {
                resource_id: image.resource_id.clone(),
            },
        );
        raw.insert(image.token.clone(), image.raw.clone());
    }

    let mut out = Vec::new();
    for block in blocks {
        match block {
            Block::Paragraph { content } => out.extend(split_paragraph(content, &repl)),
            Block::Heading { level, content } => {
                let mut hoisted = Vec::new();
                let content = strip_tokens_from_inlines(content, &repl, &mut hoisted);
                out.push(Block::Heading { level, content });
                out.extend(hoisted);
            }
            Block::Blockquote { content } => {
                let mut hoisted = Vec::new();
                let content = strip_tokens_from_inlines(content, &repl, &mut hoisted);
                out.push(Block::Blockquote { content });
                out.extend(hoisted);
            }
            Block::List { ordered, items } => {
                let mut hoisted = Vec::new();
                let items = items
                    .into_iter()
                    .map(|mut item| {
                        item.content =
                            strip_tokens_from_inlines(item.content, &repl, &mut hoisted);
                        item
                    })
                    .collect();
                out.push(Block::List { ordered, items });
                out.extend(hoisted);
            }
            Block::Table { headers, rows } => {
                let mut hoisted = Vec::new();
                let headers = headers
                    .into_iter()
                    .map(|cell| strip_tokens_from_string(cell, &repl, &mut hoisted))
                    .collect();
                let rows = rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|cell| strip_tokens_from_string(cell, &repl, &mut hoisted))
                            .collect()
                    })
                    .collect();
                out.push(Block::Table { headers, rows });
                out.extend(hoisted);
            }
            Block::ReasoningAccordion {
                step,
                family,
                content,
            } => out.push(Block::ReasoningAccordion {
                step,
                family,
                content: restore_raw(content, &raw),
            }),
            other => out.push(other),
        }
    }
    out
}

/// A paragraph holding a token splits around the re-inserted block.
fn split_paragraph(content: Vec<Inline>, repl: &HashMap<String, Block>) -> Vec<Block> {
    let mut result = Vec::new();
    let mut current: Vec<Inline> = Vec::new();

    for node in content {
        if !node_has_token(&node) {
            current.push(node);
            continue;
        }
        for piece in split_node(node, repl) {
            match piece {
                Piece::Inline(inner) => current.push(inner),
                Piece::Block(block) => {
                    flush_paragraph(&mut result, &mut current);
                    result.push(block);
                }
            }
        }
    }
    flush_paragraph(&mut result, &mut current);
    result
}

fn flush_paragraph(result: &mut Vec<Block>, current: &mut Vec<Inline>) {
    trim_blank_edges(current);
    if !current.is_empty() {
        result.push(Block::Paragraph {
            content: std::mem::take(current),
        });
    }
}

fn is_blank(node: &Inline) -> bool {
    match node {
        Inline::HardBreak => true,
        Inline::Text(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn trim_blank_edges(content: &mut Vec<Inline>) {
    while content.first().is_some_and(is_blank) {
        content.remove(0);
    }
    while content.last().is_some_and(is_blank) {
        content.pop();
    }
}

fn node_has_token(node: &Inline) -> bool {
    match node {
        Inline::Text(text)
        | Inline::Strong(text)
        | Inline::Emphasis(text)
        | Inline::StrongEmphasis(text)
        | Inline::Strikethrough(text)
        | Inline::Code(text) => text.contains(TOKEN_MARK),
        Inline::Link { text, .. } => text.contains(TOKEN_MARK),
        Inline::Image { alt, .. } => alt.contains(TOKEN_MARK),
        Inline::Checkbox { .. } | Inline::HardBreak => false,
    }
}

fn split_node(node: Inline, repl: &HashMap<String, Block>) -> Vec<Piece> {
    let (text, rebuild): (String, fn(String) -> Inline) = match node {
        Inline::Text(t) => (t, Inline::Text),
        Inline::Strong(t) => (t, Inline::Strong),
        Inline::Emphasis(t) => (t, Inline::Emphasis),
        Inline::StrongEmphasis(t) => (t, Inline::StrongEmphasis),
        Inline::Strikethrough(t) => (t, Inline::Strikethrough),
        Inline::Code(t) => (t, Inline::Code),
        Inline::Link { text, href } => {
            let mut hoisted = Vec::new();
            let text = strip_tokens_from_string(text, repl, &mut hoisted);
            let mut pieces = vec![Piece::Inline(Inline::Link { text, href })];
            pieces.extend(hoisted.into_iter().map(Piece::Block));
            return pieces;
        }
        Inline::Image { alt, src } => {
            let mut hoisted = Vec::new();
            let alt = strip_tokens_from_string(alt, repl, &mut hoisted);
            let mut pieces = vec![Piece::Inline(Inline::Image { alt, src })];
            pieces.extend(hoisted.into_iter().map(Piece::Block));
            return pieces;
        }
        other => return vec![Piece::Inline(other)],
    };

    let mut pieces = Vec::new();
    let mut rest = text.as_str();
    while let Some((range, token)) = next_token(rest) {
        let Some(block) = repl.get(token) else {
            break;
        };
        if range.start > 0 {
            pieces.push(Piece::Inline(rebuild(rest[..range.start].to_string())));
        }
        pieces.push(Piece::Block(block.clone()));
        rest = &rest[range.end..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Inline(rebuild(rest.to_string())));
    }
    pieces
}

/// Locates the next delimited token in `text`.
fn next_token(text: &str) -> Option<(Range<usize>, &str)> {
    let start = text.find(TOKEN_MARK)?;
    let after = &text[start + 1..];
    let len = after.find(TOKEN_MARK)?;
    let end = start + 1 + len + 1;
    Some((start..end, &text[start..end]))
}

/// Removes tokens from a bare string, hoisting their blocks; used for
/// containers that cannot nest blocks (table cells, list items, link
/// text).
fn strip_tokens_from_string(
    text: String,
    repl: &HashMap<String, Block>,
    hoisted: &mut Vec<Block>,
) -> String {
    if !text.contains(TOKEN_MARK) {
        return text;
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some((range, token)) = next_token(rest) {
        if let Some(block) = repl.get(token) {
            out.push_str(&rest[..range.start]);
            hoisted.push(block.clone());
        } else {
            out.push_str(&rest[..range.end]);
        }
        rest = &rest[range.end..];
    }
    out.push_str(rest);
    out
}

fn strip_tokens_from_inlines(
    content: Vec<Inline>,
    repl: &HashMap<String, Block>,
    hoisted: &mut Vec<Block>,
) -> Vec<Inline> {
    content
        .into_iter()
        .map(|node| match node {
            Inline::Text(t) => Inline::Text(strip_tokens_from_string(t, repl, hoisted)),
            Inline::Strong(t) => Inline::Strong(strip_tokens_from_string(t, repl, hoisted)),
            Inline::Emphasis(t) => Inline::Emphasis(strip_tokens_from_string(t, repl, hoisted)),
            Inline::StrongEmphasis(t) => {
                Inline::StrongEmphasis(strip_tokens_from_string(t, repl, hoisted))
            }
            Inline::Strikethrough(t) => {
                Inline::Strikethrough(strip_tokens_from_string(t, repl, hoisted))
            }
            Inline::Code(t) => Inline::Code(strip_tokens_from_string(t, repl, hoisted)),
            Inline::Link { text, href } => Inline::Link {
                text: strip_tokens_from_string(text, repl, hoisted),
                href,
            },
            Inline::Image { alt, src } => Inline::Image {
                alt: strip_tokens_from_string(alt, repl, hoisted),
                src,
            },
            other => other,
        })
        .collect()
}

/// Reasoning content is plain text; tokens inside it are restored to
/// their original source spelling instead of becoming blocks.
fn restore_raw(content: String, raw: &HashMap<String, String>) -> String {
    if !content.contains(TOKEN_MARK) {
        return content;
    }
    let mut out = content;
    for (token, source) in raw {
        if out.contains(token.as_str()) {
            out = out.replace(token.as_str(), source);
        }
    }
    out
}

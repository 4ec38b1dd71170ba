//! Presentable document model produced by the markup transformer.
//!
//! A `Document` is an ordered sequence of blocks whose order mirrors the
//! source text. Inline content is a flat span list; block nesting is
//! limited to list items carrying a depth.

use serde::{Deserialize, Serialize};

/// An ordered sequence of presentable blocks for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Flattens the document back to plain text.
    ///
    /// Blocks are separated by blank lines; forced breaks inside a block
    /// become newlines. Used by sinks that only render text and by the
    /// round-trip property tests.
    pub fn plain_text(&self) -> String {
        let rendered: Vec<String> = self.blocks.iter().map(Block::plain_text).collect();
        rendered.join("\n\n")
    }
}

/// A single presentable block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        content: Vec<Inline>,
    },
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    List {
        ordered: bool,
        items: Vec<ListItem>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    Blockquote {
        content: Vec<Inline>,
    },
    HorizontalRule,
    /// A delimited span of model reasoning, collapsible and numbered per
    /// turn starting at 1.
    ReasoningAccordion {
        step: u32,
        family: String,
        content: String,
    },
    ToolResultAccordion(ToolResultBlock),
    /// Reference to an image resource owned by the resolver. The sink
    /// re-queries resolution state by id; the document never embeds it.
    ImagePlaceholder {
        resource_id: String,
    },
}

impl Block {
    /// Flattens this block to plain text (lossy for structure, verbatim
    /// for code).
    pub fn plain_text(&self) -> String {
        match self {
            Block::Paragraph { content } | Block::Blockquote { content } => {
                inline_plain_text(content)
            }
            Block::Heading { content, .. } => inline_plain_text(content),
            Block::List { items, .. } => {
                let rendered: Vec<String> =
                    items.iter().map(|i| inline_plain_text(&i.content)).collect();
                rendered.join("\n")
            }
            Block::Table { headers, rows } => {
                let mut lines = vec![headers.join(" | ")];
                lines.extend(rows.iter().map(|r| r.join(" | ")));
                lines.join("\n")
            }
            Block::CodeBlock { code, .. } => code.clone(),
            Block::HorizontalRule => String::new(),
            Block::ReasoningAccordion { content, .. } => content.clone(),
            Block::ToolResultAccordion(block) => block.display_text().to_string(),
            Block::ImagePlaceholder { .. } => String::new(),
        }
    }
}

/// One list entry; depth is the computed nesting level, 0 for top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub depth: usize,
    pub content: Vec<Inline>,
}

/// Inline span inside a paragraph-like block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    StrongEmphasis(String),
    Strikethrough(String),
    Code(String),
    Link { text: String, href: String },
    Image { alt: String, src: String },
    Checkbox { checked: bool },
    HardBreak,
}

impl Inline {
    /// The plain-text rendering of this span.
    pub fn plain_text(&self) -> &str {
        match self {
            Inline::Text(text)
            | Inline::Strong(text)
            | Inline::Emphasis(text)
            | Inline::StrongEmphasis(text)
            | Inline::Strikethrough(text)
            | Inline::Code(text) => text,
            Inline::Link { text, .. } => text,
            Inline::Image { alt, .. } => alt,
            Inline::Checkbox { checked } => {
                if *checked {
                    "[x]"
                } else {
                    "[ ]"
                }
            }
            Inline::HardBreak => "\n",
        }
    }
}

/// Flattens a span list to plain text.
pub fn inline_plain_text(content: &[Inline]) -> String {
    content.iter().map(Inline::plain_text).collect()
}

/// A completed (or in-flight) tool invocation rendered as an accordion.
///
/// Carries both the truncated and full result so the sink can flip
/// `expanded` without re-parsing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_name: String,
    pub inputs_summary: String,
    /// Result text truncated to the tool's allowance.
    pub result: String,
    /// Original untruncated text; present only when `truncated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_result: Option<String>,
    pub truncated: bool,
    /// Size of the untruncated result, in characters.
    pub total_chars: usize,
    /// Expand/collapse flag the sink may flip freely.
    pub expanded: bool,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Image resource hoisted out of the raw result, rendered as the
    /// accordion's leading element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_image: Option<String>,
}

impl ToolResultBlock {
    /// The text the sink should show for the current expand state.
    pub fn display_text(&self) -> &str {
        if self.expanded
            && let Some(full) = &self.full_result
        {
            return full;
        }
        &self.result
    }
}

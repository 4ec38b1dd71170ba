//! Tool-result summarizer: invocation records → presentable accordions.
//!
//! Ended results are truncated to a per-tool allowance (data-rich tools
//! get more room). Truncated accordions carry both texts and a size
//! figure so the sink can flip expand/collapse without re-parsing. An
//! image marker embedded in the raw result is hoisted to be the
//! accordion's leading element.

use std::collections::HashMap;

use serde_json::Value;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use weft_types::document::{Block, ToolResultBlock};
use weft_types::turn::ToolInvocation;

use crate::images::ImageResolver;
use crate::markup::first_image_marker;

/// Character allowance for tools without a specific entry.
pub const DEFAULT_MAX_CHARS: usize = 1500;
/// Allowance for data-rich tools (file reads, web content, queries).
pub const DATA_RICH_MAX_CHARS: usize = 4000;

const DATA_RICH_TOOLS: &[&str] = &["read", "fetch_webpage", "web_search", "query"];

const INPUTS_SUMMARY_MAX_WIDTH: usize = 120;
const INPUT_VALUE_MAX_WIDTH: usize = 40;

/// Per-tool truncation limits with a default for unlisted tools.
#[derive(Debug, Clone)]
pub struct ToolLimits {
    default_max: usize,
    overrides: HashMap<String, usize>,
}

impl Default for ToolLimits {
    fn default() -> Self {
        let overrides = DATA_RICH_TOOLS
            .iter()
            .map(|name| ((*name).to_string(), DATA_RICH_MAX_CHARS))
            .collect();
        Self {
            default_max: DEFAULT_MAX_CHARS,
            overrides,
        }
    }
}

impl ToolLimits {
    /// Builds limits from config values, merged over the built-ins.
    pub fn new(default_max: usize, overrides: HashMap<String, usize>) -> Self {
        let mut limits = Self::default();
        limits.default_max = default_max;
        limits.overrides.extend(overrides);
        limits
    }

    pub fn max_for(&self, tool: &str) -> usize {
        self.overrides
            .get(tool)
            .copied()
            .unwrap_or(self.default_max)
    }
}

/// Renders one tool invocation as an accordion block.
///
/// In-flight invocations (pending/started) render with an empty result;
/// an invocation that ended in error is flagged but not fatal.
pub fn summarize(inv: &ToolInvocation, limits: &ToolLimits, images: &ImageResolver) -> Block {
    let mut raw = match (&inv.result, &inv.error) {
        (Some(result), _) => result.clone(),
        (None, Some(error)) => error.clone(),
        (None, None) => String::new(),
    };

    let mut leading_image = None;
    if let Some((range, id)) = first_image_marker(&raw) {
        images.register(&id);
        raw.replace_range(range, "");
        raw = raw.trim_start().to_string();
        leading_image = Some(id);
    }

    let total_chars = raw.chars().count();
    let max = limits.max_for(&inv.name);
    let truncated = total_chars > max;
    let (display, full) = if truncated {
        (raw.chars().take(max).collect(), Some(raw))
    } else {
        (raw, None)
    };

    Block::ToolResultAccordion(ToolResultBlock {
        tool_name: inv.name.clone(),
        inputs_summary: inputs_summary(inv.args.as_ref()),
        result: display,
        full_result: full,
        truncated,
        total_chars,
        expanded: false,
        is_error: inv.error.is_some(),
        tool_call_id: inv.id.clone(),
        leading_image,
    })
}

/// Compact `key=value` rendering of tool arguments, sorted by key and
/// width-truncated for one-line display.
fn inputs_summary(args: Option<&Value>) -> String {
    let Some(args) = args else {
        return String::new();
    };
    match args {
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let mut entries: Vec<(&str, &Value)> =
                map.iter().map(|(k, v)| (k.as_str(), v)).collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            let parts: Vec<String> = entries
                .iter()
                .map(|(key, value)| {
                    let rendered =
                        serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
                    format!(
                        "{key}={}",
                        truncate_with_ellipsis(&rendered, INPUT_VALUE_MAX_WIDTH)
                    )
                })
                .collect();
            truncate_with_ellipsis(&parts.join(", "), INPUTS_SUMMARY_MAX_WIDTH)
        }
        other => truncate_with_ellipsis(&other.to_string(), INPUTS_SUMMARY_MAX_WIDTH),
    }
}

fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

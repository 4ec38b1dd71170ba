//! Turn finalization: settle, reconcile, or discard.
//!
//! After a non-ephemeral completion the engine waits out a short settle
//! window for in-flight image resolutions, then fetches the canonical
//! persisted record and re-runs the transformer over it. The canonical
//! record always wins; a failed fetch keeps the provisional document as
//! a degraded fallback and is logged, never surfaced.

use tokio::time::{sleep, timeout};
use weft_types::document::{Block, Document};
use weft_types::record::StoredMessage;
use weft_types::turn::Part;

use crate::config::FinalizeConfig;
use crate::images::ImageResolver;
use crate::markup::{TransformContext, transform};
use crate::sink::TranscriptStore;
use crate::tools::{ToolLimits, summarize};

/// Lifecycle phases of one turn: `idle → streaming → {cancelled |
/// errored | completed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Streaming,
    Cancelled,
    Errored,
    Completed,
}

/// Runs the settle window, then swaps the provisional document for the
/// canonical one. Returns the document to keep and whether it came from
/// the canonical record.
pub(crate) async fn reconcile<T: TranscriptStore>(
    store: &T,
    resolver: &ImageResolver,
    limits: &ToolLimits,
    config: &FinalizeConfig,
    provisional: Document,
) -> (Document, bool) {
    // Yield once so already-scheduled resolution callbacks run before the
    // pending count is sampled.
    tokio::task::yield_now().await;
    sleep(config.settle_delay()).await;
    if resolver.pending_count() > 0
        && timeout(config.image_wait(), resolver.wait_idle())
            .await
            .is_err()
    {
        // Advisory window: exceeding it only cuts the image wait short.
        tracing::debug!(
            pending = resolver.pending_count(),
            "image settle window elapsed"
        );
    }

    match store.fetch_turn().await {
        Ok(messages) => (render_canonical(&messages, resolver, limits), true),
        Err(err) => {
            tracing::warn!(error = %err, "canonical fetch failed; keeping provisional document");
            (provisional, false)
        }
    }
}

/// Renders the canonical persisted record through the transformer.
///
/// Assistant messages only; a message carrying parts uses them (the
/// richer record), otherwise its raw content.
pub fn render_canonical(
    messages: &[StoredMessage],
    resolver: &ImageResolver,
    limits: &ToolLimits,
) -> Document {
    let mut ctx = TransformContext::new(resolver);
    let mut blocks: Vec<Block> = Vec::new();

    for message in messages.iter().filter(|m| m.role == "assistant") {
        if message.parts.is_empty() {
            if let Some(content) = &message.content {
                blocks.extend(transform(content, &mut ctx));
            }
            continue;
        }
        for part in &message.parts {
            match part {
                Part::Content { text } => blocks.extend(transform(text, &mut ctx)),
                Part::Tool(inv) => blocks.push(summarize(inv, limits, resolver)),
            }
        }
    }

    Document::new(blocks)
}

#[cfg(test)]
mod tests {
    use weft_types::document::Inline;

    use super::*;

    struct FixedStore(Vec<StoredMessage>);

    impl TranscriptStore for FixedStore {
        async fn fetch_turn(&self) -> anyhow::Result<Vec<StoredMessage>> {
            Ok(self.0.clone())
        }
    }

    struct FailingStore;

    impl TranscriptStore for FailingStore {
        async fn fetch_turn(&self) -> anyhow::Result<Vec<StoredMessage>> {
            anyhow::bail!("backend offline")
        }
    }

    fn fast_config() -> FinalizeConfig {
        FinalizeConfig {
            settle_delay_ms: 5,
            image_wait_ms: 20,
        }
    }

    fn provisional() -> Document {
        Document::new(vec![Block::Paragraph {
            content: vec![Inline::Text("provisional".to_string())],
        }])
    }

    #[tokio::test]
    async fn test_canonical_record_replaces_provisional() {
        let store = FixedStore(vec![StoredMessage::assistant("canonical text")]);
        let resolver = ImageResolver::new();
        let limits = ToolLimits::default();

        let (document, reconciled) = reconcile(
            &store,
            &resolver,
            &limits,
            &fast_config(),
            provisional(),
        )
        .await;

        assert!(reconciled);
        assert_eq!(
            document.blocks,
            vec![Block::Paragraph {
                content: vec![Inline::Text("canonical text".to_string())]
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_provisional_silently() {
        let resolver = ImageResolver::new();
        let limits = ToolLimits::default();

        let (document, reconciled) = reconcile(
            &FailingStore,
            &resolver,
            &limits,
            &fast_config(),
            provisional(),
        )
        .await;

        assert!(!reconciled);
        assert_eq!(document, provisional());
    }

    #[tokio::test]
    async fn test_canonical_render_skips_non_assistant_roles() {
        let messages = vec![
            StoredMessage {
                role: "user".to_string(),
                content: Some("question".to_string()),
                parts: Vec::new(),
                meta: None,
            },
            StoredMessage::assistant("answer"),
        ];
        let resolver = ImageResolver::new();
        let document = render_canonical(&messages, &resolver, &ToolLimits::default());
        assert_eq!(document.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_canonical_parts_win_over_raw_content() {
        let message = StoredMessage {
            role: "assistant".to_string(),
            content: Some("stale flat text".to_string()),
            parts: vec![Part::Content {
                text: "parts text".to_string(),
            }],
            meta: None,
        };
        let resolver = ImageResolver::new();
        let document = render_canonical(&[message], &resolver, &ToolLimits::default());
        assert_eq!(
            document.blocks,
            vec![Block::Paragraph {
                content: vec![Inline::Text("parts text".to_string())]
            }]
        );
    }
}

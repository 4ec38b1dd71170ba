//! Transcript builder and the turn driver.
//!
//! The builder accumulates typed events into the ordered parts sequence;
//! the runner drives a whole turn: consume the stream, re-render the
//! provisional document into the sink as parts change, then finalize.

pub mod finalize;

pub use finalize::TurnPhase;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_types::document::Document;
use weft_types::event::TurnEvent;
use weft_types::turn::{Part, ToolInvocation, ToolState};

use crate::config::Config;
use crate::images::ImageResolver;
use crate::markup::{TransformContext, transform};
use crate::sink::{Sink, TranscriptStore};
use crate::stream::{EventStreamParser, StreamError};
use crate::tools::{ToolLimits, summarize};

/// Accumulates an in-flight turn's events into the parts sequence.
#[derive(Debug, Default)]
pub struct TurnBuilder {
    parts: Vec<Part>,
    iteration: u32,
    reload_requested: bool,
}

impl TurnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event. Terminal events and `stream_started` are the
    /// driver's business and are ignored here.
    pub fn apply(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::Content { text } | TurnEvent::LegacyChunk { text } => {
                self.push_content(text);
            }
            TurnEvent::ToolPending { name, .. } => {
                self.parts
                    .push(Part::Tool(ToolInvocation::pending(name.clone())));
            }
            TurnEvent::ToolStart { id, name, args } => self.start_tool(id, name, args),
            TurnEvent::ToolEnd {
                id,
                name,
                result,
                error,
            } => self.end_tool(id, name, result, error.as_deref()),
            TurnEvent::IterationStart { n } => self.iteration = (*n).max(self.iteration),
            TurnEvent::Reload => self.reload_requested = true,
            TurnEvent::StreamStarted | TurnEvent::Done { .. } | TurnEvent::Error { .. } => {}
        }
    }

    /// Appends to the current content run; a run is open only while the
    /// last part is content, so tool events implicitly close it.
    fn push_content(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Part::Content { text: run }) = self.parts.last_mut() {
            run.push_str(text);
        } else {
            self.parts.push(Part::Content {
                text: text.to_string(),
            });
        }
    }

    fn start_tool(&mut self, id: &str, name: &str, args: &Value) {
        // Upgrade the most recent pending record announced for this tool.
        let upgraded = self.parts.iter_mut().rev().find_map(|part| match part {
            Part::Tool(inv)
                if inv.state == ToolState::Pending && inv.id.is_none() && inv.name == name =>
            {
                Some(inv)
            }
            _ => None,
        });
        if let Some(inv) = upgraded {
            inv.id = Some(id.to_string());
            inv.args = Some(args.clone());
            inv.state = ToolState::Started;
            return;
        }
        self.parts
            .push(Part::Tool(ToolInvocation::started(id, name, args.clone())));
    }

    fn end_tool(&mut self, id: &str, name: &str, result: &str, error: Option<&str>) {
        let found = self.parts.iter_mut().rev().find_map(|part| match part {
            Part::Tool(inv) if inv.id.as_deref() == Some(id) => Some(inv),
            _ => None,
        });
        if let Some(inv) = found {
            // State transitions are monotonic; a duplicate end is a no-op.
            if inv.state.can_advance_to(ToolState::Ended) {
                inv.state = ToolState::Ended;
                inv.result = Some(result.to_string());
                inv.error = error.map(str::to_string);
            }
            return;
        }
        // An end for an unseen id is tolerated and rendered standalone.
        self.parts.push(Part::Tool(ToolInvocation {
            id: Some(id.to_string()),
            name: name.to_string(),
            args: None,
            result: Some(result.to_string()),
            error: error.map(str::to_string),
            state: ToolState::Ended,
        }));
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    /// Whether anything would be visible: a non-blank content run or any
    /// tool invocation.
    pub fn has_visible_content(&self) -> bool {
        self.parts.iter().any(|part| match part {
            Part::Content { text } => !text.trim().is_empty(),
            Part::Tool(_) => true,
        })
    }

    /// Renders the current parts sequence into a provisional document.
    ///
    /// A fresh transform context per render keeps reasoning step numbers
    /// stable across repeated renders of the same turn.
    pub fn document(&self, resolver: &ImageResolver, limits: &ToolLimits) -> Document {
        let mut ctx = TransformContext::new(resolver);
        let mut blocks = Vec::new();
        for part in &self.parts {
            match part {
                Part::Content { text } => blocks.extend(transform(text, &mut ctx)),
                Part::Tool(inv) => blocks.push(summarize(inv, limits, resolver)),
            }
        }
        Document::new(blocks)
    }
}

/// What a finished turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The retained document; `None` for ephemeral turns, which are
    /// discarded after display.
    pub document: Option<Document>,
    pub ephemeral: bool,
    /// Whether the document came from the canonical record (false means
    /// the provisional document was kept as a degraded fallback).
    pub reconciled: bool,
    /// Either reload signal arrived during the turn.
    pub reload_requested: bool,
    /// Highest iteration boundary seen.
    pub iterations: u32,
}

/// Drives streamed turns end to end against a sink and a store.
///
/// One turn may stream at a time; `run` takes `&mut self`, so a single
/// runner cannot overlap turns. Running two runners against one sink is
/// a caller contract violation and is not detected here.
pub struct TurnRunner<K, T> {
    sink: K,
    store: T,
    resolver: ImageResolver,
    config: Config,
    phase: TurnPhase,
}

impl<K: Sink, T: TranscriptStore> TurnRunner<K, T> {
    pub fn new(sink: K, store: T, resolver: ImageResolver, config: Config) -> Self {
        Self {
            sink,
            store,
            resolver,
            config,
            phase: TurnPhase::Idle,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    /// Consumes one turn's byte stream to completion.
    ///
    /// The cancellation token is polled at line boundaries and at
    /// finalization entry; it never interrupts an in-flight parse. On
    /// every exit path the source is dropped (releasing the reader)
    /// before an error is surfaced.
    ///
    /// # Errors
    /// Transport errors and server aborts end the turn as `errored`;
    /// completion without visible content is a `NoContent` error;
    /// cancellation surfaces after the reader is released.
    pub async fn run<S, E>(
        &mut self,
        source: S,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, StreamError>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.phase = TurnPhase::Streaming;
        let limits = self.config.tools.limits();
        let mut events =
            EventStreamParser::with_max_line_bytes(source, self.config.stream.max_line_bytes);
        let mut builder = TurnBuilder::new();
        let mut done: Option<bool> = None;

        loop {
            if cancel.is_cancelled() {
                drop(events);
                self.phase = TurnPhase::Cancelled;
                return Err(StreamError::cancelled());
            }
            let Some(item) = events.next().await else {
                break;
            };
            match item {
                Ok(TurnEvent::StreamStarted) => {}
                Ok(TurnEvent::Done { ephemeral }) => {
                    done = Some(ephemeral);
                    break;
                }
                Ok(TurnEvent::Error { message }) => {
                    drop(events);
                    self.phase = TurnPhase::Errored;
                    return Err(StreamError::transport(message));
                }
                Ok(event) => {
                    builder.apply(&event);
                    let document = builder.document(&self.resolver, &limits);
                    let stick = self.sink.is_near_bottom();
                    self.sink.render(&document);
                    if stick {
                        self.sink.scroll_to_bottom(false);
                    }
                }
                Err(err) => {
                    drop(events);
                    self.phase = TurnPhase::Errored;
                    return Err(err);
                }
            }
        }
        drop(events);

        if cancel.is_cancelled() {
            self.phase = TurnPhase::Cancelled;
            return Err(StreamError::cancelled());
        }

        if !builder.has_visible_content() {
            self.phase = TurnPhase::Errored;
            return Err(StreamError::no_content());
        }

        // Source completion with content but no terminal record is
        // tolerated as a non-ephemeral done.
        let ephemeral = done.unwrap_or(false);
        self.phase = TurnPhase::Completed;

        if ephemeral {
            tracing::debug!("ephemeral turn: provisional document discarded");
            return Ok(TurnOutcome {
                document: None,
                ephemeral: true,
                reconciled: false,
                reload_requested: builder.reload_requested(),
                iterations: builder.iteration(),
            });
        }

        let provisional = builder.document(&self.resolver, &limits);
        let (document, reconciled) = finalize::reconcile(
            &self.store,
            &self.resolver,
            &limits,
            &self.config.finalize,
            provisional,
        )
        .await;
        self.sink.render(&document);
        self.sink.scroll_to_bottom(false);

        Ok(TurnOutcome {
            document: Some(document),
            ephemeral: false,
            reconciled,
            reload_requested: builder.reload_requested(),
            iterations: builder.iteration(),
        })
    }
}

//! External collaborator contracts.
//!
//! The engine never owns a widget or a backend client; it renders into a
//! [`Sink`] and fetches canonical records through a [`TranscriptStore`].

use weft_types::document::Document;
use weft_types::record::StoredMessage;

/// Where assembled documents are rendered.
pub trait Sink {
    /// Replaces the currently displayed document for the active turn.
    fn render(&mut self, document: &Document);

    /// Whether the view is scrolled near the bottom (sticky-scroll query).
    fn is_near_bottom(&self) -> bool;

    /// Scrolls to the bottom; `force` overrides a user scroll position.
    fn scroll_to_bottom(&mut self, force: bool);
}

/// Read-only access to the authoritative persisted transcript.
#[allow(async_fn_in_trait)]
pub trait TranscriptStore {
    /// Fetches the persisted record for the turn that just completed.
    ///
    /// # Errors
    /// Returns an error if the record cannot be fetched or decoded; the
    /// caller keeps the provisional document as a degraded fallback.
    async fn fetch_turn(&self) -> anyhow::Result<Vec<StoredMessage>>;
}

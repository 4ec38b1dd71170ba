//! Image resource states tracked by the placeholder resolver.

use serde::{Deserialize, Serialize};

/// Resolution state of one image resource.
///
/// Documents reference resources by id only; the resolver owns the state
/// and sinks re-query it, so document nodes never couple to async state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageState {
    /// Resolution not finished (or never started).
    Pending,
    /// Resolved to a displayable URL.
    Resolved { url: String },
    /// Resolution failed; rendered as a broken-image placeholder.
    Failed,
}

impl ImageState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ImageState::Pending)
    }

    /// The resolved URL, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageState::Resolved { url } => Some(url),
            ImageState::Pending | ImageState::Failed => None,
        }
    }
}

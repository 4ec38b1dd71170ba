//! Core weft library: the streaming transcript assembler of a chat
//! frontend (stream consumer, markup transformer, tool summarizer,
//! image resolver, turn finalization).

pub mod config;
pub mod images;
pub mod logging;
pub mod markup;
pub mod sink;
pub mod stream;
pub mod tools;
pub mod turn;

//! Taught question/answer knowledge base.
//!
//! Entries are appended when a pending question gets an answer (or through the learn
//! endpoint) and checked on every chat turn before the chat-completion fallback.

mod store;

pub use store::{KnowledgeBase, KnowledgeEntry, KnowledgeStore, StoreError};

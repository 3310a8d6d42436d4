//! Upstream translation source contract.

use futures_util::Stream;
use std::pin::Pin;

use crate::event::TranslationEvent;
use crate::sink::BoxFuture;

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// The per-session event sequence. Dropping the stream disposes the
/// subscription; the stream ending signals upstream disconnect, which the
/// engine treats as session stop.
pub type EventStream = Pin<Box<dyn Stream<Item = TranslationEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub session_id: String,
    pub user_id: String,
    pub source_locale: String,
    pub target_locale: String,
}

/// Upstream cloud translation service, one subscription per session.
///
/// The subscription names a `(source, target)` pair but the delivered
/// events may flow in either direction of it.
pub trait TranslationSource: Send + Sync {
    fn subscribe<'a>(
        &'a self,
        request: &'a SubscribeRequest,
    ) -> BoxFuture<'a, Result<EventStream, SourceError>>;
}

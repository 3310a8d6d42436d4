//! Glasses display contract.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How long a final caption stays on screen before the sink expires it.
pub const FINAL_CAPTION_DURATION: Duration = Duration::from_secs(20);
/// Display time of the unsupported-combination warning caption.
pub const WARNING_CAPTION_DURATION: Duration = Duration::from_secs(10);

/// The single-writer display surface on the glasses.
///
/// Semantics are "show this text until replaced or expired": `duration`
/// of `None` means display until the next write, and an empty `text`
/// clears the wall. The trait is object-safe via the explicit `BoxFuture`
/// return type.
pub trait GlassesSink: Send + Sync {
    fn show_text_wall<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        duration: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Pinyin (or any other) transliteration applied to glasses text before
/// captioning. The real converter is an external collaborator; the engine
/// defaults to identity.
pub type Transliterator = std::sync::Arc<dyn Fn(&str) -> String + Send + Sync>;

pub fn identity_transliterator() -> Transliterator {
    std::sync::Arc::new(|text: &str| text.to_string())
}

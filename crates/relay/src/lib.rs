pub mod debounce;
pub mod event;
pub mod hub;
pub mod registry;
mod session;
pub mod settings;
pub mod sink;
pub mod source;
pub mod unsupported;

pub use debounce::{DEBOUNCE_INTERVAL, Debouncer};
pub use event::TranslationEvent;
pub use hub::{FanoutHub, SUBSCRIBER_QUEUE_DEPTH, Subscription, ViewerEvent};
pub use registry::{Engine, EngineBuilder, Error};
pub use session::INACTIVITY_TIMEOUT;
pub use settings::{DisplayMode, UserSettings};
pub use sink::{
    BoxFuture, FINAL_CAPTION_DURATION, GlassesSink, SinkError, Transliterator,
    WARNING_CAPTION_DURATION, identity_transliterator,
};
pub use source::{EventStream, SourceError, SubscribeRequest, TranslationSource};
pub use unsupported::UnsupportedCombos;

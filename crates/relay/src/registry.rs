//! Process-wide session registry and the engine's public API.
//!
//! The registry map is the only cross-worker shared object; everything
//! per-user lives inside that user's worker task. A user's fan-out hub is
//! kept in the registry rather than the worker so viewers survive session
//! stop and receive the next session's events unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use polyglass_conversation::{ConversationLog, LanguagePair};

use crate::hub::{FanoutHub, Subscription};
use crate::session::{SessionContext, SessionMsg, spawn_session};
use crate::settings::UserSettings;
use crate::sink::{GlassesSink, Transliterator, identity_transliterator};
use crate::source::TranslationSource;
use crate::unsupported::UnsupportedCombos;

/// How long a superseded session gets to hand its conversation log over
/// before the transition is treated as a clear.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no active session for user")]
    SessionNotFound,
}

struct SessionHandle {
    session_id: String,
    inbox: mpsc::Sender<SessionMsg>,
}

#[derive(Default)]
struct UserSlot {
    hub: Arc<FanoutHub>,
    pair: Arc<Mutex<LanguagePair>>,
    session: Option<SessionHandle>,
}

struct EngineInner {
    source: Arc<dyn TranslationSource>,
    sink: Arc<dyn GlassesSink>,
    transliterator: Transliterator,
    defaults: UserSettings,
    unsupported: Arc<UnsupportedCombos>,
    users: Mutex<HashMap<String, UserSlot>>,
}

/// The per-process translation relay engine. Cheap to clone; all clones
/// share one registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

pub struct EngineBuilder {
    source: Arc<dyn TranslationSource>,
    sink: Arc<dyn GlassesSink>,
    transliterator: Transliterator,
    defaults: UserSettings,
    unsupported: UnsupportedCombos,
}

impl Engine {
    pub fn builder(
        source: Arc<dyn TranslationSource>,
        sink: Arc<dyn GlassesSink>,
    ) -> EngineBuilder {
        EngineBuilder {
            source,
            sink,
            transliterator: identity_transliterator(),
            defaults: UserSettings::default(),
            unsupported: UnsupportedCombos::builtin(),
        }
    }

    /// Open (or supersede) the session for `user_id`.
    ///
    /// A live prior session is asked to hand its conversation log over so
    /// viewers keep their history across the graceful transition; if the
    /// handoff does not complete in time the new session starts clear.
    pub async fn open_session(
        &self,
        user_id: &str,
        session_id: &str,
        device_model: Option<String>,
        settings: Option<UserSettings>,
    ) {
        let settings = settings.unwrap_or_else(|| self.inner.defaults.clone()).normalized();

        let (hub, pair, prior) = {
            let mut users = match self.inner.users.lock() {
                Ok(users) => users,
                Err(_) => return,
            };
            let slot = users.entry(user_id.to_string()).or_default();
            (slot.hub.clone(), slot.pair.clone(), slot.session.take())
        };

        let initial_log = match prior {
            Some(prior) => take_log(prior).await.unwrap_or_default(),
            None => ConversationLog::default(),
        };

        let (inbox, join) = spawn_session(SessionContext {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            device_model,
            settings,
            initial_log,
            hub,
            shared_pair: pair,
            sink: self.inner.sink.clone(),
            source: self.inner.source.clone(),
            transliterator: self.inner.transliterator.clone(),
            unsupported: self.inner.unsupported.clone(),
        });

        if let Ok(mut users) = self.inner.users.lock() {
            if let Some(slot) = users.get_mut(user_id) {
                slot.session = Some(SessionHandle {
                    session_id: session_id.to_string(),
                    inbox,
                });
            }
        }

        // Reap the registry entry when the worker ends on its own
        // (upstream disconnect), so a dead handle never lingers.
        let weak = Arc::downgrade(&self.inner);
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let _ = join.await;
            let Some(inner) = weak.upgrade() else { return };
            if let Ok(mut users) = inner.users.lock() {
                if let Some(slot) = users.get_mut(&user_id) {
                    if slot
                        .session
                        .as_ref()
                        .is_some_and(|s| s.session_id == session_id)
                    {
                        slot.session = None;
                    }
                }
            }
        });
    }

    /// Stop the session for `user_id`. Viewers are not disconnected.
    pub async fn stop_session(&self, user_id: &str) {
        let handle = match self.inner.users.lock() {
            Ok(mut users) => users
                .get_mut(user_id)
                .and_then(|slot| slot.session.take()),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.inbox.send(SessionMsg::Stop).await;
        }
    }

    /// Apply a settings change to the user's live session.
    pub async fn update_settings(
        &self,
        user_id: &str,
        settings: UserSettings,
    ) -> Result<(), Error> {
        let inbox = self.session_inbox(user_id).ok_or(Error::SessionNotFound)?;
        inbox
            .send(SessionMsg::UpdateSettings(settings))
            .await
            .map_err(|_| Error::SessionNotFound)
    }

    /// Attach a viewer. The subscription starts with the `connected` event
    /// and a replay of the conversation log as the worker saw it; without a
    /// live session the replay is empty.
    pub async fn subscribe(&self, user_id: &str) -> Subscription {
        let (hub, inbox) = {
            let mut users = match self.inner.users.lock() {
                Ok(users) => users,
                Err(poisoned) => poisoned.into_inner(),
            };
            let slot = users.entry(user_id.to_string()).or_default();
            (
                slot.hub.clone(),
                slot.session.as_ref().map(|s| s.inbox.clone()),
            )
        };

        if let Some(inbox) = inbox {
            let (reply, rx) = oneshot::channel();
            if inbox.send(SessionMsg::Subscribe { reply }).await.is_ok() {
                if let Ok(subscription) = rx.await {
                    return subscription;
                }
            }
        }
        hub.subscribe(vec![])
    }

    /// Detach a viewer eagerly (normally pruning is lazy on next write).
    pub fn unsubscribe(&self, user_id: &str, subscriber_id: u64) {
        if let Ok(users) = self.inner.users.lock() {
            if let Some(slot) = users.get(user_id) {
                slot.hub.unsubscribe(subscriber_id);
            }
        }
    }

    /// Current language pair as shown to viewers.
    pub fn language_settings(&self, user_id: &str) -> LanguagePair {
        if let Ok(users) = self.inner.users.lock() {
            if let Some(slot) = users.get(user_id) {
                if let Ok(pair) = slot.pair.lock() {
                    return pair.clone();
                }
            }
        }
        LanguagePair {
            from: self.inner.defaults.source_language.clone(),
            to: self.inner.defaults.target_language.clone(),
        }
    }

    /// Users with a live session, for the development auth fallback.
    pub fn active_users(&self) -> Vec<String> {
        match self.inner.users.lock() {
            Ok(users) => users
                .iter()
                .filter(|(_, slot)| {
                    slot.session.as_ref().is_some_and(|s| !s.inbox.is_closed())
                })
                .map(|(user, _)| user.clone())
                .collect(),
            Err(_) => vec![],
        }
    }

    pub fn default_settings(&self) -> &UserSettings {
        &self.inner.defaults
    }

    fn session_inbox(&self, user_id: &str) -> Option<mpsc::Sender<SessionMsg>> {
        let users = self.inner.users.lock().ok()?;
        let slot = users.get(user_id)?;
        let inbox = slot.session.as_ref().map(|s| s.inbox.clone())?;
        (!inbox.is_closed()).then_some(inbox)
    }
}

impl EngineBuilder {
    pub fn with_transliterator(mut self, transliterator: Transliterator) -> Self {
        self.transliterator = transliterator;
        self
    }

    pub fn with_defaults(mut self, defaults: UserSettings) -> Self {
        self.defaults = defaults.normalized();
        self
    }

    pub fn with_unsupported(mut self, unsupported: UnsupportedCombos) -> Self {
        self.unsupported = unsupported;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                source: self.source,
                sink: self.sink,
                transliterator: self.transliterator,
                defaults: self.defaults,
                unsupported: Arc::new(self.unsupported),
                users: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Ask a superseded session for its log; `None` when the worker is gone or
/// too slow, in which case the transition counts as a clear.
async fn take_log(prior: SessionHandle) -> Option<ConversationLog> {
    let (reply, rx) = oneshot::channel();
    prior
        .inbox
        .send(SessionMsg::TakeLog { reply })
        .await
        .ok()?;
    match tokio::time::timeout(HANDOFF_TIMEOUT, rx).await {
        Ok(Ok(log)) => Some(log),
        _ => {
            tracing::warn!(session_id = %prior.session_id, "log_handoff_timed_out");
            None
        }
    }
}

//! Per-user session worker.
//!
//! All mutations of one user's state are serialized onto a single task
//! driven by an inbox, so the hot path is lock-free and both the glasses
//! and the viewers observe state changes in upstream arrival order. The
//! debounce and inactivity timers are select branches of the same loop,
//! which makes their cancellation race-free: a fire that lost the race
//! simply never happens.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use polyglass_caption::{CaptionFormatter, ConfidenceStabilizer, DisplayFrame};
use polyglass_conversation::{ConversationLog, LanguagePair};

use crate::debounce::{Debouncer, Decision};
use crate::event::{TranslationEvent, is_cjk, is_pinyin, language_matches, language_name};
use crate::hub::{FanoutHub, Subscription, ViewerEvent};
use crate::settings::{DisplayMode, UserSettings};
use crate::sink::{
    FINAL_CAPTION_DURATION, GlassesSink, Transliterator, WARNING_CAPTION_DURATION,
};
use crate::source::{SubscribeRequest, TranslationSource};
use crate::unsupported::UnsupportedCombos;

/// A session with no translation events for this long clears its log and
/// caption history (subscribers stay connected).
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(40);

/// Inbox depth per session worker.
const INBOX_DEPTH: usize = 256;

pub(crate) enum SessionMsg {
    Translation(TranslationEvent),
    UpdateSettings(UserSettings),
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    /// Hand the conversation log to a superseding session and exit.
    TakeLog {
        reply: oneshot::Sender<ConversationLog>,
    },
    /// Upstream stream ended for the given subscription generation.
    UpstreamClosed {
        generation: u64,
    },
    Stop,
}

pub(crate) struct SessionContext {
    pub user_id: String,
    pub session_id: String,
    pub device_model: Option<String>,
    pub settings: UserSettings,
    pub initial_log: ConversationLog,
    pub hub: Arc<FanoutHub>,
    pub shared_pair: Arc<Mutex<LanguagePair>>,
    pub sink: Arc<dyn GlassesSink>,
    pub source: Arc<dyn TranslationSource>,
    pub transliterator: Transliterator,
    pub unsupported: Arc<UnsupportedCombos>,
}

pub(crate) fn spawn_session(
    ctx: SessionContext,
) -> (mpsc::Sender<SessionMsg>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INBOX_DEPTH);
    let worker_tx = tx.clone();
    let handle = tokio::spawn(async move {
        SessionWorker::new(ctx, worker_tx).run(rx).await;
    });
    (tx, handle)
}

struct SessionWorker {
    user_id: String,
    session_id: String,
    device_model: Option<String>,
    settings: UserSettings,

    stabilizer: ConfidenceStabilizer,
    formatter: CaptionFormatter,
    log: ConversationLog,
    debouncer: Debouncer,
    inactivity_deadline: Option<Instant>,

    hub: Arc<FanoutHub>,
    shared_pair: Arc<Mutex<LanguagePair>>,
    sink: Arc<dyn GlassesSink>,
    source: Arc<dyn TranslationSource>,
    transliterator: Transliterator,
    unsupported: Arc<UnsupportedCombos>,

    inbox_tx: mpsc::Sender<SessionMsg>,
    upstream_cancel: CancellationToken,
    upstream_generation: u64,
    subscribed: bool,
}

impl SessionWorker {
    fn new(ctx: SessionContext, inbox_tx: mpsc::Sender<SessionMsg>) -> Self {
        let settings = ctx.settings;
        let cjk = is_cjk(&settings.target_language);
        let mut log = ctx.initial_log;
        log.set_language_pair(&settings.source_language, &settings.target_language);

        let worker = Self {
            user_id: ctx.user_id,
            session_id: ctx.session_id,
            device_model: ctx.device_model,
            stabilizer: ConfidenceStabilizer::new(settings.confidence_heuristic, cjk),
            formatter: CaptionFormatter::new(
                settings.line_width,
                settings.number_of_lines as usize,
                cjk,
            ),
            log,
            debouncer: Debouncer::new(),
            inactivity_deadline: None,
            hub: ctx.hub,
            shared_pair: ctx.shared_pair,
            sink: ctx.sink,
            source: ctx.source,
            transliterator: ctx.transliterator,
            unsupported: ctx.unsupported,
            inbox_tx,
            upstream_cancel: CancellationToken::new(),
            upstream_generation: 0,
            subscribed: false,
            settings,
        };
        worker.publish_pair();
        worker
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<SessionMsg>) {
        tracing::info!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "session_started"
        );

        match self
            .unsupported
            .check(self.device_model.as_deref(), &self.settings.target_language)
        {
            Some(warning) => {
                self.show(&warning, Some(WARNING_CAPTION_DURATION)).await;
                tracing::warn!(
                    user_id = %self.user_id,
                    target = %self.settings.target_language,
                    "unsupported_combination"
                );
            }
            None => self.resubscribe_upstream(),
        }

        loop {
            let debounce_deadline = self.debouncer.deadline();
            let inactivity_deadline = self.inactivity_deadline;

            tokio::select! {
                msg = inbox.recv() => {
                    match msg {
                        Some(SessionMsg::Translation(event)) => self.handle_translation(event).await,
                        Some(SessionMsg::UpdateSettings(settings)) => self.handle_settings(settings).await,
                        Some(SessionMsg::Subscribe { reply }) => {
                            let _ = reply.send(self.hub.subscribe(self.log.entries()));
                        }
                        Some(SessionMsg::TakeLog { reply }) => {
                            let _ = reply.send(std::mem::take(&mut self.log));
                            tracing::info!(
                                user_id = %self.user_id,
                                session_id = %self.session_id,
                                "session_superseded"
                            );
                            break;
                        }
                        Some(SessionMsg::UpstreamClosed { generation }) => {
                            if generation == self.upstream_generation {
                                tracing::info!(user_id = %self.user_id, "upstream_disconnected");
                                break;
                            }
                        }
                        Some(SessionMsg::Stop) | None => break,
                    }
                }
                _ = sleep_until_opt(debounce_deadline), if debounce_deadline.is_some() => {
                    if let Some(text) = self.debouncer.take_due() {
                        self.show(&text, None).await;
                    }
                }
                _ = sleep_until_opt(inactivity_deadline), if inactivity_deadline.is_some() => {
                    self.handle_inactivity().await;
                }
            }
        }

        self.upstream_cancel.cancel();
        tracing::info!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "session_stopped"
        );
    }

    // ── Translation events ───────────────────────────────────────────────

    async fn handle_translation(&mut self, event: TranslationEvent) {
        self.inactivity_deadline = Some(Instant::now() + INACTIVITY_TIMEOUT);

        // Route the event: a passthrough shows only in `everything` mode,
        // a translation into the configured target shows in both modes,
        // and the reverse direction of the pair is logged but never shown.
        let (glasses_text, show) = if !event.did_translate {
            (
                event.translated_text.clone(),
                self.settings.display_mode == DisplayMode::Everything,
            )
        } else if language_matches(&event.target_locale, &self.settings.target_language) {
            (event.translated_text.clone(), true)
        } else {
            (String::new(), false)
        };

        if show && !glasses_text.is_empty() {
            let glasses_text = if is_pinyin(&self.settings.target_language) {
                (self.transliterator)(&glasses_text)
            } else {
                glasses_text
            };

            let frame = if event.is_final {
                self.formatter.process_string(&glasses_text, true)
            } else {
                let prefix = self.stabilizer.stabilize(&glasses_text, event.received_at);
                self.formatter.process_string(&prefix, false)
            };
            self.push_frame(frame).await;
        }

        if event.did_translate {
            let entry = self.log.add_translation(
                &event.original_text,
                &event.translated_text,
                language_name(&event.source_locale),
                language_name(&event.target_locale),
                event.is_final,
                event.received_at,
            );
            match entry {
                Some(entry) => self.hub.broadcast(&ViewerEvent::Translation(entry)),
                None => tracing::debug!(user_id = %self.user_id, "empty_translation_dropped"),
            }
        }

        if event.is_final {
            self.stabilizer.reset();
        }
    }

    async fn push_frame(&mut self, frame: DisplayFrame) {
        match self.debouncer.offer(&frame, Instant::now()) {
            Decision::SendNow => {
                let duration = frame.is_final.then_some(FINAL_CAPTION_DURATION);
                self.show(&frame.text, duration).await;
            }
            Decision::Deferred(_) => {}
        }
    }

    async fn show(&self, text: &str, duration: Option<Duration>) {
        if let Err(e) = self
            .sink
            .show_text_wall(&self.user_id, text, duration)
            .await
        {
            tracing::warn!(user_id = %self.user_id, error = %e, "glasses_write_failed");
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────

    async fn handle_settings(&mut self, settings: UserSettings) {
        let settings = settings.normalized();
        let language_changed = settings.source_language != self.settings.source_language
            || settings.target_language != self.settings.target_language;
        let heuristic_changed = settings.confidence_heuristic != self.settings.confidence_heuristic;
        let cjk = is_cjk(&settings.target_language);
        self.settings = settings;

        if let Some(warning) = self
            .unsupported
            .check(self.device_model.as_deref(), &self.settings.target_language)
        {
            self.upstream_cancel.cancel();
            self.subscribed = false;
            self.show(&warning, Some(WARNING_CAPTION_DURATION)).await;
            tracing::warn!(
                user_id = %self.user_id,
                target = %self.settings.target_language,
                "unsupported_combination"
            );
            return;
        }

        if language_changed {
            self.stabilizer =
                ConfidenceStabilizer::new(self.settings.confidence_heuristic, cjk);
            self.formatter.clear();
            self.formatter.set_layout(
                self.settings.line_width,
                self.settings.number_of_lines as usize,
                cjk,
            );
            self.log.set_language_pair(
                &self.settings.source_language,
                &self.settings.target_language,
            );
            self.publish_pair();
            self.hub
                .broadcast(&ViewerEvent::LanguageChange(self.log.language_pair().clone()));
            self.resubscribe_upstream();
            tracing::info!(
                user_id = %self.user_id,
                from = %self.settings.source_language,
                to = %self.settings.target_language,
                "language_changed"
            );
        } else {
            // Formatting-only change: retained finals re-wrap via replay,
            // the log stays intact, no fan-out event.
            self.formatter.set_layout(
                self.settings.line_width,
                self.settings.number_of_lines as usize,
                cjk,
            );
            if heuristic_changed {
                self.stabilizer =
                    ConfidenceStabilizer::new(self.settings.confidence_heuristic, cjk);
            }
            if !self.subscribed {
                self.resubscribe_upstream();
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────

    async fn handle_inactivity(&mut self) {
        tracing::info!(user_id = %self.user_id, "inactivity_clear");
        self.inactivity_deadline = None;
        self.formatter.clear();
        self.log.clear();
        self.stabilizer.reset();
        self.debouncer.clear();
        self.hub.broadcast(&ViewerEvent::Clear);
        self.show("", None).await;
    }

    // ── Upstream subscription ────────────────────────────────────────────

    /// Cancel the current upstream forwarder (if any) and start one for the
    /// configured language pair. Forwarders are generation-tagged so a
    /// cancelled one can never stop the session.
    fn resubscribe_upstream(&mut self) {
        self.upstream_cancel.cancel();
        self.upstream_cancel = CancellationToken::new();
        self.upstream_generation += 1;
        self.subscribed = true;

        let request = SubscribeRequest {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            source_locale: self.settings.source_language.clone(),
            target_locale: self.settings.target_language.clone(),
        };
        let source = self.source.clone();
        let inbox = self.inbox_tx.clone();
        let cancel = self.upstream_cancel.clone();
        let generation = self.upstream_generation;

        tokio::spawn(async move {
            forward_upstream(source, request, inbox, cancel, generation).await;
        });
    }

    fn publish_pair(&self) {
        if let Ok(mut pair) = self.shared_pair.lock() {
            *pair = self.log.language_pair().clone();
        }
    }
}

async fn forward_upstream(
    source: Arc<dyn TranslationSource>,
    request: SubscribeRequest,
    inbox: mpsc::Sender<SessionMsg>,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut stream = match source.subscribe(&request).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(
                user_id = %request.user_id,
                error = %e,
                "upstream_subscribe_failed"
            );
            let _ = inbox.send(SessionMsg::UpstreamClosed { generation }).await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = stream.next() => match event {
                Some(event) => {
                    if inbox.send(SessionMsg::Translation(event)).await.is_err() {
                        return;
                    }
                }
                None => {
                    let _ = inbox.send(SessionMsg::UpstreamClosed { generation }).await;
                    return;
                }
            }
        }
    }
}

/// `select!`-friendly optional deadline; the disabled arm is never polled.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Cloud connector: the upstream translation stream and the glasses
//! display command channel, multiplexed over one WebSocket per session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use polyglass_relay::{
    BoxFuture, EventStream, GlassesSink, SinkError, SourceError, SubscribeRequest,
    TranslationEvent, TranslationSource,
};

/// Incoming event buffer per session; the engine drains continuously.
const EVENT_BUFFER: usize = 256;

pub struct CloudClient {
    ws_url: String,
    package_name: String,
    api_key: String,
    commands: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl CloudClient {
    pub fn new(ws_url: &str, package_name: &str, api_key: &str) -> Arc<Self> {
        Arc::new(Self {
            ws_url: ws_url.to_string(),
            package_name: package_name.to_string(),
            api_key: api_key.to_string(),
            commands: Mutex::new(HashMap::new()),
        })
    }

    /// Register the display command queue for a session. A resubscription
    /// replaces the previous queue, whose forwarder task then exits on its
    /// closed channel.
    fn register_commands(&self, user_id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut commands) = self.commands.lock() {
            commands.insert(user_id.to_string(), tx);
        }
        rx
    }
}

impl TranslationSource for CloudClient {
    fn subscribe<'a>(
        &'a self,
        request: &'a SubscribeRequest,
    ) -> BoxFuture<'a, Result<EventStream, SourceError>> {
        Box::pin(async move {
            let (ws, _) = connect_async(self.ws_url.as_str()).await?;
            let (mut ws_tx, mut ws_rx) = ws.split();

            let subscribe = serde_json::json!({
                "type": "subscribe",
                "packageName": self.package_name,
                "apiKey": self.api_key,
                "sessionId": request.session_id,
                "userId": request.user_id,
                "sourceLocale": request.source_locale,
                "targetLocale": request.target_locale,
            });
            ws_tx.send(Message::Text(subscribe.to_string().into())).await?;

            let mut commands = self.register_commands(&request.user_id);
            let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
            let session_id = request.session_id.clone();
            let user_id = request.user_id.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        command = commands.recv() => match command {
                            Some(message) => {
                                if ws_tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        incoming = ws_rx.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(event) =
                                    parse_translation(&text, &session_id, &user_id)
                                {
                                    if event_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(user_id = %user_id, error = %e, "cloud_ws_error");
                                break;
                            }
                        }
                    }
                }
                tracing::info!(user_id = %user_id, "cloud_session_closed");
            });

            Ok(Box::pin(ReceiverStream::new(event_rx)) as EventStream)
        })
    }
}

impl GlassesSink for CloudClient {
    fn show_text_wall<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        duration: Option<Duration>,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut display = serde_json::json!({
                "type": "display_event",
                "view": "main",
                "layout": { "layoutType": "text_wall", "text": text },
            });
            if let Some(duration) = duration {
                display["durationMs"] = serde_json::json!(duration.as_millis() as u64);
            }

            let sender = self
                .commands
                .lock()
                .ok()
                .and_then(|commands| commands.get(user_id).cloned());
            match sender {
                Some(sender) => sender
                    .send(Message::Text(display.to_string().into()))
                    .map_err(|e| Box::new(e) as SinkError),
                None => {
                    tracing::debug!(user_id, "display_dropped_no_session");
                    Ok(())
                }
            }
        })
    }
}

/// Wire shape of one translation result from the cloud.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTranslation {
    #[serde(default)]
    original_text: String,
    #[serde(default)]
    translated_text: String,
    source_locale: String,
    target_locale: String,
    #[serde(default)]
    did_translate: bool,
    #[serde(default)]
    is_final: bool,
}

fn parse_translation(text: &str, session_id: &str, user_id: &str) -> Option<TranslationEvent> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "malformed_cloud_message");
            return None;
        }
    };
    if value["type"] != "translation" {
        return None;
    }
    let wire: WireTranslation = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!(error = %e, "malformed_translation_event");
            return None;
        }
    };

    let received_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    Some(TranslationEvent {
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        original_text: wire.original_text,
        translated_text: wire.translated_text,
        source_locale: wire.source_locale,
        target_locale: wire.target_locale,
        did_translate: wire.did_translate,
        is_final: wire.is_final,
        received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_translation_message() {
        let text = r#"{
            "type": "translation",
            "originalText": "hello",
            "translatedText": "bonjour",
            "sourceLocale": "en-US",
            "targetLocale": "fr-FR",
            "didTranslate": true,
            "isFinal": true
        }"#;
        let event = parse_translation(text, "sess", "user").unwrap();
        assert_eq!(event.translated_text, "bonjour");
        assert!(event.did_translate);
        assert!(event.is_final);
        assert_eq!(event.session_id, "sess");
    }

    #[test]
    fn ignores_non_translation_messages() {
        assert!(parse_translation(r#"{"type":"pong"}"#, "s", "u").is_none());
        assert!(parse_translation("not json", "s", "u").is_none());
    }
}

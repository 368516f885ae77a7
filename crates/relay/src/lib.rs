pub mod gemini;
mod session_lock;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use folio_core::{
    redact_counted, ChatInput, ChatReply, ChatSession, ChatTurn, Profile, RedactionStats,
};
use folio_observability::AppMetrics;
use folio_storage::SessionRepository;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use gemini::{GeminiClient, GeminiConfig};

use crate::session_lock::SessionLocks;

pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't generate a response right now. Please try again.";

const MAX_HISTORY_TURNS: usize = 40;
const SESSION_TTL_HOURS: i64 = 24;

/// Everything a hosted model needs for one reply. All text is already redacted.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub history: &'a [ChatTurn],
    pub message: &'a str,
}

pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the model answered without any usable text.
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<Option<String>>;
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("model request failed")]
    Upstream(#[source] anyhow::Error),
    #[error("session storage failed")]
    Storage(#[source] anyhow::Error),
}

pub struct ChatRelay<M, S>
where
    M: ChatModel,
    S: SessionRepository,
{
    model: M,
    store: Arc<S>,
    profile: Arc<Profile>,
    metrics: Arc<AppMetrics>,
    session_locks: SessionLocks,
}

impl<M, S> ChatRelay<M, S>
where
    M: ChatModel,
    S: SessionRepository,
{
    pub fn new(model: M, store: Arc<S>, profile: Arc<Profile>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            model,
            store,
            profile,
            metrics,
            session_locks: SessionLocks::default(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, input))]
    pub async fn handle_message(&self, input: ChatInput) -> Result<ChatReply, RelayError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let message = input.message.trim();
        if message.is_empty() {
            return Err(RelayError::EmptyMessage);
        }

        let requested = input
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let _turn_guard = match requested {
            Some(session_id) => Some(self.session_locks.acquire(session_id).await),
            None => None,
        };

        let inbound = redact_counted(message);
        let now = Utc::now();
        let mut session = self.resolve_session(requested, now).await?;

        let request = ModelRequest {
            system_instruction: self.profile.instruction.as_str(),
            history: &session.turns,
            message: &inbound.text,
        };
        let generated = match self.model.generate(&request).await {
            Ok(generated) => generated,
            Err(err) => {
                self.metrics.inc_upstream_failure();
                let detail = format!("{:#}", err);
                warn!(
                    session_id = %session.session_id,
                    model = %self.model.name(),
                    error = %detail,
                    "model request failed"
                );
                return Err(RelayError::Upstream(err));
            }
        };

        let reply_raw = match generated.filter(|text| !text.trim().is_empty()) {
            Some(text) => text,
            None => {
                self.metrics.inc_fallback();
                FALLBACK_REPLY.to_string()
            }
        };
        let outbound = redact_counted(&reply_raw);
        let redactions = RedactionStats {
            inbound: inbound.replaced,
            outbound: outbound.replaced,
        };
        let reply_text = outbound.text.into_owned();

        session.turns.push(ChatTurn::user(&*inbound.text));
        session.turns.push(ChatTurn::model(reply_text.as_str()));
        session.truncate_history(MAX_HISTORY_TURNS);
        session.expires_at = now + Duration::hours(SESSION_TTL_HOURS);
        self.store
            .upsert_session(&session)
            .await
            .map_err(RelayError::Storage)?;

        self.metrics.add_redactions(redactions.total());
        self.metrics.observe_latency(started.elapsed());
        info!(
            session_id = %session.session_id,
            history = session.turns.len(),
            message_chars = message.chars().count(),
            reply_chars = reply_text.chars().count(),
            inbound_redactions = redactions.inbound,
            outbound_redactions = redactions.outbound,
            "chat relayed"
        );

        Ok(ChatReply {
            session_id: session.session_id,
            reply_text,
            redactions,
        })
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }

    /// Unknown or expired ids get a fresh server-issued session.
    async fn resolve_session(
        &self,
        requested: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ChatSession, RelayError> {
        if let Some(session_id) = requested {
            let existing = self
                .store
                .load_session(session_id)
                .await
                .map_err(RelayError::Storage)?;
            if let Some(session) = existing.filter(|session| !session.is_expired(now)) {
                return Ok(session);
            }
        }

        Ok(ChatSession::new(
            Uuid::new_v4().to_string(),
            now + Duration::hours(SESSION_TTL_HOURS),
        ))
    }
}

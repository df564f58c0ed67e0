//! Chat session orchestrator
//!
//! Owns the session list, the active conversation and the phase machine, and
//! drives one streaming send at a time. A newer send, a session switch or an
//! explicit [`ChatOrchestrator::cancel`] supersedes the in-flight send: its
//! connection is dropped and its placeholder receives nothing further.
//!
//! All state lives behind one `std::sync::Mutex` that is never held across an
//! await. Cancellation is decided under that lock, so a frame decoded after
//! its send was superseded is never applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{ClientConfig, Message, Session, SessionDetail, SessionId};
use chat_state::{ChatEvent, ChatPhase, StateMachine};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::signals::{ChatSignal, SendOutcome};
use crate::api::{ApiClient, ChatStreamRequest};
use crate::auth::{IdentityProvider, TokenManager};
use crate::error::{ApiError, ChatError, ChatResult};
use crate::stream::{decode_stream, StreamEvent, StreamMetadata};

const SIGNAL_CAPACITY: usize = 64;

struct InFlightSend {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ChatState {
    machine: StateMachine,
    sessions: Vec<Session>,
    messages: Vec<Message>,
    active_session: Option<SessionId>,
    search_mode: bool,
    anonymous_sent: u32,
    in_flight: Option<InFlightSend>,
    next_send_id: u64,
    load_generation: u64,
}

impl ChatState {
    /// Whether `send_id` is still the send allowed to mutate state.
    fn is_current(&self, send_id: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|send| send.id == send_id && !send.cancel.is_cancelled())
    }

    fn placeholder_mut(&mut self, placeholder_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|message| message.id == placeholder_id)
    }
}

struct Inner {
    api: ApiClient,
    anonymous_limit: u32,
    state: Mutex<ChatState>,
    signals: broadcast::Sender<ChatSignal>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("phase", &self.phase())
            .field("active_session", &self.active_session())
            .finish_non_exhaustive()
    }
}

enum Applied {
    Continue,
    Ended,
    Superseded,
}

impl ChatOrchestrator {
    pub fn new(api: ApiClient) -> Self {
        let anonymous_limit = api.config().anonymous_message_limit;
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                anonymous_limit,
                state: Mutex::new(ChatState::default()),
                signals,
            }),
        }
    }

    /// Wire up the file token store, the pipeline and the orchestrator.
    pub fn from_config(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> ChatResult<Self> {
        let tokens = Arc::new(TokenManager::from_config(&config, identity));
        let api = ApiClient::new(config, tokens)?;
        Ok(Self::new(api))
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatSignal> {
        self.inner.signals.subscribe()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.lock().active_session
    }

    pub fn phase(&self) -> ChatPhase {
        self.lock().machine.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.phase().is_loading()
    }

    pub fn search_mode(&self) -> bool {
        self.lock().search_mode
    }

    pub fn set_search_mode(&self, enabled: bool) {
        self.lock().search_mode = enabled;
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, signal: ChatSignal) {
        // No subscribers is fine.
        let _ = self.inner.signals.send(signal);
    }

    fn transition(&self, state: &mut ChatState, event: ChatEvent) {
        let transition = state.machine.handle_event(event);
        if transition.changed {
            log::debug!("Chat phase {} -> {}", transition.from, transition.to);
            self.emit(ChatSignal::PhaseChanged(transition.to));
        }
    }

    /// Cancel the in-flight send, if any. Caller holds the lock.
    fn cancel_in_flight(&self, state: &mut ChatState) -> bool {
        let Some(send) = state.in_flight.take() else {
            return false;
        };
        send.cancel.cancel();
        log::info!("Cancelled in-flight send #{}", send.id);
        self.transition(state, ChatEvent::Cancelled);
        true
    }

    /// Stop the in-flight send. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        self.cancel_in_flight(&mut state)
    }

    /// Leave `Redirecting` once the host has shown its sign-in flow.
    pub fn acknowledge_redirect(&self) {
        let mut state = self.lock();
        self.transition(&mut state, ChatEvent::RedirectAcknowledged);
    }

    /// Send `text` and stream the answer into a new assistant message.
    ///
    /// Resolves when the stream finishes or the send is superseded. Content
    /// arriving before a failure is kept.
    pub async fn send_message(&self, text: &str) -> ChatResult<SendOutcome> {
        let query = text.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        // Supersede the prior send before anything can suspend.
        let send_id = {
            let mut state = self.lock();
            self.cancel_in_flight(&mut state);
            state.next_send_id += 1;
            state.next_send_id
        };

        let signed_in = self.inner.api.tokens().is_signed_in().await;

        let (cancel, placeholder_id, request) = {
            let mut state = self.lock();
            if state.next_send_id != send_id {
                return Ok(SendOutcome::Cancelled);
            }
            self.cancel_in_flight(&mut state);

            if !signed_in && state.anonymous_sent >= self.inner.anonymous_limit {
                log::info!(
                    "Anonymous message limit ({}) reached, asking for sign-in",
                    self.inner.anonymous_limit
                );
                self.transition(&mut state, ChatEvent::QuotaExceeded);
                self.emit(ChatSignal::SignInRequired);
                return Ok(SendOutcome::Redirected);
            }
            if !signed_in {
                state.anonymous_sent += 1;
            }

            let placeholder = Message::assistant_placeholder();
            let placeholder_id = placeholder.id.clone();
            state.messages.push(Message::user(query));
            state.messages.push(placeholder);

            let cancel = CancellationToken::new();
            state.in_flight = Some(InFlightSend {
                id: send_id,
                cancel: cancel.clone(),
            });
            self.transition(&mut state, ChatEvent::SendRequested);

            let request = ChatStreamRequest {
                query: query.to_string(),
                is_search_mode: state.search_mode,
                session_id: state.active_session,
            };
            (cancel, placeholder_id, request)
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SendOutcome::Cancelled),
            opened = self.inner.api.open_chat_stream(&request) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(e) => return self.fail_open(send_id, signed_in, e),
        };

        {
            let mut state = self.lock();
            if !state.is_current(send_id) {
                return Ok(SendOutcome::Cancelled);
            }
            self.transition(&mut state, ChatEvent::StreamOpened);
        }

        let mut events = Box::pin(decode_stream(response.bytes_stream()));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SendOutcome::Cancelled),
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => match self.apply_event(send_id, &placeholder_id, event) {
                    Applied::Continue => {}
                    Applied::Ended => break,
                    Applied::Superseded => return Ok(SendOutcome::Cancelled),
                },
                Some(Err(e)) => {
                    log::warn!("Chat stream interrupted: {e}");
                    let mut state = self.lock();
                    if !state.is_current(send_id) {
                        return Ok(SendOutcome::Cancelled);
                    }
                    state.in_flight = None;
                    self.transition(
                        &mut state,
                        ChatEvent::StreamFailed {
                            error: e.to_string(),
                        },
                    );
                    return Ok(SendOutcome::Interrupted);
                }
                None => break,
            }
        }

        {
            let mut state = self.lock();
            if !state.is_current(send_id) {
                return Ok(SendOutcome::Cancelled);
            }
            state.in_flight = None;
            self.transition(&mut state, ChatEvent::StreamEnded);
        }

        if signed_in {
            if let Err(e) = self.refresh_sessions().await {
                log::warn!("Failed to refresh sessions after send: {e}");
            }
        }
        Ok(SendOutcome::Completed)
    }

    fn fail_open(&self, send_id: u64, signed_in: bool, error: ApiError) -> ChatResult<SendOutcome> {
        let mut state = self.lock();
        if !state.is_current(send_id) {
            return Ok(SendOutcome::Cancelled);
        }
        state.in_flight = None;
        self.transition(
            &mut state,
            ChatEvent::StreamFailed {
                error: error.to_string(),
            },
        );

        // The service enforces its own anonymous quota.
        if !signed_in && error.status() == Some(403) {
            log::info!("Service refused anonymous message: {error}");
            self.transition(&mut state, ChatEvent::QuotaExceeded);
            self.emit(ChatSignal::SignInRequired);
            return Ok(SendOutcome::Redirected);
        }

        log::error!("Failed to open chat stream: {error}");
        Err(error.into())
    }

    fn apply_event(&self, send_id: u64, placeholder_id: &str, event: StreamEvent) -> Applied {
        let mut state = self.lock();
        if !state.is_current(send_id) {
            return Applied::Superseded;
        }

        match event {
            StreamEvent::Metadata(metadata) => {
                self.apply_metadata(&mut state, placeholder_id, metadata);
                Applied::Continue
            }
            StreamEvent::Content { text } => {
                if let Some(placeholder) = state.placeholder_mut(placeholder_id) {
                    placeholder.content.push_str(&text);
                }
                Applied::Continue
            }
            StreamEvent::End => Applied::Ended,
        }
    }

    fn apply_metadata(&self, state: &mut ChatState, placeholder_id: &str, metadata: StreamMetadata) {
        if let Some(placeholder) = state.placeholder_mut(placeholder_id) {
            if placeholder.search_payload.is_none() {
                placeholder.search_payload = metadata.search;
            }
        }

        if let (None, Some(id)) = (state.active_session, metadata.session_id) {
            log::info!("Conversation stored as session {id}");
            state.active_session = Some(id);
            self.emit(ChatSignal::SessionStarted(id));
        }
    }

    /// Make `id` the active session. `None` starts a blank conversation;
    /// `Some` clears the messages and loads that session's history.
    pub async fn switch_session(&self, id: Option<SessionId>) -> ChatResult<()> {
        let generation = {
            let mut state = self.lock();
            self.cancel_in_flight(&mut state);
            state.active_session = id;
            state.messages.clear();
            state.load_generation += 1;
            state.load_generation
        };

        let Some(id) = id else {
            return Ok(());
        };

        if let Some(detail) = self.fetch_session(id).await? {
            let mut state = self.lock();
            // A later switch owns the message list now.
            if state.load_generation == generation && state.active_session == Some(id) {
                state.messages = detail.messages;
            }
        }
        Ok(())
    }

    /// Load one session with its history.
    ///
    /// A missing session clears the active conversation, emits
    /// [`ChatSignal::NavigateToRoot`] and gives `Ok(None)`. The pipeline has
    /// already refreshed and retried once on 401, so a 401 here emits
    /// [`ChatSignal::SignInRequired`].
    pub async fn fetch_session(&self, id: SessionId) -> ChatResult<Option<SessionDetail>> {
        match self.inner.api.get_session(id).await {
            Ok(detail) => Ok(Some(detail)),
            Err(e) if e.is_not_found() => {
                log::warn!("Session {id} not found, returning to root");
                {
                    let mut state = self.lock();
                    if state.active_session == Some(id) {
                        state.active_session = None;
                        state.messages.clear();
                    }
                    state.sessions.retain(|session| session.id != id);
                }
                self.emit(ChatSignal::NavigateToRoot);
                Ok(None)
            }
            Err(e) if e.is_unauthorized() => {
                log::warn!("Not authorized to load session {id}");
                self.emit(ChatSignal::SignInRequired);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reload the session list.
    pub async fn refresh_sessions(&self) -> ChatResult<Vec<Session>> {
        let sessions = self.inner.api.list_sessions().await?;
        self.lock().sessions = sessions.clone();
        Ok(sessions)
    }

    pub async fn create_session(&self, name: Option<&str>) -> ChatResult<Session> {
        let session = self.inner.api.create_session(name).await?;
        self.lock().sessions.insert(0, session.clone());
        Ok(session)
    }

    pub async fn rename_session(&self, id: SessionId, name: &str) -> ChatResult<Session> {
        let renamed = self.inner.api.rename_session(id, name).await?;

        let mut state = self.lock();
        match state.sessions.iter_mut().find(|session| session.id == id) {
            Some(session) => {
                session.name = renamed.name;
                Ok(session.clone())
            }
            None => Ok(renamed),
        }
    }

    /// Delete a session; deleting the active one also clears the conversation.
    pub async fn delete_session(&self, id: SessionId) -> ChatResult<()> {
        self.inner.api.delete_session(id).await?;

        let mut state = self.lock();
        state.sessions.retain(|session| session.id != id);
        if state.active_session == Some(id) {
            self.cancel_in_flight(&mut state);
            state.active_session = None;
            state.messages.clear();
        }
        Ok(())
    }

    /// Drop the stored credential and every piece of per-user state.
    pub fn sign_out(&self) {
        let mut state = self.lock();
        self.cancel_in_flight(&mut state);
        self.inner.api.tokens().sign_out();
        state.sessions.clear();
        state.messages.clear();
        state.active_session = None;
        state.load_generation += 1;
        log::info!("Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, StaticIdentityProvider};
    use std::time::Duration;

    /// Nothing listens on the discard port, so any request fails fast.
    fn orchestrator(limit: u32) -> ChatOrchestrator {
        let config = ClientConfig {
            anonymous_message_limit: limit,
            ..ClientConfig::with_api_base("http://127.0.0.1:9")
        };
        let tokens = Arc::new(TokenManager::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(StaticIdentityProvider::new()),
            Duration::from_secs(30),
        ));
        ChatOrchestrator::new(ApiClient::new(config, tokens).expect("client"))
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let chat = orchestrator(2);
        let err = chat.send_message("   ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(chat.messages().is_empty());
        assert_eq!(chat.phase(), ChatPhase::Idle);
    }

    #[tokio::test]
    async fn test_zero_quota_redirects_immediately() {
        let chat = orchestrator(0);
        let mut signals = chat.subscribe();

        let outcome = chat.send_message("hello").await.expect("send");

        assert_eq!(outcome, SendOutcome::Redirected);
        assert_eq!(chat.phase(), ChatPhase::Redirecting);
        assert!(!chat.is_loading());
        assert!(chat.messages().is_empty());
        assert_eq!(
            signals.try_recv().expect("phase signal"),
            ChatSignal::PhaseChanged(ChatPhase::Redirecting)
        );
        assert_eq!(
            signals.try_recv().expect("sign-in signal"),
            ChatSignal::SignInRequired
        );

        chat.acknowledge_redirect();
        assert_eq!(chat.phase(), ChatPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_open_returns_to_idle_and_keeps_placeholder() {
        let chat = orchestrator(2);

        let result = chat.send_message("hello").await;

        assert!(result.is_err());
        assert_eq!(chat.phase(), ChatPhase::Idle);
        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_user_message);
        assert_eq!(messages[1].content, "");
    }

    #[tokio::test]
    async fn test_switch_to_none_clears_conversation() {
        let chat = orchestrator(2);
        let _ = chat.send_message("hello").await;
        assert!(!chat.messages().is_empty());

        chat.switch_session(None).await.expect("switch");
        assert!(chat.messages().is_empty());
        assert_eq!(chat.active_session(), None);
    }

    #[tokio::test]
    async fn test_search_mode_toggle_and_idle_cancel() {
        let chat = orchestrator(2);
        assert!(!chat.search_mode());
        chat.set_search_mode(true);
        assert!(chat.search_mode());
        assert!(!chat.cancel());
    }
}

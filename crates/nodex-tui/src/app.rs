use std::fmt::Display;
use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use nodex_core::{
    ChatMessage, Config, Conversation, CredentialStore, DispatchError, Gateway, KeySource,
    KeyValueStore, ProviderConfig, ProviderId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// What happened when the user pressed Enter on the input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Empty,
    Busy,
    NeedsKey,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat state
    pub conversation: Conversation,
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars
    pub query_loading: bool,
    pub query_scroll: u16,
    pub query_chat_height: u16, // Height of chat area for scroll calculations
    pub query_chat_width: u16,  // Width of chat area for wrap calculations
    pub query_task: Option<JoinHandle<Result<String, DispatchError>>>,
    query_model: String,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    /// One-line notice shown in the footer (save failures, copy, etc.)
    pub status_message: Option<String>,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Provider state
    pub current_provider: ProviderId,
    pub selected_model: String,
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub api_key_target_provider: Option<ProviderId>,
    pub api_key_notice: Option<String>,

    // Chat area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    pub gateway: Gateway,
    pub credentials: CredentialStore,
    store: Arc<dyn KeyValueStore>,
}

/// Text of the synthetic assistant message that replaces a failed reply
pub fn error_reply(error: impl Display) -> String {
    format!(
        "Sorry, I encountered an error: {}. Please check your API key and try again.",
        error
    )
}

impl App {
    pub fn new(store: Arc<dyn KeyValueStore>, credentials: CredentialStore, gateway: Gateway) -> Self {
        let config = Config::load(store.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable preferences, using defaults");
            Config::new()
        });
        let (current_provider, selected_model) = config.resolve(gateway.registry());
        info!(
            provider = current_provider.as_str(),
            model = %selected_model,
            "Starting chat"
        );

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            conversation: Conversation::new(),
            query_input: String::new(),
            query_cursor: 0,
            query_loading: false,
            query_scroll: 0,
            query_chat_height: 0,
            query_chat_width: 0,
            query_task: None,
            query_model: String::new(),

            animation_frame: 0,
            status_message: None,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            current_provider,
            selected_model,
            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            api_key_target_provider: None,
            api_key_notice: None,

            chat_area: None,

            gateway,
            credentials,
            store,
        }
    }

    pub fn provider_config(&self, provider: ProviderId) -> &ProviderConfig {
        self.gateway.registry().get(provider)
    }

    pub fn key_source(&self, provider: ProviderId) -> Option<KeySource> {
        self.credentials.lookup(provider).map(|(_, source)| source)
    }

    /// Send the input line. Blocks without a key and while a reply is pending.
    pub fn send_message(&mut self) -> SendOutcome {
        let text = self.query_input.trim().to_string();
        if text.is_empty() {
            return SendOutcome::Empty;
        }
        if self.query_task.is_some() {
            return SendOutcome::Busy;
        }

        let provider = self.current_provider;
        let Some((api_key, _)) = self.credentials.lookup(provider) else {
            info!(provider = provider.as_str(), "Send blocked, no API key");
            let notice = format!(
                "Please enter your {} API key first.",
                provider.display_name()
            );
            self.open_api_key_input(provider, Some(notice));
            return SendOutcome::NeedsKey;
        };

        self.conversation.push(ChatMessage::user(text));
        self.query_input.clear();
        self.query_cursor = 0;
        self.query_loading = true;
        self.status_message = None;
        self.scroll_query_to_bottom();

        let gateway = self.gateway.clone();
        let transcript = self.conversation.messages().to_vec();
        let model = self.selected_model.clone();
        self.query_model = model.clone();

        self.query_task = Some(tokio::spawn(async move {
            gateway.send(&transcript, provider, &model, &api_key).await
        }));
        SendOutcome::Sent
    }

    /// Fold a finished request into the transcript. No-op while it runs.
    pub async fn poll_query(&mut self) {
        let finished = self
            .query_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let Some(task) = self.query_task.take() else {
            return;
        };

        let content = match task.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => error_reply(&e),
            Err(e) => {
                error!(error = %e, "Chat request task failed");
                error_reply(&e)
            }
        };

        self.conversation
            .push(ChatMessage::assistant(content, &self.query_model));
        self.query_loading = false;
        self.animation_frame = 0;
        self.scroll_query_to_bottom();
    }

    pub fn clear_chat(&mut self) {
        if self.query_loading {
            self.status_message = Some("Wait for the reply before clearing".to_string());
            return;
        }
        self.conversation.clear();
        self.query_scroll = 0;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.query_loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat so the newest message (or "Thinking...") is visible
    pub fn scroll_query_to_bottom(&mut self) {
        let wrap_width = if self.query_chat_width > 0 {
            self.query_chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.conversation.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }
        if self.query_loading {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }

        let visible_height = if self.query_chat_height > 0 {
            self.query_chat_height
        } else {
            20
        };

        self.query_scroll = total_lines.saturating_sub(visible_height);
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        self.available_models = self
            .provider_config(self.current_provider)
            .available_models
            .clone();
        let current_idx = self
            .available_models
            .iter()
            .position(|m| m == &self.selected_model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
            .cloned()
        {
            self.selected_model = model;
            self.show_model_picker = false;
            self.save_selection();
        }
    }

    // Provider picker methods
    pub fn open_provider_picker(&mut self) {
        let current_idx = ProviderId::all()
            .iter()
            .position(|p| *p == self.current_provider)
            .unwrap_or(0);
        self.provider_picker_state.select(Some(current_idx));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = ProviderId::all().len();
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    /// Switch to the highlighted provider, asking for a key first if it has none
    pub fn choose_provider(&mut self) {
        let Some(provider) = self
            .provider_picker_state
            .selected()
            .and_then(|i| ProviderId::all().get(i).copied())
        else {
            return;
        };
        self.show_provider_picker = false;

        if self.key_source(provider).is_none() {
            self.open_api_key_input(provider, None);
        } else {
            self.switch_provider(provider);
        }
    }

    fn switch_provider(&mut self, provider: ProviderId) {
        if provider != self.current_provider {
            self.current_provider = provider;
            self.selected_model = self.provider_config(provider).default_model().to_string();
        }
        self.save_selection();
    }

    // API key input methods
    pub fn open_api_key_input(&mut self, provider: ProviderId, notice: Option<String>) {
        self.api_key_target_provider = Some(provider);
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.api_key_notice = notice;
        self.show_api_key_input = true;
    }

    pub fn close_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.api_key_target_provider = None;
        self.api_key_notice = None;
    }

    /// Save the typed key and make its provider current
    pub fn submit_api_key(&mut self) {
        let Some(provider) = self.api_key_target_provider else {
            self.close_api_key_input();
            return;
        };
        if self.api_key_input.trim().is_empty() {
            self.close_api_key_input();
            return;
        }

        let key = self.api_key_input.clone();
        if let Err(e) = self.credentials.set(provider, &key) {
            error!(provider = provider.as_str(), error = %e, "Failed to save API key");
            self.status_message = Some(format!("Could not save API key: {}", e));
        } else {
            info!(provider = provider.as_str(), "API key saved");
        }
        self.close_api_key_input();
        self.switch_provider(provider);
    }

    /// Forget the stored key for the provider being edited
    pub fn clear_api_key(&mut self) {
        let Some(provider) = self.api_key_target_provider else {
            return;
        };
        match self.credentials.clear(provider) {
            Ok(()) => {
                info!(provider = provider.as_str(), "API key cleared");
                self.status_message = Some(format!("{} API key cleared", provider.display_name()));
            }
            Err(e) => {
                error!(provider = provider.as_str(), error = %e, "Failed to clear API key");
                self.status_message = Some(format!("Could not clear API key: {}", e));
            }
        }
        self.close_api_key_input();
    }

    fn save_selection(&mut self) {
        if let Err(e) = Config::save_selection(
            self.store.as_ref(),
            self.current_provider,
            &self.selected_model,
        ) {
            warn!(error = %e, "Failed to save preferences");
            self.status_message = Some(format!("Could not save preferences: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodex_core::{MemoryStore, ProviderRegistry};
    use std::time::Duration;

    fn app_with(store: Arc<dyn KeyValueStore>, gateway: Gateway) -> App {
        let credentials = CredentialStore::load(store.clone()).unwrap();
        App::new(store, credentials, gateway)
    }

    /// Gateway whose endpoints all point at a closed port
    fn offline_gateway() -> Gateway {
        let mut registry = ProviderRegistry::builtin();
        for provider in ProviderId::all() {
            registry = registry.with_endpoint(provider, "http://127.0.0.1:1/unreachable");
        }
        Gateway::with_registry(registry)
    }

    async fn wait_for_reply(app: &mut App) {
        for _ in 0..500 {
            app.poll_query().await;
            if app.query_task.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request never finished");
    }

    #[tokio::test]
    async fn test_send_without_key_opens_key_input() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());
        app.query_input = "Hi".to_string();

        assert_eq!(app.send_message(), SendOutcome::NeedsKey);
        assert!(app.conversation.is_empty());
        assert!(app.query_task.is_none());
        assert!(app.show_api_key_input);
        assert_eq!(app.api_key_target_provider, Some(ProviderId::OpenAI));
        // Input is kept so the user can send after adding the key
        assert_eq!(app.query_input, "Hi");
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());
        app.query_input = "   ".to_string();
        assert_eq!(app.send_message(), SendOutcome::Empty);
        assert!(app.conversation.is_empty());
    }

    #[tokio::test]
    async fn test_failed_request_becomes_assistant_message() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());
        app.credentials.set(ProviderId::OpenAI, "k1").unwrap();
        app.query_input = "Hi".to_string();

        assert_eq!(app.send_message(), SendOutcome::Sent);
        assert!(app.query_loading);
        assert!(app.query_input.is_empty());

        wait_for_reply(&mut app).await;

        let messages = app.conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi");
        assert!(messages[1].content.starts_with("Sorry, I encountered an error:"));
        assert_eq!(messages[1].model.as_deref(), Some("gpt-4"));
        assert!(!app.query_loading);
    }

    #[tokio::test]
    async fn test_second_send_refused_while_pending() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());
        app.credentials.set(ProviderId::OpenAI, "k1").unwrap();

        app.query_input = "first".to_string();
        assert_eq!(app.send_message(), SendOutcome::Sent);
        app.query_input = "second".to_string();
        assert_eq!(app.send_message(), SendOutcome::Busy);
        assert_eq!(app.conversation.len(), 1);

        wait_for_reply(&mut app).await;
        assert_eq!(app.conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_key_switches_provider_and_persists() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store.clone(), offline_gateway());

        app.open_api_key_input(ProviderId::Groq, None);
        app.api_key_input = "gsk_test".to_string();
        app.submit_api_key();

        assert!(!app.show_api_key_input);
        assert_eq!(app.current_provider, ProviderId::Groq);
        assert_eq!(app.selected_model, "mixtral-8x7b-32768");

        let reopened = app_with(store, offline_gateway());
        assert_eq!(reopened.current_provider, ProviderId::Groq);
        assert_eq!(reopened.credentials.get(ProviderId::Groq), Some("gsk_test"));
    }

    #[tokio::test]
    async fn test_choose_provider_without_key_asks_for_one() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());

        app.open_provider_picker();
        app.provider_picker_nav_down(); // Anthropic
        app.choose_provider();

        assert!(!app.show_provider_picker);
        assert!(app.show_api_key_input);
        assert_eq!(app.api_key_target_provider, Some(ProviderId::Anthropic));
        assert_eq!(app.current_provider, ProviderId::OpenAI);
    }

    #[tokio::test]
    async fn test_select_model_persists() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store.clone(), offline_gateway());

        app.open_model_picker();
        app.model_picker_nav_down();
        app.select_model();
        assert_eq!(app.selected_model, "gpt-4-turbo");

        let config = Config::load(store.as_ref()).unwrap();
        assert_eq!(config.default_model.as_deref(), Some("gpt-4-turbo"));
    }

    #[tokio::test]
    async fn test_clear_api_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut app = app_with(store, offline_gateway());
        app.credentials.set(ProviderId::OpenAI, "k1").unwrap();

        app.open_api_key_input(ProviderId::OpenAI, None);
        app.clear_api_key();

        assert!(app.key_source(ProviderId::OpenAI).is_none());
        assert!(!app.show_api_key_input);
    }

    #[test]
    fn test_error_reply_text() {
        let err = DispatchError::MissingCredential(ProviderId::Groq);
        assert_eq!(
            error_reply(&err),
            "Sorry, I encountered an error: No API key configured for Groq. Please check your API key and try again."
        );
    }
}

use std::path::PathBuf;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::api::{self, ApiClient, ApiError, BackendStatus, ChatAnswer, ChatPayload};
use crate::config::Config;
use crate::notification::{NotificationSlot, Severity};

// Fixed user-facing texts, kept identical to the desktop build.
pub const CHAT_FALLBACK: &str = "Lo siento, ocurrió un error al consultar el servidor.";
pub const TRAIN_FALLBACK: &str = "Error al ejecutar /train";
pub const UPLOAD_FALLBACK: &str = "Error al subir historia clínica";
pub const NO_FILE_SELECTED: &str = "Selecciona un archivo primero";
pub const UNSUPPORTED_FILE: &str = "Tipo de archivo no soportado";
pub const FILE_NOT_FOUND: &str = "No se encontró el archivo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One entry of the conversation log. Messages are never edited or removed;
/// insertion order is display order.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
        }
    }
}

/// Which of the two original front-end variants this build behaves as: the
/// reduced variant ships without the training/upload actions.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub training: bool,
    pub upload: bool,
}

impl Features {
    pub fn from_config(config: &Config) -> Self {
        Self {
            training: config.enable_training,
            upload: config.enable_upload,
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self {
            training: true,
            upload: true,
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub features: Features,

    // Conversation store: append-only log for the current session.
    pub messages: Vec<ChatMessage>,

    // Question input
    pub input_text: String,
    pub input_cursor: usize,

    // Request-in-flight guards, one per action type. Each is raised before
    // its call is spawned and lowered when the call settles either way.
    pub sending_message: bool,
    pub training: bool,

    // Patient file selection and the path-entry popup
    pub pending_upload: Option<PathBuf>,
    pub show_upload_input: bool,
    pub upload_input: String,
    pub upload_cursor: usize,

    pub notification: NotificationSlot,

    // Outstanding backend calls, at most one per action type.
    pub chat_task: Option<JoinHandle<Result<ChatAnswer, ApiError>>>,
    pub train_task: Option<JoinHandle<Result<BackendStatus, ApiError>>>,
    pub upload_task: Option<JoinHandle<Result<BackendStatus, ApiError>>>,

    // Chat viewport (updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,

    pub client: ApiClient,
}

impl App {
    pub fn new(client: ApiClient, features: Features) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            features,

            messages: Vec::new(),

            input_text: String::new(),
            input_cursor: 0,

            sending_message: false,
            training: false,

            pending_upload: None,
            show_upload_input: false,
            upload_input: String::new(),
            upload_cursor: 0,

            notification: NotificationSlot::default(),

            chat_task: None,
            train_task: None,
            upload_task: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,

            client,
        }
    }

    // --- Send flow ---

    /// Entry of the send flow. Builds the request payload from the store as
    /// it was before the question is appended, then appends the question for
    /// immediate display and raises the guard. Returns `None` when the guard
    /// holds: empty/whitespace input, or a chat request already in flight.
    pub fn submit_question(&mut self) -> Option<ChatPayload> {
        if self.sending_message || self.input_text.trim().is_empty() {
            return None;
        }

        let question = std::mem::take(&mut self.input_text);
        self.input_cursor = 0;

        // History must lag the displayed log by exactly this question.
        let payload = ChatPayload::new(question.clone(), &self.messages);

        self.messages.push(ChatMessage::user(question));
        self.sending_message = true;
        self.scroll_chat_to_bottom();

        Some(payload)
    }

    /// Reconciles a settled /chat call. A failed call is absorbed into the
    /// conversation as a fixed apology message, never surfaced as a toast.
    pub fn apply_chat_result(&mut self, result: Result<ChatAnswer, ApiError>) {
        let text = match result {
            Ok(answer) => answer.answer,
            Err(err) => {
                tracing::warn!("chat request failed: {err}");
                CHAT_FALLBACK.to_string()
            }
        };

        self.messages.push(ChatMessage::assistant(text));
        self.sending_message = false;
        self.scroll_chat_to_bottom();
    }

    pub fn dispatch_chat(&mut self) {
        if let Some(payload) = self.submit_question() {
            let client = self.client.clone();
            self.chat_task = Some(tokio::spawn(
                async move { client.send_chat(&payload).await },
            ));
        }
    }

    // --- Train flow ---

    /// Raises the training guard. A second request while one is in flight is
    /// a no-op.
    pub fn begin_training(&mut self) -> bool {
        if self.training {
            return false;
        }
        self.training = true;
        true
    }

    pub fn apply_train_result(&mut self, result: Result<BackendStatus, ApiError>) {
        match result {
            Ok(status) => {
                let severity = if status.is_success() {
                    Severity::Success
                } else {
                    Severity::Warning
                };
                self.notification.show(status.message, severity);
            }
            Err(err) => {
                tracing::warn!("train request failed: {err}");
                self.notification.show(TRAIN_FALLBACK, Severity::Error);
            }
        }
        self.training = false;
    }

    pub fn dispatch_train(&mut self) {
        if self.begin_training() {
            let client = self.client.clone();
            self.train_task = Some(tokio::spawn(async move { client.trigger_train().await }));
        }
    }

    // --- Upload flow ---

    /// Records the file the next upload will send. Only extensions from the
    /// original file dialog are accepted.
    pub fn select_patient_file(&mut self, path: PathBuf) {
        if !api::is_accepted_file(&path) {
            self.notification.show(UNSUPPORTED_FILE, Severity::Warning);
            return;
        }
        if !path.exists() {
            self.notification.show(FILE_NOT_FOUND, Severity::Warning);
            return;
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.notification
            .show(format!("Historia clínica seleccionada: {name}"), Severity::Info);
        self.pending_upload = Some(path);
    }

    /// Entry of the upload flow. With no file selected the action degrades
    /// to a warning toast and no request is issued.
    pub fn begin_upload(&mut self) -> Option<PathBuf> {
        if self.upload_task.is_some() {
            return None;
        }
        match &self.pending_upload {
            Some(path) => Some(path.clone()),
            None => {
                self.notification.show(NO_FILE_SELECTED, Severity::Warning);
                None
            }
        }
    }

    /// The selection is consumed by the attempt whether or not it succeeded.
    /// The desktop build behaves the same way; see DESIGN.md before changing
    /// the failure path.
    pub fn apply_upload_result(&mut self, result: Result<BackendStatus, ApiError>) {
        match result {
            Ok(status) => {
                let severity = if status.is_success() {
                    Severity::Success
                } else {
                    Severity::Error
                };
                self.notification.show(status.message, severity);
            }
            Err(err) => {
                tracing::warn!("patient upload failed: {err}");
                self.notification.show(UPLOAD_FALLBACK, Severity::Error);
            }
        }
        self.pending_upload = None;
    }

    pub fn dispatch_upload(&mut self) {
        if let Some(path) = self.begin_upload() {
            let client = self.client.clone();
            self.upload_task = Some(tokio::spawn(async move {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "historia".to_string());
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| ApiError::File {
                        path: path.clone(),
                        source,
                    })?;
                client.upload_patient(&filename, bytes).await
            }));
        }
    }

    // --- Event-loop plumbing ---

    /// Reaps finished backend tasks and folds their results into the state.
    /// Called once per event-loop iteration; unfinished tasks are left alone
    /// so a slow backend never blocks the interface.
    pub async fn poll_inflight(&mut self) {
        if self.chat_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.chat_task.take() {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!("chat task aborted: {err}");
                        Err(ApiError::Aborted { endpoint: "/chat" })
                    }
                };
                self.apply_chat_result(result);
            }
        }

        if self.train_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.train_task.take() {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!("train task aborted: {err}");
                        Err(ApiError::Aborted { endpoint: "/train" })
                    }
                };
                self.apply_train_result(result);
            }
        }

        if self
            .upload_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            if let Some(task) = self.upload_task.take() {
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!("upload task aborted: {err}");
                        Err(ApiError::Aborted { endpoint: "/upload_patient" })
                    }
                };
                self.apply_upload_result(result);
            }
        }
    }

    /// Advances the waiting animation and expires the toast. Driven by the
    /// 300ms tick event.
    pub fn tick(&mut self) {
        if self.sending_message {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.notification.tick(Instant::now());
    }

    // --- Chat viewport ---

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.rendered_chat_lines().saturating_sub(self.chat_height);
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scrolls so the newest message (or the waiting indicator) is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.rendered_chat_lines();
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        }
    }

    /// Estimates how many lines the chat panel needs at the current width,
    /// counting wrapped content lines the way the renderer lays them out.
    fn rendered_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in &self.messages {
            total_lines += 1; // speaker line ("Tú:" / "FarmaAsis:")
            for line in msg.text.lines() {
                // Character count, not byte length, so UTF-8 wraps correctly.
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after each message
        }

        if self.sending_message {
            total_lines += 2; // "FarmaAsis:" + "Pensando..."
        }

        total_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DEFAULT_BASE_URL;

    fn test_app() -> App {
        App::new(ApiClient::new(DEFAULT_BASE_URL), Features::default())
    }

    fn answer(text: &str) -> Result<ChatAnswer, ApiError> {
        Ok(ChatAnswer {
            answer: text.to_string(),
        })
    }

    fn status(status: &str, message: &str) -> Result<BackendStatus, ApiError> {
        Ok(BackendStatus {
            status: status.to_string(),
            message: message.to_string(),
        })
    }

    fn aborted() -> ApiError {
        ApiError::Aborted { endpoint: "/chat" }
    }

    #[test]
    fn send_appends_user_then_assistant_in_order() {
        let mut app = test_app();
        app.input_text = "¿Qué dosis de paracetamol?".to_string();

        let payload = app.submit_question().expect("should dispatch");
        assert_eq!(payload.question, "¿Qué dosis de paracetamol?");
        assert!(app.sending_message);
        assert!(app.input_text.is_empty());

        app.apply_chat_result(answer("500mg cada 8 horas"));

        assert_eq!(app.messages.len(), 2);
        assert!(app.messages[0].is_user);
        assert_eq!(app.messages[0].text, "¿Qué dosis de paracetamol?");
        assert!(!app.messages[1].is_user);
        assert_eq!(app.messages[1].text, "500mg cada 8 horas");
        assert!(!app.sending_message);
    }

    #[test]
    fn n_rounds_leave_2n_messages_in_request_order() {
        let mut app = test_app();

        for i in 0..5 {
            app.input_text = format!("pregunta {i}");
            app.submit_question().expect("guard should be down");
            app.apply_chat_result(answer(&format!("respuesta {i}")));
        }

        assert_eq!(app.messages.len(), 10);
        for i in 0..5 {
            assert_eq!(app.messages[2 * i].text, format!("pregunta {i}"));
            assert!(app.messages[2 * i].is_user);
            assert_eq!(app.messages[2 * i + 1].text, format!("respuesta {i}"));
            assert!(!app.messages[2 * i + 1].is_user);
        }
    }

    #[test]
    fn history_never_contains_the_question_being_sent() {
        let mut app = test_app();

        app.input_text = "primera".to_string();
        let first = app.submit_question().unwrap();
        assert!(first.chat_history.is_empty());
        app.apply_chat_result(answer("una"));

        app.input_text = "segunda".to_string();
        let second = app.submit_question().unwrap();

        // Exactly the store before the second question was appended.
        assert_eq!(
            second.chat_history,
            vec![
                ("primera".to_string(), "user".to_string()),
                ("una".to_string(), "assistant".to_string()),
            ]
        );
        assert!(second
            .chat_history
            .iter()
            .all(|(text, _)| text != "segunda"));
    }

    #[test]
    fn second_send_while_in_flight_is_a_no_op() {
        let mut app = test_app();
        app.input_text = "primera".to_string();
        app.submit_question().unwrap();

        app.input_text = "segunda".to_string();
        assert!(app.submit_question().is_none());

        // Store untouched beyond the first question, no new request payload.
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.input_text, "segunda");
    }

    #[test]
    fn empty_and_whitespace_input_do_nothing() {
        let mut app = test_app();

        app.input_text = String::new();
        assert!(app.submit_question().is_none());

        app.input_text = "   \t ".to_string();
        assert!(app.submit_question().is_none());

        assert!(app.messages.is_empty());
        assert!(!app.sending_message);
    }

    #[test]
    fn chat_failure_substitutes_the_apology_message() {
        let mut app = test_app();
        app.input_text = "¿Interacciones del ibuprofeno?".to_string();
        app.submit_question().unwrap();

        app.apply_chat_result(Err(aborted()));

        assert_eq!(app.messages.len(), 2);
        assert!(!app.messages[1].is_user);
        assert_eq!(app.messages[1].text, CHAT_FALLBACK);
        assert!(!app.sending_message);
        // The failure is absorbed into the conversation, not toasted.
        assert!(app.notification.current().is_none());
    }

    #[test]
    fn train_success_maps_the_server_message_to_a_success_toast() {
        let mut app = test_app();
        assert!(app.begin_training());
        assert!(app.training);

        app.apply_train_result(status("success", "Indexed 12 docs"));

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, "Indexed 12 docs");
        assert_eq!(toast.severity, Severity::Success);
        assert!(!app.training);
    }

    #[test]
    fn train_non_success_status_warns() {
        let mut app = test_app();
        app.begin_training();
        app.apply_train_result(status("skipped", "Nothing to index"));

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.text, "Nothing to index");
    }

    #[test]
    fn train_transport_failure_uses_the_fixed_text() {
        let mut app = test_app();
        app.begin_training();
        app.apply_train_result(Err(aborted()));

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, TRAIN_FALLBACK);
        assert_eq!(toast.severity, Severity::Error);
        assert!(!app.training);
    }

    #[test]
    fn second_train_while_in_flight_is_a_no_op() {
        let mut app = test_app();
        assert!(app.begin_training());
        assert!(!app.begin_training());
    }

    #[test]
    fn upload_without_a_file_warns_and_issues_nothing() {
        let mut app = test_app();

        assert!(app.begin_upload().is_none());

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, NO_FILE_SELECTED);
        assert_eq!(toast.severity, Severity::Warning);
    }

    #[test]
    fn upload_clears_the_selection_on_success_and_on_failure() {
        let mut app = test_app();

        app.pending_upload = Some(PathBuf::from("historia.pdf"));
        app.apply_upload_result(status("success", "Historia clínica cargada en sesión"));
        assert!(app.pending_upload.is_none());
        assert_eq!(
            app.notification.current().unwrap().severity,
            Severity::Success
        );

        // Observed behavior: a transient failure also discards the selection.
        app.pending_upload = Some(PathBuf::from("historia.pdf"));
        app.apply_upload_result(Err(aborted()));
        assert!(app.pending_upload.is_none());

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, UPLOAD_FALLBACK);
        assert_eq!(toast.severity, Severity::Error);
    }

    #[test]
    fn upload_error_status_maps_to_an_error_toast() {
        let mut app = test_app();
        app.pending_upload = Some(PathBuf::from("historia.pdf"));
        app.apply_upload_result(status("error", "Formato no soportado"));

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, "Formato no soportado");
        assert_eq!(toast.severity, Severity::Error);
    }

    #[test]
    fn selecting_a_file_checks_the_extension_filter() {
        let mut app = test_app();

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("historia.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let txt = dir.path().join("notas.txt");
        std::fs::write(&txt, b"hola").unwrap();

        app.select_patient_file(txt);
        assert!(app.pending_upload.is_none());
        assert_eq!(app.notification.current().unwrap().text, UNSUPPORTED_FILE);

        app.select_patient_file(pdf.clone());
        assert_eq!(app.pending_upload.as_deref(), Some(pdf.as_path()));
        assert_eq!(app.notification.current().unwrap().severity, Severity::Info);
    }

    #[test]
    fn selecting_a_missing_file_warns() {
        let mut app = test_app();
        app.select_patient_file(PathBuf::from("/no/such/historia.pdf"));
        assert!(app.pending_upload.is_none());
        assert_eq!(app.notification.current().unwrap().text, FILE_NOT_FOUND);
    }

    #[test]
    fn rapid_failures_leave_only_the_latest_toast() {
        let mut app = test_app();

        app.begin_training();
        app.apply_train_result(Err(aborted()));
        app.pending_upload = Some(PathBuf::from("historia.pdf"));
        app.apply_upload_result(Err(ApiError::Aborted {
            endpoint: "/upload_patient",
        }));

        let toast = app.notification.current().unwrap();
        assert_eq!(toast.text, UPLOAD_FALLBACK);
    }

    #[test]
    fn chat_and_train_guards_are_independent() {
        let mut app = test_app();

        app.input_text = "¿Dosis de amoxicilina?".to_string();
        app.submit_question().unwrap();
        assert!(app.sending_message);

        // A training call may overlap an in-flight chat call.
        assert!(app.begin_training());
        assert!(app.training);

        app.apply_train_result(status("success", "ok"));
        assert!(app.sending_message);
        assert!(!app.training);
    }

    #[tokio::test]
    async fn unreachable_backend_ends_in_the_fallback_answer() {
        let mut app = test_app();
        // Discard port; nothing listens here, so the connection is refused.
        app.client = ApiClient::new("http://127.0.0.1:9");
        app.input_text = "¿Qué dosis de paracetamol?".to_string();

        app.dispatch_chat();
        let task = app.chat_task.take().expect("a request should be in flight");
        let result = task.await.expect("request task should not panic");
        assert!(result.is_err());

        app.apply_chat_result(result);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].text, CHAT_FALLBACK);
        assert!(!app.sending_message);
    }
}

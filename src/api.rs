use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::ChatMessage;

/// Origin of the FarmaAsis backend when neither the config file nor
/// `--backend` says otherwise.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// File types offered for patient uploads. The backend runs its own checks;
/// this list only mirrors the file dialog filter of the desktop build.
pub const ACCEPTED_EXTENSIONS: &[&str] =
    &["pdf", "docx", "doc", "xlsx", "xls", "png", "jpg", "jpeg"];

pub fn is_accepted_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            ACCEPTED_EXTENSIONS.iter().any(|accepted| *accepted == ext)
        })
        .unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable HTTP response (unreachable
    /// backend, broken connection, non-2xx status).
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    /// The response body was not the JSON shape the backend promises.
    #[error("could not decode the {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    /// The selected patient file could not be read before sending.
    #[error("could not read {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The background task driving the request died before settling.
    #[error("the {endpoint} request task did not complete")]
    Aborted { endpoint: &'static str },
}

/// Body of a POST /chat call. `chat_history` holds `[text, role]` pairs and
/// must reflect the conversation as it was before the question was appended
/// locally; the question itself is never part of it.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPayload {
    pub question: String,
    pub chat_history: Vec<(String, String)>,
}

impl ChatPayload {
    pub fn new(question: String, history: &[ChatMessage]) -> Self {
        let chat_history = history
            .iter()
            .map(|msg| {
                let role = if msg.is_user { "user" } else { "assistant" };
                (msg.text.clone(), role.to_string())
            })
            .collect();
        Self {
            question,
            chat_history,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
}

/// Shape shared by /train and /upload_patient responses.
#[derive(Debug, Deserialize)]
pub struct BackendStatus {
    pub status: String,
    pub message: String,
}

impl BackendStatus {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_chat(&self, payload: &ChatPayload) -> Result<ChatAnswer, ApiError> {
        let url = format!("{}/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ApiError::Transport {
                endpoint: "/chat",
                source,
            })?;

        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: "/chat",
            source,
        })
    }

    /// Asks the backend to re-index its knowledge folder. Takes no body.
    pub async fn trigger_train(&self) -> Result<BackendStatus, ApiError> {
        let url = format!("{}/train", self.base_url);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ApiError::Transport {
                endpoint: "/train",
                source,
            })?;

        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: "/train",
            source,
        })
    }

    /// Sends a patient record as multipart form data under the `file` field.
    /// The backend keeps it in the session store only.
    pub async fn upload_patient(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<BackendStatus, ApiError> {
        let url = format!("{}/upload_patient", self.base_url);

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ApiError::Transport {
                endpoint: "/upload_patient",
                source,
            })?;

        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: "/upload_patient",
            source,
        })
    }

    /// Best-effort session cleanup on shutdown. The caller ignores failures.
    pub async fn clear_session(&self) -> Result<(), ApiError> {
        let url = format!("{}/clear_session", self.base_url);

        self.client
            .post(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ApiError::Transport {
                endpoint: "/clear_session",
                source,
            })?;

        Ok(())
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ApiError::Transport {
                endpoint: "/health",
                source,
            })?;

        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: "/health",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(text: &str, is_user: bool) -> ChatMessage {
        ChatMessage {
            text: text.to_string(),
            is_user,
        }
    }

    #[test]
    fn chat_payload_serializes_history_as_pairs() {
        let history = vec![
            msg("¿Qué dosis de paracetamol?", true),
            msg("500mg cada 8 horas", false),
        ];
        let payload = ChatPayload::new("¿Y para niños?".to_string(), &history);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "question": "¿Y para niños?",
                "chat_history": [
                    ["¿Qué dosis de paracetamol?", "user"],
                    ["500mg cada 8 horas", "assistant"],
                ],
            })
        );
    }

    #[test]
    fn chat_payload_with_empty_history() {
        let payload = ChatPayload::new("hola".to_string(), &[]);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["chat_history"], json!([]));
    }

    #[test]
    fn chat_answer_deserializes() {
        let answer: ChatAnswer =
            serde_json::from_str(r#"{"answer": "500mg cada 8 horas"}"#).unwrap();
        assert_eq!(answer.answer, "500mg cada 8 horas");
    }

    #[test]
    fn backend_status_success_flag() {
        let ok: BackendStatus =
            serde_json::from_str(r#"{"status": "success", "message": "Indexed 12 docs"}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.message, "Indexed 12 docs");

        let err: BackendStatus =
            serde_json::from_str(r#"{"status": "error", "message": "no docs"}"#).unwrap();
        assert!(!err.is_success());
    }

    #[test]
    fn accepted_extensions_match_the_file_dialog() {
        assert!(is_accepted_file(Path::new("historia.pdf")));
        assert!(is_accepted_file(Path::new("historia.DOCX")));
        assert!(is_accepted_file(Path::new("/tmp/scan.jpeg")));
        assert!(!is_accepted_file(Path::new("notas.txt")));
        assert!(!is_accepted_file(Path::new("sin_extension")));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}

//! UPAS backend client: import validation, import execution, template and
//! dictionary retrieval, beneficiary search.
//!
//! The transport sits behind the [`UpasApi`] trait so the import session
//! logic can be exercised against a mock that counts calls. The real
//! client wraps `reqwest`, authenticating with a bearer token and decoding
//! the backend's `{ success, data, message }` envelope.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::refdata::Dictionaries;
use crate::retry::RetryPolicy;

/// Row-level validation report for an uploaded file. Server-authoritative:
/// the client never rederives these counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid_rows: u64,
    pub invalid_rows: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Outcome of an executed import. The counts need not sum to the original
/// row count; the backend may filter rows before counting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Headers plus example rows used to generate a downloadable template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportTemplate {
    pub headers: Vec<String>,
    #[serde(default)]
    pub example_rows: Vec<Vec<String>>,
    #[serde(default)]
    pub instructions: String,
}

/// A beneficiary search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficiarySummary {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    #[serde(default)]
    pub telephone: Option<String>,
}

/// Standard response envelope of the backend.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("backend unreachable: {0}")]
    Transport(String),
    /// Non-2xx response, with the best message the body offered.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    /// 2xx response whose body could not be interpreted.
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Transient failures worth retrying: connectivity and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Best-effort human message for a failed response: prefer the structured
/// server message, else a generic one per status family.
fn status_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
    }
    if status.is_client_error() {
        "la requête a été refusée, vérifiez les données envoyées".to_string()
    } else {
        "le serveur est momentanément indisponible, réessayez plus tard".to_string()
    }
}

/// Typed surface of the backend, mockable in tests.
#[async_trait]
pub trait UpasApi: Send + Sync {
    /// Dry-run validation of an import file against a campaign.
    async fn validate_file(
        &self,
        bytes: Vec<u8>,
        filename: String,
        campagne_id: i64,
    ) -> Result<ValidationReport, BackendError>;

    /// Execute the import. `force` bypasses the invalid-row gate server-side.
    async fn import_file(
        &self,
        bytes: Vec<u8>,
        filename: String,
        campagne_id: i64,
        ignore_doublons: bool,
        force: bool,
    ) -> Result<ImportResult, BackendError>;

    async fn fetch_template(&self, campagne_id: i64) -> Result<ImportTemplate, BackendError>;

    async fn fetch_dictionaries(&self) -> Result<Dictionaries, BackendError>;

    async fn search_beneficiaires(
        &self,
        query: String,
    ) -> Result<Vec<BeneficiarySummary>, BackendError>;
}

/// `reqwest`-backed implementation of [`UpasApi`].
#[derive(Clone)]
pub struct UpasClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl UpasClient {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON envelope, retrying transient failures per `policy`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        policy: RetryPolicy,
    ) -> Result<T, BackendError> {
        let mut attempt = 0;
        loop {
            let result = self.get_json_once(path).await;
            match result {
                Err(ref e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!("GET {} failed ({}), retrying in {:?}", path, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Self::decode_envelope(resp).await
    }

    /// POST multipart and decode the envelope. The form is rebuilt per
    /// attempt since `Form` is consumed on send.
    async fn post_multipart<T, F>(
        &self,
        path: &str,
        policy: RetryPolicy,
        build_form: F,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        F: Fn() -> Form,
    {
        let mut attempt = 0;
        loop {
            let resp = self
                .client
                .post(self.url(path))
                .bearer_auth(&self.api_token)
                .multipart(build_form())
                .send()
                .await
                .map_err(|e| BackendError::Transport(e.to_string()));

            let result = match resp {
                Ok(resp) => Self::decode_envelope(resp).await,
                Err(e) => Err(e),
            };

            match result {
                Err(ref e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!("POST {} failed ({}), retrying in {:?}", path, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn decode_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: status_message(status, &body),
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("{e}: {}", truncate(&body, 200))))?;

        if !envelope.success {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "le serveur a signalé un échec".to_string()),
            });
        }

        envelope
            .data
            .ok_or_else(|| BackendError::Decode("envelope has no data".to_string()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn file_part(bytes: Vec<u8>, filename: String) -> Part {
    Part::bytes(bytes).file_name(filename)
}

#[async_trait]
impl UpasApi for UpasClient {
    async fn validate_file(
        &self,
        bytes: Vec<u8>,
        filename: String,
        campagne_id: i64,
    ) -> Result<ValidationReport, BackendError> {
        info!(
            "Validating import file {} ({} bytes) against campaign {}",
            filename,
            bytes.len(),
            campagne_id
        );
        let report: ValidationReport = self
            .post_multipart("/import/validate", RetryPolicy::interactive(), || {
                Form::new()
                    .part("file", file_part(bytes.clone(), filename.clone()))
                    .text("campagne_id", campagne_id.to_string())
            })
            .await?;
        debug!(
            "Validation report: {} valid, {} invalid",
            report.valid_rows, report.invalid_rows
        );
        Ok(report)
    }

    async fn import_file(
        &self,
        bytes: Vec<u8>,
        filename: String,
        campagne_id: i64,
        ignore_doublons: bool,
        force: bool,
    ) -> Result<ImportResult, BackendError> {
        info!(
            "Importing file {} into campaign {} (ignore_doublons={}, force={})",
            filename, campagne_id, ignore_doublons, force
        );
        // Imports are not idempotent: never retried.
        self.post_multipart("/import/import", RetryPolicy::none(), || {
            let mut form = Form::new()
                .part("file", file_part(bytes.clone(), filename.clone()))
                .text("campagne_id", campagne_id.to_string())
                .text("ignore_doublons", ignore_doublons.to_string());
            if force {
                form = form.text("force_import", "true");
            }
            form
        })
        .await
    }

    async fn fetch_template(&self, campagne_id: i64) -> Result<ImportTemplate, BackendError> {
        self.get_json(
            &format!("/import/template?campagne_id={campagne_id}"),
            RetryPolicy::interactive(),
        )
        .await
    }

    async fn fetch_dictionaries(&self) -> Result<Dictionaries, BackendError> {
        self.get_json("/dictionaries", RetryPolicy::interactive())
            .await
    }

    async fn search_beneficiaires(
        &self,
        query: String,
    ) -> Result<Vec<BeneficiarySummary>, BackendError> {
        let url = reqwest::Url::parse_with_params(
            &self.url("/beneficiaires/search"),
            &[("q", query.as_str())],
        )
        .map_err(|e| BackendError::Transport(e.to_string()))?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode_envelope(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_prefers_server_message() {
        let msg = status_message(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"campagne inconnue"}"#,
        );
        assert_eq!(msg, "campagne inconnue");
    }

    #[test]
    fn test_status_message_falls_back_per_family() {
        let client = status_message(StatusCode::UNPROCESSABLE_ENTITY, "not json");
        assert!(client.contains("refusée"));
        let server = status_message(StatusCode::BAD_GATEWAY, "");
        assert!(server.contains("indisponible"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Transport("timeout".into()).is_transient());
        assert!(BackendError::Status { status: 503, message: String::new() }.is_transient());
        assert!(!BackendError::Status { status: 422, message: String::new() }.is_transient());
        assert!(!BackendError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn test_validation_report_decodes_with_defaults() {
        let report: ValidationReport =
            serde_json::from_str(r#"{"valid_rows":3,"invalid_rows":0}"#).unwrap();
        assert_eq!(report.valid_rows, 3);
        assert!(report.errors.is_empty());
    }
}

//! HTTP client for the campaign phase API.

use std::time::Duration;

use async_trait::async_trait;
use campaign_core::{AppConfig, BuilderError, BuilderResult};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::persistence::{ActivityPayload, PersistenceClient, PhasePayload, SavedRecord};
use crate::routes;
use crate::types::Phase;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const COMPANY_ID_HEADER: &str = "X-Company-Id";

/// REST client scoped to one campaign. The session headers are attached
/// once, as default headers, and ride along on every call.
pub struct HttpPersistenceClient {
    root: String,
    client: Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhaseList {
    Bare(Vec<Phase>),
    Wrapped { phases: Vec<Phase> },
}

impl HttpPersistenceClient {
    pub fn new(config: &AppConfig, campaign_id: i64) -> BuilderResult<Self> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in [
            (AUTH_TOKEN_HEADER, &config.auth.token),
            (USER_EMAIL_HEADER, &config.auth.email),
            (COMPANY_ID_HEADER, &config.auth.company_id),
        ] {
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| BuilderError::Config(format!("invalid {} header: {}", name, e)))?;
            headers.insert(name, value);
        }
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .map_err(|e| BuilderError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            root: config.campaign_root(campaign_id),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> BuilderResult<T> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BuilderError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BuilderError::Rejected {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }
        response.json().await.map_err(transport)
    }

    /// DELETE calls. A 404 means the record is already gone, which is what
    /// the caller wanted.
    async fn send_delete(&self, path: &str) -> BuilderResult<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, "delete target already gone");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BuilderError::Rejected {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }
        Ok(())
    }
}

fn transport(e: reqwest::Error) -> BuilderError {
    BuilderError::Transport(e.to_string())
}

/// Pulls a readable validation message out of an error body. Understands
/// `{"errors": {"field": ["msg"]}}`, `{"errors": ["msg"]}` and
/// `{"error": "msg"}`; anything else is passed through verbatim.
pub fn server_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
        return message.to_string();
    }
    match value.get("errors") {
        Some(serde_json::Value::Object(fields)) => fields
            .iter()
            .flat_map(|(field, messages)| {
                let messages: Vec<String> = match messages {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .filter_map(|m| m.as_str())
                        .map(|m| format!("{} {}", field, m))
                        .collect(),
                    serde_json::Value::String(m) => vec![format!("{} {}", field, m)],
                    _ => Vec::new(),
                };
                messages
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistenceClient {
    async fn list_phases(&self) -> BuilderResult<Vec<Phase>> {
        let list: PhaseList = self
            .send_json(self.client.get(self.url(&routes::phases())))
            .await?;
        Ok(match list {
            PhaseList::Bare(phases) | PhaseList::Wrapped { phases } => phases,
        })
    }

    async fn create_phase(&self, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
        self.send_json(self.client.post(self.url(&routes::phases())).json(payload))
            .await
    }

    async fn update_phase(&self, phase_id: i64, payload: &PhasePayload) -> BuilderResult<SavedRecord> {
        self.send_json(self.client.put(self.url(&routes::phase(phase_id))).json(payload))
            .await
    }

    async fn delete_phase(&self, phase_id: i64) -> BuilderResult<()> {
        self.send_delete(&routes::phase(phase_id)).await
    }

    async fn delete_phase_condition(&self, phase_id: i64, condition_id: i64) -> BuilderResult<()> {
        self.send_delete(&routes::phase_condition(phase_id, condition_id))
            .await
    }

    async fn create_activity(&self, phase_id: i64, payload: &ActivityPayload) -> BuilderResult<SavedRecord> {
        self.send_json(
            self.client
                .post(self.url(&routes::phase_activities(phase_id)))
                .json(payload),
        )
        .await
    }

    async fn update_activity(
        &self,
        phase_id: i64,
        activity_id: i64,
        payload: &ActivityPayload,
    ) -> BuilderResult<SavedRecord> {
        self.send_json(
            self.client
                .put(self.url(&routes::phase_activity(phase_id, activity_id)))
                .json(payload),
        )
        .await
    }

    async fn delete_activity(&self, phase_id: i64, activity_id: i64) -> BuilderResult<()> {
        self.send_delete(&routes::phase_activity(phase_id, activity_id))
            .await
    }

    async fn delete_activity_condition(
        &self,
        phase_id: i64,
        activity_id: i64,
        condition_id: i64,
    ) -> BuilderResult<()> {
        self.send_delete(&routes::phase_activity_condition(
            phase_id,
            activity_id,
            condition_id,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_field_errors() {
        let body = r#"{"errors": {"name": ["can't be blank"], "order": ["must be positive"]}}"#;
        assert_eq!(
            server_message(body),
            "name can't be blank, order must be positive"
        );
    }

    #[test]
    fn test_server_message_variants() {
        assert_eq!(server_message(r#"{"error": "Forbidden"}"#), "Forbidden");
        assert_eq!(
            server_message(r#"{"errors": ["Activity has already been taken"]}"#),
            "Activity has already been taken"
        );
        assert_eq!(server_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_rejects_unprintable_header_values() {
        let mut config = AppConfig::default();
        config.auth.token = "bad\ntoken".into();
        assert!(matches!(
            HttpPersistenceClient::new(&config, 1),
            Err(BuilderError::Config(_))
        ));
    }
}

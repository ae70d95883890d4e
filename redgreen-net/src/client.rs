use super::wire::{
    self, ErrorBody, KeyNames, LoadRequest, SaveRequest, SessionRequest, TimeoutStatus,
};
use super::NetError;
use redgreen_core::{LoadOutcome, TrialResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// The three backend calls the runtime makes.
pub trait Backend: Send + 'static {
    fn load_next_scene(
        &self,
        session_id: &str,
        resume_from_trial: Option<u32>,
    ) -> Result<LoadOutcome, NetError>;

    /// Returns the trial score.
    fn save_data(&self, session_id: &str, result: &TrialResult) -> Result<f64, NetError>;

    fn check_timeout(&self, session_id: &str) -> Result<TimeoutStatus, NetError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Sends `ngrok-skip-browser-warning: true` with every request.
    pub skip_browser_warning: bool,
    pub request_timeout_secs: u64,
    /// Report keys as `f`/`j` instead of `red`/`green`.
    pub legacy_key_names: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            user_agent: "redgreen-runtime".to_string(),
            skip_browser_warning: true,
            request_timeout_secs: 10,
            legacy_key_names: false,
        }
    }
}

impl ClientConfig {
    pub fn key_names(&self) -> KeyNames {
        if self.legacy_key_names {
            KeyNames::Legacy
        } else {
            KeyNames::Color
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| NetError::Transport {
                endpoint: "",
                source,
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn post<T: Serialize>(
        &self,
        endpoint: &'static str,
        body: &T,
    ) -> Result<(u16, String), NetError> {
        let mut request = self.client.post(self.url(endpoint)).json(body);
        if self.config.skip_browser_warning {
            request = request.header("ngrok-skip-browser-warning", "true");
        }
        let response = request
            .send()
            .map_err(|source| NetError::Transport { endpoint, source })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|source| NetError::Transport { endpoint, source })?;
        debug!("/{endpoint} -> {status} ({} bytes)", text.len());
        Ok((status, text))
    }

    fn post_ok<T: Serialize>(&self, endpoint: &'static str, body: &T) -> Result<String, NetError> {
        let (status, text) = self.post(endpoint, body)?;
        if (200..300).contains(&status) {
            return Ok(text);
        }
        let err = ErrorBody::parse(&text);
        error!("backend error from /{endpoint} ({status}): {}", err.error);
        Err(NetError::Status {
            endpoint,
            status,
            message: err.error,
        })
    }
}

impl Backend for HttpBackend {
    fn load_next_scene(
        &self,
        session_id: &str,
        resume_from_trial: Option<u32>,
    ) -> Result<LoadOutcome, NetError> {
        let body = LoadRequest {
            session_id,
            resume_from_trial,
        };
        let text = self.post_ok(wire::LOAD_ENDPOINT, &body)?;
        wire::parse_load_response(&text)
    }

    fn save_data(&self, session_id: &str, result: &TrialResult) -> Result<f64, NetError> {
        let body = SaveRequest::new(session_id, result, self.config.key_names());
        let text = self.post_ok(wire::SAVE_ENDPOINT, &body)?;
        wire::parse_save_response(&text)
    }

    fn check_timeout(&self, session_id: &str) -> Result<TimeoutStatus, NetError> {
        let (status, text) = self.post(wire::TIMEOUT_ENDPOINT, &SessionRequest { session_id })?;
        wire::parse_timeout_response(status, &text)
    }
}

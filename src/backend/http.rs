use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use serde::Deserialize;

use super::{
    ByteStream, ChatBackend, ChatTurnRequest, SessionDetail, SessionList,
};
use crate::util::errors::{ChatError, ChatResult};

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the REST backend, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// Isolation id sent with every turn so the backend can scope sessions.
    pub client_id: Option<String>,
}

pub struct HttpChatBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpChatBackend {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn open_chat(&self, request: &ChatTurnRequest) -> ChatResult<ByteStream> {
        let mut body = request.clone();
        if body.client_id.is_none() {
            body.client_id = self.config.client_id.clone();
        }
        debug!("Opening chat stream: session_id={}", body.session_id);

        let response = self
            .client
            .post(self.url("/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed())
    }

    async fn generate_title(&self, message: &str) -> ChatResult<String> {
        #[derive(Deserialize)]
        struct TitleResponse {
            title: String,
        }
        let response = self
            .client
            .post(self.url("/sessions/generate-title"))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: TitleResponse = response.json().await?;
        Ok(parsed.title)
    }

    async fn list_sessions(&self) -> ChatResult<SessionList> {
        let mut request = self.client.get(self.url("/sessions"));
        if let Some(client_id) = &self.config.client_id {
            request = request.query(&[("client_id", client_id)]);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn session_detail(&self, session_id: &str) -> ChatResult<SessionDetail> {
        let response = self
            .client
            .get(self.url(&format!("/sessions/{}", session_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn create_session(&self) -> ChatResult<String> {
        #[derive(Deserialize)]
        struct CreateResponse {
            session_id: String,
        }
        let response = self
            .client
            .post(self.url("/sessions"))
            .json(&serde_json::json!({ "client_id": self.config.client_id }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: CreateResponse = response.json().await?;
        Ok(parsed.session_id)
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> ChatResult<()> {
        self.client
            .put(self.url(&format!("/sessions/{}", session_id)))
            .query(&[("title", title)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> ChatResult<()> {
        self.client
            .delete(self.url(&format!("/sessions/{}", session_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

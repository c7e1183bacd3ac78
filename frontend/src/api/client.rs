use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{
    api::types::*,
    auth::{
        coordinator::{RefreshError, RefreshTransport},
        tokens::TokenPair,
    },
    config::ClientConfig,
};

/// HTTP client for the `/auth/*` endpoints. Keeps a cookie jar so the
/// `sessionId` cookie set at login rides along on heartbeat and logout.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::request_failed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        Self::parse(response).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        Self::parse(response).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/auth/heartbeat"))
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        Self::parse(response).await
    }

    pub async fn current_session(&self, access_token: &str) -> Result<SessionSnapshot, ApiError> {
        let response = self
            .client
            .get(self.url("/auth/session"))
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ApiError::unknown(format!("Failed to parse response: {}", e)))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: Response) -> ApiError {
        let status = response.status().as_u16();
        match response.json::<ApiError>().await {
            Ok(error) => error.with_status(status),
            Err(_) => ApiError::from_status(status),
        }
    }
}

#[async_trait]
impl RefreshTransport for ApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        match self.refresh_token(refresh_token).await {
            Ok(response) => Ok(response.into()),
            Err(error) if error.is_request_failure() => Err(RefreshError::NetworkError(error.error)),
            Err(error) if error.is_client_error() => {
                log::debug!("Refresh rejected by server: {}", error);
                Err(RefreshError::InvalidRefreshToken)
            }
            Err(error) => Err(RefreshError::ServerError(error.error)),
        }
    }
}

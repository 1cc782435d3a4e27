//! Typed calls for the dashboard pages, built on `authorized_request`.
//!
//! Every call goes through [`AuthorizedHttpClient`]; this layer only shapes
//! requests and turns non-success answers into [`ApiError`]s.

use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, ApiRequest, AuthorizedHttpClient};
use crate::auth::Identity;
use crate::models::account::{EmailUpdate, NotificationPreference, ThemePreference, UsernameUpdate};
use crate::models::agent::AgentQuery;
use crate::models::portfolio::AddHoldingRequest;
use crate::models::{
    AgentReply, CurrentUser, MessageResponse, Portfolio, PortfolioItem, SearchSuggestion,
    StockQuote,
};

#[derive(Clone)]
pub struct DashboardApi {
    client: AuthorizedHttpClient,
}

impl DashboardApi {
    pub fn new(client: AuthorizedHttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthorizedHttpClient {
        &self.client
    }

    /// Signed-in identity, or `Unauthorized` when the session has none.
    pub async fn require_identity(&self) -> Result<Identity, ApiError> {
        self.client.identity().await.ok_or(ApiError::Unauthorized)
    }

    // ===== Portfolio =====

    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio, ApiError> {
        let url = format!("/portfolio/{}", urlencoding::encode(user_id));
        self.fetch(ApiRequest::get(url)).await
    }

    /// Add a position; the backend merges it with an existing one.
    pub async fn add_holding(
        &self,
        user_id: &str,
        symbol: &str,
        quantity: f64,
        buy_price: f64,
    ) -> Result<PortfolioItem, ApiError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ApiError::InvalidRequest("symbol is empty".into()));
        }
        if !quantity.is_finite() || quantity <= 0.0 || !buy_price.is_finite() || buy_price < 0.0 {
            return Err(ApiError::InvalidRequest(
                "quantity must be positive and price non-negative".into(),
            ));
        }

        let url = format!("/portfolio/{}/holdings", urlencoding::encode(user_id));
        let request = ApiRequest::post(url).json(&AddHoldingRequest {
            symbol: &symbol,
            quantity,
            buy_price,
        })?;
        self.fetch(request).await
    }

    pub async fn remove_holding(&self, user_id: &str, symbol: &str) -> Result<(), ApiError> {
        let url = format!(
            "/portfolio/{}/holdings/{}",
            urlencoding::encode(user_id),
            urlencoding::encode(&symbol.trim().to_uppercase())
        );
        self.execute(ApiRequest::delete(url)).await?;
        Ok(())
    }

    // ===== Market data =====

    pub async fn quote(&self, symbol: &str) -> Result<StockQuote, ApiError> {
        let url = format!("/stocks/{}", urlencoding::encode(symbol.trim()));
        self.fetch(ApiRequest::get(url)).await
    }

    /// Autocomplete search. A blank query sends nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchSuggestion>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("/search?query={}", urlencoding::encode(query));
        self.fetch(ApiRequest::get(url)).await
    }

    // ===== Agent =====

    pub async fn ask_agent(&self, prompt: &str) -> Result<AgentReply, ApiError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::InvalidRequest("prompt is empty".into()));
        }
        let request = ApiRequest::post("/agent/query").json(&AgentQuery { prompt })?;
        self.fetch(request).await
    }

    // ===== Account & settings =====

    pub async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.fetch(ApiRequest::get("/auth/me")).await
    }

    pub async fn update_username(&self, username: &str) -> Result<MessageResponse, ApiError> {
        let request =
            ApiRequest::post("/auth/update-username").json(&UsernameUpdate { username })?;
        self.fetch(request).await
    }

    pub async fn update_email(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let request = ApiRequest::post("/auth/update-email").json(&EmailUpdate { email })?;
        self.fetch(request).await
    }

    pub async fn set_theme(&self, user_id: &str, theme: &str) -> Result<MessageResponse, ApiError> {
        let url = format!("/users/{}/preferences/theme", urlencoding::encode(user_id));
        let request = ApiRequest::post(url).json(&ThemePreference { theme })?;
        self.fetch(request).await
    }

    pub async fn set_notifications(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<MessageResponse, ApiError> {
        let url = format!(
            "/users/{}/preferences/notifications",
            urlencoding::encode(user_id)
        );
        let request = ApiRequest::post(url).json(&NotificationPreference { enabled })?;
        self.fetch(request).await
    }

    pub async fn delete_account(&self) -> Result<MessageResponse, ApiError> {
        self.fetch(ApiRequest::post("/auth/delete-account")).await
    }

    // ===== Helpers =====

    /// Run the request and require a success status.
    async fn execute(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let outcome = self.client.authorized_request(request).await?;
        Self::check_response(outcome.into_response()).await
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let url = request.url().to_string();
        let response = self.execute(request).await?;
        let text = response.text().await?;
        debug!(url = %url, bytes = text.len(), "Response received");
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

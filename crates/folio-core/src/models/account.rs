use serde::{Deserialize, Serialize};

/// `GET /auth/me` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Acknowledgement body used by the account and preference endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UsernameUpdate<'a> {
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmailUpdate<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ThemePreference<'a> {
    pub theme: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NotificationPreference {
    pub enabled: bool,
}

//! Credential and token payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The session credential persisted between runs.
///
/// Serialized with the persisted keys `accessToken`, `refreshToken`,
/// `userId` and `userInfo`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Bearer token attached to every request.
    pub access_token: String,
    /// Token exchanged at the refresh endpoint for a new pair.
    #[serde(default)]
    pub refresh_token: String,
    /// Identifier of the logged-in user.
    #[serde(default)]
    pub user_id: i64,
    /// Opaque user profile as returned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, user_id: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id,
            user_info: None,
        }
    }

    /// Attach a user profile.
    pub fn with_user_info(mut self, info: Value) -> Self {
        self.user_info = Some(info);
        self
    }

    /// Build the credential from a login payload; the user id is taken from `userInfo.id`.
    pub fn from_login(response: LoginResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::Decode("login response does not contain accessToken".into()));
        }
        let user_id = response
            .user_info
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Decode("login response does not contain userInfo.id".into()))?;

        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user_id,
            user_info: Some(response.user_info),
        })
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("has_user_info", &self.user_info.is_some())
            .finish()
    }
}

/// Payload of a successful `POST /auth/refresh`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

/// Payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user_info: Value,
}

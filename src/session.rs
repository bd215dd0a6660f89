//! Login, logout and current-user operations.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::credential::{Credential, LoginResponse};
use crate::client::Client;
use crate::envelope::Outcome;
use crate::error::{Error, Result};
use crate::net::RequestDescriptor;

pub const LOGIN_PATH: &str = "/auth/login";
pub const WX_LOGIN_PATH: &str = "/auth/wx-login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CURRENT_USER_PATH: &str = "/auth/me";

impl Client {
    /// Log in with a username and password and store the new session.
    ///
    /// Returns the stored credential. A rejected login is a
    /// [`Error::Business`] and leaves any existing session untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential> {
        let request = RequestDescriptor::post(
            LOGIN_PATH,
            json!({ "username": username, "password": password }),
        );
        self.establish_session(request).await
    }

    /// Log in with a WeChat mini-program authorization code.
    pub async fn wx_login(&self, code: &str) -> Result<Credential> {
        let request = RequestDescriptor::post(WX_LOGIN_PATH, json!({ "code": code }));
        self.establish_session(request).await
    }

    /// End the session.
    ///
    /// The server is told first, best effort; the local credential is cleared
    /// whatever the server answers.
    pub async fn logout(&self) -> Result<()> {
        if self.credentials().access_token().is_some() {
            match self.send_quiet(&RequestDescriptor::new(reqwest::Method::POST, LOGOUT_PATH)).await {
                Outcome::Success(_) => {}
                other => warn!(
                    outcome = other.kind(),
                    message = other.message(),
                    "Server-side logout failed, clearing local session anyway"
                ),
            }
        }
        self.credentials().clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Fetch the current user's profile and store it alongside the session.
    pub async fn current_user(&self) -> Result<Value> {
        let info = self.get(CURRENT_USER_PATH).await?;
        if !info.is_object() {
            return Err(Error::Decode(format!(
                "Unexpected payload from {}: expected an object",
                CURRENT_USER_PATH
            )));
        }
        self.credentials().update_user_info(info.clone())?;
        Ok(info)
    }

    /// Whether a session with an access token and a user id is stored.
    pub fn is_logged_in(&self) -> bool {
        self.credentials()
            .read()
            .is_some_and(|c| !c.access_token.is_empty() && c.user_id != 0)
    }

    async fn establish_session(&self, request: RequestDescriptor) -> Result<Credential> {
        let path = request.path.clone();
        let data = self.send_unauthenticated(request).await?;
        let response: LoginResponse = serde_json::from_value(data)
            .map_err(|e| Error::Decode(format!("Unexpected payload from {}: {}", path, e)))?;

        let credential = Credential::from_login(response)?;
        self.credentials().write(credential.clone())?;
        info!(user_id = credential.user_id, path = path.as_str(), "Logged in");
        Ok(credential)
    }
}

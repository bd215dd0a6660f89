//! Response envelope classification.
//!
//! Every kin API response body is expected to follow the
//! `{ "code": integer, "message": string, "data": any }` envelope. This module
//! turns a raw transport outcome into exactly one [`Outcome`].
//!
//! Rules:
//! - A valid envelope is authoritative. Code 200 on a 2xx status is success,
//!   401 and 403 are auth failures, anything else is a business error.
//! - Without a usable envelope, transport status 401/403 decides the auth
//!   failures and everything else is a transport error.

use serde::Deserialize;
use serde_json::Value;

/// Envelope code for success.
pub const SUCCESS_CODE: i64 = 200;

/// Envelope code for an expired or missing session.
pub const UNAUTHORIZED_CODE: i64 = 401;

/// Envelope code for insufficient privilege.
pub const FORBIDDEN_CODE: i64 = 403;

/// Generic message for transport failures.
pub const DEFAULT_NETWORK_ERROR: &str = "Network error, please try again later";

/// Fallback message for business errors without a message.
pub const DEFAULT_REQUEST_FAILED: &str = "Request failed";

/// Fallback message for 401 responses.
pub const DEFAULT_AUTH_EXPIRED: &str = "Not authorized, please log in again";

/// Fallback message for 403 responses.
pub const DEFAULT_FORBIDDEN: &str = "Access denied, please log in again";

/// Error kinds that end the session regardless of the envelope code.
const SESSION_ENDING_KINDS: &[&str] = &["account_locked", "account_disabled"];

/// The `{code, message, data}` wrapper every response body follows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    /// Message field used by older servers; read when `message` is blank.
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
    /// Explicit error kind set by the server for account-level failures.
    #[serde(default)]
    pub error_kind: Option<String>,
}

impl Envelope {
    /// Whether the server flagged this error as ending the session.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        self.code != SUCCESS_CODE
            && self
                .error_kind
                .as_deref()
                .is_some_and(|kind| SESSION_ENDING_KINDS.contains(&kind))
    }

    fn message_or(&self, fallback: &str) -> String {
        [self.message.as_deref(), self.msg.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// What the transport observed for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// A response arrived. `body` is `None` when it was empty or not JSON.
    Received { status: u16, body: Option<Value> },
    /// No response arrived.
    Failed { message: Option<String> },
}

impl RawResponse {
    /// Convenience constructor for a JSON response.
    pub fn json(status: u16, body: Value) -> Self {
        Self::Received {
            status,
            body: Some(body),
        }
    }

    /// Convenience constructor for a response without a usable body.
    pub fn empty(status: u16) -> Self {
        Self::Received { status, body: None }
    }
}

/// Classified result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    BusinessError { code: i64, message: String },
    AuthExpired(String),
    Forbidden(String),
    TransportError(String),
}

impl Outcome {
    /// Human-readable message, empty for success.
    pub fn message(&self) -> &str {
        match self {
            Self::Success(_) => "",
            Self::BusinessError { message, .. }
            | Self::AuthExpired(message)
            | Self::Forbidden(message)
            | Self::TransportError(message) => message,
        }
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::BusinessError { .. } => "business_error",
            Self::AuthExpired(_) => "auth_expired",
            Self::Forbidden(_) => "forbidden",
            Self::TransportError(_) => "transport_error",
        }
    }
}

/// Classify a raw transport outcome.
pub fn classify(raw: RawResponse) -> Outcome {
    let (status, body) = match raw {
        RawResponse::Failed { message } => {
            let message = message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NETWORK_ERROR.to_string());
            return Outcome::TransportError(message);
        }
        RawResponse::Received { status, body } => (status, body),
    };

    match body.and_then(|b| serde_json::from_value::<Envelope>(b).ok()) {
        Some(envelope) => classify_envelope(status, envelope),
        None => match status {
            401 => Outcome::AuthExpired(DEFAULT_AUTH_EXPIRED.to_string()),
            403 => Outcome::Forbidden(DEFAULT_FORBIDDEN.to_string()),
            _ => Outcome::TransportError(DEFAULT_NETWORK_ERROR.to_string()),
        },
    }
}

fn classify_envelope(status: u16, envelope: Envelope) -> Outcome {
    if envelope.ends_session() {
        return Outcome::Forbidden(envelope.message_or(DEFAULT_FORBIDDEN));
    }

    match envelope.code {
        UNAUTHORIZED_CODE => Outcome::AuthExpired(envelope.message_or(DEFAULT_AUTH_EXPIRED)),
        FORBIDDEN_CODE => Outcome::Forbidden(envelope.message_or(DEFAULT_FORBIDDEN)),
        SUCCESS_CODE if (200..300).contains(&status) => Outcome::Success(envelope.data),
        // A success envelope on an error status is not trustworthy.
        SUCCESS_CODE => Outcome::TransportError(DEFAULT_NETWORK_ERROR.to_string()),
        code => Outcome::BusinessError {
            code,
            message: envelope.message_or(DEFAULT_REQUEST_FAILED),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_success_payload() {
        let raw = RawResponse::json(200, json!({"code": 200, "data": {"id": 1}}));
        assert_eq!(classify(raw), Outcome::Success(json!({"id": 1})));
    }

    #[test]
    fn test_success_without_data_is_null() {
        let raw = RawResponse::json(200, json!({"code": 200, "message": "success"}));
        assert_eq!(classify(raw), Outcome::Success(Value::Null));
    }

    #[test]
    fn test_business_error() {
        let raw = RawResponse::json(200, json!({"code": 500, "message": "boom"}));
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 500, message: "boom".into() }
        );
    }

    #[test]
    fn test_legacy_msg_field() {
        let raw = RawResponse::json(200, json!({"code": 500, "msg": "Family not found"}));
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 500, message: "Family not found".into() }
        );

        let raw = RawResponse::json(200, json!({"code": 403, "message": "No access", "msg": "old"}));
        assert_eq!(classify(raw), Outcome::Forbidden("No access".into()));
    }

    #[test]
    fn test_business_error_default_message() {
        let raw = RawResponse::json(200, json!({"code": 4001, "message": "  "}));
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 4001, message: DEFAULT_REQUEST_FAILED.into() }
        );
    }

    #[test]
    fn test_status_401_without_body() {
        assert_eq!(
            classify(RawResponse::empty(401)),
            Outcome::AuthExpired(DEFAULT_AUTH_EXPIRED.into())
        );
        assert_eq!(
            classify(RawResponse::Received { status: 401, body: Some(json!("unauthorized")) }),
            Outcome::AuthExpired(DEFAULT_AUTH_EXPIRED.into())
        );
    }

    #[test]
    fn test_status_403_without_body() {
        assert_eq!(
            classify(RawResponse::empty(403)),
            Outcome::Forbidden(DEFAULT_FORBIDDEN.into())
        );
    }

    #[test]
    fn test_envelope_codes_for_auth() {
        let raw = RawResponse::json(200, json!({"code": 401, "message": "token expired"}));
        assert_eq!(classify(raw), Outcome::AuthExpired("token expired".into()));

        let raw = RawResponse::json(200, json!({"code": 403, "message": "admins only"}));
        assert_eq!(classify(raw), Outcome::Forbidden("admins only".into()));
    }

    #[test]
    fn test_envelope_code_beats_status() {
        // Status says 401 but the envelope carries a business code.
        let raw = RawResponse::json(401, json!({"code": 4002, "message": "family not found"}));
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 4002, message: "family not found".into() }
        );

        // Status says 200 but the envelope says 403.
        let raw = RawResponse::json(200, json!({"code": 403}));
        assert_eq!(classify(raw), Outcome::Forbidden(DEFAULT_FORBIDDEN.into()));
    }

    #[test]
    fn test_success_code_on_error_status() {
        let raw = RawResponse::json(502, json!({"code": 200, "data": {}}));
        assert_eq!(
            classify(raw),
            Outcome::TransportError(DEFAULT_NETWORK_ERROR.into())
        );
    }

    #[test]
    fn test_error_status_with_business_envelope() {
        let raw = RawResponse::json(500, json!({"code": 500, "message": "System busy"}));
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 500, message: "System busy".into() }
        );
    }

    #[test]
    fn test_transport_failure() {
        let raw = RawResponse::Failed { message: Some("connection refused".into()) };
        assert_eq!(classify(raw), Outcome::TransportError("connection refused".into()));

        let raw = RawResponse::Failed { message: None };
        assert_eq!(classify(raw), Outcome::TransportError(DEFAULT_NETWORK_ERROR.into()));
    }

    #[test]
    fn test_malformed_body_on_ok_status() {
        let raw = RawResponse::json(200, json!({"data": {"id": 1}}));
        assert_eq!(classify(raw), Outcome::TransportError(DEFAULT_NETWORK_ERROR.into()));
        assert_eq!(
            classify(RawResponse::empty(200)),
            Outcome::TransportError(DEFAULT_NETWORK_ERROR.into())
        );
    }

    #[test]
    fn test_error_kind_ends_session() {
        let raw = RawResponse::json(
            200,
            json!({"code": 4003, "message": "Account locked", "errorKind": "account_locked"}),
        );
        assert_eq!(classify(raw), Outcome::Forbidden("Account locked".into()));

        let raw = RawResponse::json(
            200,
            json!({"code": 4003, "message": "Account disabled", "errorKind": "account_disabled"}),
        );
        assert_eq!(classify(raw), Outcome::Forbidden("Account disabled".into()));
    }

    #[test]
    fn test_message_text_is_not_inspected() {
        let raw = RawResponse::json(
            200,
            json!({"code": 4003, "message": "Your account has been locked"}),
        );
        assert_eq!(
            classify(raw),
            Outcome::BusinessError { code: 4003, message: "Your account has been locked".into() }
        );

        let raw = RawResponse::json(
            200,
            json!({"code": 4003, "message": "Quota reached", "errorKind": "quota"}),
        );
        assert!(matches!(classify(raw), Outcome::BusinessError { code: 4003, .. }));
    }

    proptest! {
        #[test]
        fn prop_application_codes_are_business_errors(
            status in prop_oneof![Just(200u16), 201u16..300, 400u16..600],
            code in any::<i64>().prop_filter("reserved", |c| ![200, 401, 403].contains(c)),
            message in "[a-z]{1,16}",
        ) {
            let raw = RawResponse::json(status, json!({"code": code, "message": message.clone()}));
            prop_assert_eq!(classify(raw), Outcome::BusinessError { code, message });
        }

        #[test]
        fn prop_missing_body_is_transport_error_unless_auth_status(status in 100u16..600) {
            prop_assume!(status != 401 && status != 403);
            let outcome = classify(RawResponse::empty(status));
            prop_assert_eq!(outcome, Outcome::TransportError(DEFAULT_NETWORK_ERROR.into()));
        }

        #[test]
        fn prop_envelope_auth_codes_ignore_status(status in 100u16..600) {
            let expired = classify(RawResponse::json(status, json!({"code": 401})));
            prop_assert_eq!(expired.kind(), "auth_expired");
            let forbidden = classify(RawResponse::json(status, json!({"code": 403})));
            prop_assert_eq!(forbidden.kind(), "forbidden");
        }
    }
}

//! Request header construction.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use uuid::Uuid;

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the headers for one kin API request.
///
/// `access_token` is attached as a bearer token when present. A token that
/// is not a valid header value is dropped rather than sent mangled; the
/// server then answers 401 and the refresh path takes over.
pub fn api_headers(access_token: Option<&str>, has_body: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if has_body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    headers.insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("00000000-0000-0000-0000-000000000000")),
    );

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_attached() {
        let headers = api_headers(Some("tok"), true);
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(headers.contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn test_no_token_no_authorization() {
        let headers = api_headers(None, false);
        assert!(!headers.contains_key(AUTHORIZATION));
        assert!(!headers.contains_key(CONTENT_TYPE));

        let headers = api_headers(Some(""), false);
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_request_ids_differ() {
        let a = api_headers(None, false);
        let b = api_headers(None, false);
        assert_ne!(a[REQUEST_ID_HEADER], b[REQUEST_ID_HEADER]);
    }

    #[test]
    fn test_no_user_id_header() {
        let headers = api_headers(Some("tok"), false);
        assert!(!headers.contains_key("x-user-id"));
    }
}

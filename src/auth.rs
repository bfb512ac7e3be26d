use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::ApiError;

/// Checks the bearer token when an API key is configured; without one every
/// request is allowed.
pub fn verify_bearer(headers: &HeaderMap, expected_key: Option<&str>) -> Result<(), ApiError> {
    let Some(expected_key) = expected_key else {
        return Ok(());
    };

    let token = extract_bearer_token(headers)?;
    if token.trim() != expected_key {
        return Err(ApiError::unauthorized("Invalid API key"));
    }

    Ok(())
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(ApiError::unauthorized("Missing Authorization header"));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(ApiError::unauthorized("Invalid Authorization header"));
    };

    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized("Authorization must use Bearer token"));
    };

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn open_when_no_key_is_configured() {
        assert!(verify_bearer(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn key_must_match() {
        assert!(verify_bearer(&with_auth("Bearer s3cret"), Some("s3cret")).is_ok());

        let err = verify_bearer(&with_auth("Bearer wrong"), Some("s3cret")).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Invalid API key");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let missing = verify_bearer(&HeaderMap::new(), Some("k")).unwrap_err();
        assert_eq!(missing.message, "Missing Authorization header");

        let basic = extract_bearer_token(&with_auth("Basic abc")).unwrap_err();
        assert_eq!(basic.message, "Authorization must use Bearer token");
    }
}

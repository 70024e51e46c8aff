use crate::error::{internal_error, ApiError};
use axum::http::HeaderMap;
use rand::rngs::OsRng;
use rand::RngCore;
use std::future::Future;
use std::time::Duration;
use url::Url;

const CODE_BYTES: usize = 4;

pub async fn with_timeout<F: Future>(
    duration_in_mills: u64,
    task: F,
) -> Result<<F as Future>::Output, ApiError> {
    tokio::time::timeout(Duration::from_millis(duration_in_mills), task)
        .await
        .map_err(internal_error)
}

pub fn get_header(name: &str, headers: &HeaderMap) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn parse_url(text: &str) -> Result<String, ApiError> {
    Url::parse(text.trim())
        .map(|url| url.to_string())
        .map_err(|_| ApiError::Validation("Malformed url".into()))
}

/// Random 8-character lowercase hex code. Uniqueness is enforced by the store.
pub fn generate_code() -> Result<String, rand::Error> {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn generated_codes_are_eight_lowercase_hex_chars() {
        for _ in 0..1_000 {
            let code = generate_code().unwrap();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn consecutive_codes_differ() {
        let mut previous = generate_code().unwrap();
        for _ in 0..100_000 {
            let next = generate_code().unwrap();
            assert_ne!(previous, next);
            previous = next;
        }
    }

    #[test]
    fn parse_url_accepts_absolute_urls_only() {
        assert_eq!(parse_url("https://example.com").unwrap(), "https://example.com/");
        assert!(matches!(parse_url("example.com"), Err(ApiError::Validation(_))));
        assert!(parse_url("").is_err());
    }

    #[test]
    fn get_header_skips_blank_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("   "));
        headers.insert("user-agent", HeaderValue::from_static(" curl/8.0 "));
        assert_eq!(get_header("x-real-ip", &headers), None);
        assert_eq!(get_header("user-agent", &headers).as_deref(), Some("curl/8.0"));
        assert_eq!(get_header("referer", &headers), None);
    }
}

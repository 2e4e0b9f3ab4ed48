use log::debug;
use reqwest::{Client, header::{HeaderMap, HeaderName, HeaderValue}};
use std::time::Duration;

use crate::error::SetupError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// 构建HTTP客户端，包含自定义请求头和超时
pub fn build_http_client(custom_headers: &[String], timeout: Duration) -> Result<Client, SetupError> {
    let mut headers = HeaderMap::new();
    headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

    for header in custom_headers {
        let (key, value) = header
            .split_once(':')
            .ok_or_else(|| SetupError::Header(header.clone()))?;
        let header_name = HeaderName::from_bytes(key.trim().as_bytes())
            .map_err(|_| SetupError::Header(header.clone()))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|_| SetupError::Header(header.clone()))?;
        headers.insert(header_name, header_value);
    }

    debug!("Using HTTP headers: {:?}", headers);

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(SetupError::HttpClient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_headers() {
        let headers = vec!["Cookie: session=abc".to_string(), "Referer: http://x/".to_string()];
        assert!(build_http_client(&headers, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn rejects_header_without_colon() {
        let err = build_http_client(&["NoColonHere".to_string()], Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SetupError::Header(h) if h == "NoColonHere"));
    }
}

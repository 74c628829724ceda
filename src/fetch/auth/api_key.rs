use crate::error::ConfigError;
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects a secret as an HTTP header.
///
/// The header is validated once at construction, so a bad name or a key with
/// control characters is reported as a configuration error before any
/// request is made.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidHeader {
            name: header_name.to_string(),
            message,
        };
        let name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let mut value = HeaderValue::from_str(key).map_err(|e| invalid(e.to_string()))?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name: name,
            value,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

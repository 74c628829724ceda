use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that sends an API key as a URL query parameter.
///
/// `param_name` is the parameter the provider reads its key from (`key`,
/// `apikey`, `access_token`, ...). A value already present under that name,
/// for instance in an overridden endpoint, is replaced rather than repeated.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: &str, key: String) -> Self {
        Self {
            inner,
            param_name: param_name.to_string(),
            key,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let kept: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .filter(|(name, _)| name != self.param_name.as_str())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        req.url_mut()
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, Request, Url};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        urls: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: Request) -> reqwest::Result<reqwest::Response> {
            self.urls.lock().unwrap().push(req.url().clone());
            Ok(http::Response::new("{}").into())
        }
    }

    async fn send(param_name: &str, url: &str) -> Url {
        let client = UrlParam::new(Recorder::default(), param_name, "secret".to_string());
        client
            .execute(Request::new(Method::GET, Url::parse(url).unwrap()))
            .await
            .unwrap();
        client.inner.urls.lock().unwrap()[0].clone()
    }

    #[tokio::test]
    async fn test_key_is_appended_after_existing_params() {
        let url = send("apikey", "https://router.test/v8/routes?origin=51.5,-0.1&return=summary").await;
        assert_eq!(
            url.query(),
            Some("origin=51.5%2C-0.1&return=summary&apikey=secret")
        );
        assert_eq!(url.path(), "/v8/routes");
    }

    #[tokio::test]
    async fn test_key_without_query() {
        let url = send("access_token", "https://api.test/directions").await;
        assert_eq!(url.query(), Some("access_token=secret"));
    }

    #[tokio::test]
    async fn test_existing_key_is_replaced() {
        let url = send("key", "https://api.test/route?key=stale&travelMode=car").await;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("travelMode".to_string(), "car".to_string()),
                ("key".to_string(), "secret".to_string()),
            ]
        );
    }
}

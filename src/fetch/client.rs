use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

/// The single seam through which every provider request leaves the process.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Shared, type-erased client as held by provider lanes.
pub type SharedClient = Arc<dyn HttpClient>;

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

//! Bearer authentication for every outbound call.
//!
//! Before sending, the token manager's usable credential (if any) is attached
//! as `Authorization: Bearer <token>`. A 401 triggers one refresh and one
//! reissue of the identical request; the reissued outcome is final.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderValue, AUTHORIZATION};
use http::Extensions;
use reqwest::{Request, Response, StatusCode, Url};
use reqwest_middleware::{Error, Middleware, Next, Result};

use crate::auth::TokenManager;

pub struct BearerAuthMiddleware {
    tokens: Arc<TokenManager>,
    bootstrap_path: String,
}

impl BearerAuthMiddleware {
    /// `bootstrap_path` names the identity-bootstrap endpoint; its 401s are
    /// returned as they are.
    pub fn new(tokens: Arc<TokenManager>, bootstrap_path: impl Into<String>) -> Self {
        Self {
            tokens,
            bootstrap_path: bootstrap_path.into(),
        }
    }

    fn is_bootstrap(&self, url: &Url) -> bool {
        let path = self.bootstrap_path.trim_end_matches('/');
        !path.is_empty() && url.path().trim_end_matches('/').ends_with(path)
    }
}

fn set_bearer(request: &mut Request, token: &str) -> Result<()> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Middleware(anyhow::anyhow!("Invalid credential header: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

#[async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(token) = self.tokens.valid_token().await {
            set_bearer(&mut req, &token)?;
        }

        // Bodies that cannot be cloned (multipart streams) are sent once.
        let retry = if self.is_bootstrap(req.url()) {
            None
        } else {
            req.try_clone()
        };

        let method = req.method().clone();
        let url = req.url().clone();
        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(mut retry) = retry else {
            log::debug!("{method} {url} returned 401, not retrying");
            return Ok(response);
        };
        let Some(token) = self.tokens.refresh().await else {
            log::warn!("{method} {url} returned 401 and no credential could be refreshed");
            return Ok(response);
        };

        log::info!("{method} {url} returned 401, retrying once with a refreshed credential");
        set_bearer(&mut retry, &token)?;
        next.run(retry, extensions).await
    }
}

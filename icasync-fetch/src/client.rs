//! HTTP client abstractions.
//!
//! Thin wrapper around `reqwest` with the fixed 30s timeout, a cookie store
//! (the vendor's form-login chain is session-cookie based) and a separate
//! non-redirecting client for the authorize legs, where the `Location`
//! header is the payload.

use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Fixed request timeout in seconds. Not user-configurable.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client pair used by the authenticator and the API client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    no_redirect: Client,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    pub fn new() -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let user_agent = concat!("icasync/", env!("CARGO_PKG_VERSION"));

        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;
        let no_redirect = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { inner, no_redirect })
    }

    /// Performs a GET and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<T, FetchError> {
        debug!(url = %url, "HTTP [GET]");
        let mut request = self.inner.get(url);
        if let Some(auth) = auth_header {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let response = check_status(url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Performs a GET, mapping a 404 to `None`.
    pub async fn get_json_opt<T: DeserializeOwned>(
        &self,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<Option<T>, FetchError> {
        debug!(url = %url, "HTTP [GET]");
        let mut request = self.inner.get(url);
        if let Some(auth) = auth_header {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(url, response).await?;
        Ok(Some(response.json().await?))
    }

    /// Performs a GET with query parameters, without following redirects.
    ///
    /// Returns the `Location` header value.
    pub async fn get_redirect(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        debug!(url = %url, "HTTP [GET] (no redirect)");
        let response = self.no_redirect.get(url).query(query).send().await?;
        location_of(url, check_status(url, response).await?)
    }

    /// Posts a form, decoding the JSON response body.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        auth_header: Option<&str>,
        form: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        debug!(url = %url, "HTTP [POST] form");
        let mut request = self.inner.post(url).form(form);
        if let Some(auth) = auth_header {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let response = check_status(url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Posts a form and returns the raw response text (the HTML login form).
    pub async fn post_form_text(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        debug!(url = %url, "HTTP [POST] form");
        let response = self.inner.post(url).form(form).send().await?;
        let response = check_status(url, response).await?;
        Ok(response.text().await?)
    }

    /// Posts a form with query parameters, without following redirects.
    ///
    /// Returns the `Location` header value.
    pub async fn post_form_redirect(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        debug!(url = %url, "HTTP [POST] form (no redirect)");
        let response = self
            .no_redirect
            .post(url)
            .query(query)
            .form(form)
            .send()
            .await?;
        location_of(url, check_status(url, response).await?)
    }

    /// Posts a JSON body, decoding the JSON response body.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        auth_header: Option<&str>,
        body: &B,
    ) -> Result<T, FetchError> {
        debug!(url = %url, "HTTP [POST] json");
        let mut request = self.inner.post(url).json(body);
        if let Some(auth) = auth_header {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let response = check_status(url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Performs a DELETE; the body is discarded.
    pub async fn delete(&self, url: &str, auth_header: Option<&str>) -> Result<(), FetchError> {
        debug!(url = %url, "HTTP [DELETE]");
        let mut request = self.inner.delete(url);
        if let Some(auth) = auth_header {
            request = request.header(header::AUTHORIZATION, auth);
        }
        check_status(url, request.send().await?).await?;
        Ok(())
    }
}

/// Maps non-success statuses to [`FetchError::Status`], keeping the body for
/// diagnostics. Redirect statuses (302/303) count as success; the callers
/// that care about them use the non-redirecting client.
async fn check_status(url: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success()
        || status == StatusCode::FOUND
        || status == StatusCode::SEE_OTHER
    {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(url = %url, status = status.as_u16(), "HTTP request failed");
    Err(FetchError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Extracts the `Location` header from a redirect response.
fn location_of(url: &str, response: Response) -> Result<String, FetchError> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
        .ok_or_else(|| FetchError::MissingRedirect(url.to_string()))
}

// RouterOS REST HTTP client
//
// Wraps `reqwest::Client` with RouterOS URL construction, basic auth and
// error-body parsing. Endpoint methods live in sibling modules as inherent
// methods to keep this module focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// RouterOS reports failures as `{"error": 400, "message": "...", "detail": "..."}`.
#[derive(serde::Deserialize)]
struct RouterOsErrorBody {
    error: Option<u16>,
    message: Option<String>,
    detail: Option<String>,
}

/// Raw HTTP client for the RouterOS REST API.
///
/// Every request carries HTTP basic auth. Successful responses are
/// deserialized directly (RouterOS has no envelope); error responses are
/// mapped to [`Error::RouterOs`] with the router's `detail` preserved.
pub struct RouterOsClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
}

impl RouterOsClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the router root, e.g. `https://192.168.88.1`.
    pub fn new(
        base_url: Url,
        username: String,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, username, password))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        username: String,
        password: SecretString,
    ) -> Self {
        Self {
            http,
            base_url,
            username,
            password,
        }
    }

    /// The router base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The API user name.
    pub fn username(&self) -> &str {
        &self.username
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/rest/{path}`.
    pub(crate) fn rest_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/rest/{path}"))?)
    }

    /// Build `{base}/rest/{path}?{key}={value}` for a server-side filter.
    pub(crate) fn rest_url_filtered(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<Url, Error> {
        let mut url = self.rest_url(path)?;
        url.query_pairs_mut().append_pair(key, value);
        Ok(url)
    }

    /// Build `{base}/rest/{path}/{id}` for an item addressed by RouterOS `.id`.
    pub(crate) fn item_url(&self, path: &str, id: &str) -> Result<Url, Error> {
        let mut url = self.rest_url(path)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// Send a GET request.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.authed(self.http.get(url)).send().await?;
        Self::parse_response(resp).await
    }

    /// Send a PUT request (RouterOS REST uses PUT to create items).
    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("PUT {}", url);
        let resp = self.authed(self.http.put(url).json(body)).send().await?;
        Self::parse_response(resp).await
    }

    /// Send a PATCH request (update an existing item).
    pub(crate) async fn patch<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("PATCH {}", url);
        let resp = self.authed(self.http.patch(url).json(body)).send().await?;
        Self::parse_response(resp).await
    }

    /// Send a POST request (RouterOS REST uses POST for console commands).
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self.authed(self.http.post(url).json(body)).send().await?;
        Self::parse_response(resp).await
    }

    /// Send a DELETE request. RouterOS answers with an empty body.
    pub(crate) async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {}", url);
        let resp = self.authed(self.http.delete(url)).send().await?;
        let _: serde_json::Value = Self::parse_response(resp).await?;
        Ok(())
    }

    /// Map HTTP status + body into either the decoded payload or an [`Error`].
    ///
    /// An empty success body decodes as JSON `null`, so callers that don't
    /// care about the payload can ask for `serde_json::Value`.
    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "router rejected API credentials".into(),
            });
        }

        let body = resp.text().await?;
        trace!(status = status.as_u16(), body_len = body.len(), "router response");

        if !status.is_success() {
            return Err(match serde_json::from_str::<RouterOsErrorBody>(&body) {
                Ok(err) => Error::RouterOs {
                    status: err.error.unwrap_or_else(|| status.as_u16()),
                    message: err.message.unwrap_or_else(|| {
                        status.canonical_reason().unwrap_or("error").to_owned()
                    }),
                    detail: err.detail,
                },
                Err(_) => Error::RouterOs {
                    status: status.as_u16(),
                    message: format!("HTTP {status}: {}", preview(&body)),
                    detail: None,
                },
            });
        }

        let text = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> RouterOsClient {
        RouterOsClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://192.168.88.1/").unwrap(),
            "api".into(),
            SecretString::from("secret".to_string()),
        )
    }

    #[test]
    fn rest_url_joins_without_double_slashes() {
        let url = client().rest_url("/ip/hotspot/user").unwrap();
        assert_eq!(url.as_str(), "https://192.168.88.1/rest/ip/hotspot/user");
    }

    #[test]
    fn item_url_appends_routeros_id() {
        let url = client().item_url("ip/hotspot/user", "*1A").unwrap();
        assert_eq!(url.as_str(), "https://192.168.88.1/rest/ip/hotspot/user/*1A");
    }

    #[test]
    fn filtered_url_appends_query() {
        let url = client()
            .rest_url_filtered("ip/hotspot/user", "name", "ABCD2345EFGH")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://192.168.88.1/rest/ip/hotspot/user?name=ABCD2345EFGH"
        );
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), 200);
    }
}

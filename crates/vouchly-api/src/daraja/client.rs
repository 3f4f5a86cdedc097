// Daraja HTTP client
//
// OAuth client-credentials token, then STK push. Every push fetches a
// fresh token.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use url::Url;

use crate::daraja::models::{DarajaErrorBody, StkPushRequest, StkPushResponse, TokenResponse};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Daraja expects timestamps in East Africa Time (UTC+3).
const EAT_OFFSET_SECS: i32 = 3 * 3600;

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DarajaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl DarajaEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

/// App credentials plus the paybill / till the customer pays into.
#[derive(Debug, Clone)]
pub struct DarajaCredentials {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    pub callback_url: Url,
}

/// `base64(shortcode + passkey + timestamp)`, the STK push password.
pub fn stk_password(shortcode: &str, passkey: &SecretString, timestamp: &str) -> String {
    STANDARD.encode(format!(
        "{shortcode}{}{timestamp}",
        passkey.expose_secret()
    ))
}

/// Format `now` as Daraja's `YYYYMMDDHHmmss` in EAT.
fn daraja_timestamp(now: DateTime<Utc>) -> String {
    const FORMAT: &str = "%Y%m%d%H%M%S";
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => now.with_timezone(&eat).format(FORMAT).to_string(),
        None => now.format(FORMAT).to_string(),
    }
}

pub struct DarajaClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: DarajaCredentials,
}

impl DarajaClient {
    pub fn new(
        base_url: Url,
        credentials: DarajaCredentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: DarajaCredentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    pub fn shortcode(&self) -> &str {
        &self.credentials.shortcode
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
    }

    /// Obtain an OAuth access token.
    ///
    /// `GET /oauth/v1/generate?grant_type=client_credentials` with basic auth.
    pub async fn access_token(&self) -> Result<SecretString, Error> {
        let url = self.url("oauth/v1/generate?grant_type=client_credentials")?;
        debug!("requesting Daraja access token");

        let resp = self
            .http
            .get(url)
            .basic_auth(
                &self.credentials.consumer_key,
                Some(self.credentials.consumer_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(if status.is_client_error() {
                Error::Authentication {
                    message: format!("Daraja token request failed (HTTP {status})"),
                }
            } else {
                daraja_error(status.as_u16(), &body)
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("invalid token response: {e}"),
                body: String::new(),
            })?;
        Ok(SecretString::from(token.access_token))
    }

    /// Send a Lipa Na M-Pesa Online (STK push) prompt to `phone`.
    ///
    /// `POST /mpesa/stkpush/v1/processrequest`. A response with a
    /// non-zero `ResponseCode` is reported as [`Error::Daraja`].
    pub async fn stk_push(
        &self,
        phone: &str,
        amount: u64,
        reference: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<StkPushResponse, Error> {
        let token = self.access_token().await?;
        let timestamp = daraja_timestamp(now);
        let creds = &self.credentials;

        let request = StkPushRequest {
            business_short_code: creds.shortcode.clone(),
            password: stk_password(&creds.shortcode, &creds.passkey, &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".into(),
            amount,
            party_a: phone.to_owned(),
            party_b: creds.shortcode.clone(),
            phone_number: phone.to_owned(),
            callback_url: creds.callback_url.to_string(),
            account_reference: reference.to_owned(),
            transaction_desc: description.to_owned(),
        };

        let url = self.url("mpesa/stkpush/v1/processrequest")?;
        debug!(reference, amount, "sending STK push");

        let resp = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(daraja_error(status.as_u16(), &body));
        }

        let parsed: StkPushResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("invalid STK push response: {e}"),
                body: body.clone(),
            })?;

        if parsed.response_code != "0" {
            warn!(code = %parsed.response_code, "STK push not accepted");
            return Err(Error::Daraja {
                status: status.as_u16(),
                code: Some(parsed.response_code.clone()),
                message: parsed
                    .response_description
                    .unwrap_or_else(|| "STK push not accepted".into()),
            });
        }
        Ok(parsed)
    }
}

fn daraja_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<DarajaErrorBody>(body) {
        Ok(err) => Error::Daraja {
            status,
            code: err.error_code,
            message: err
                .error_message
                .unwrap_or_else(|| format!("HTTP {status}")),
        },
        Err(_) => Error::Daraja {
            status,
            code: None,
            message: format!("HTTP {status}"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn password_matches_daraja_formula() {
        // Sandbox shortcode/passkey pair from the Daraja documentation.
        let passkey = SecretString::from(
            "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919".to_string(),
        );
        let password = stk_password("174379", &passkey, "20240101120000");
        let decoded = String::from_utf8(STANDARD.decode(password).unwrap()).unwrap();
        assert_eq!(
            decoded,
            "174379bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c91920240101120000"
        );
    }

    #[test]
    fn timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 21, 30, 15).unwrap();
        assert_eq!(daraja_timestamp(now), "20240102003015");
    }

    #[test]
    fn environment_urls() {
        assert!(DarajaEnvironment::Sandbox.base_url().contains("sandbox"));
        assert!(!DarajaEnvironment::Production.base_url().contains("sandbox"));
    }
}

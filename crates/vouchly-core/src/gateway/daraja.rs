// ── Daraja-backed PaymentGateway ──

use async_trait::async_trait;
use chrono::Utc;
use vouchly_api::{DarajaClient, DarajaCredentials, Error as ApiError};

use super::routeros::build_transport;
use super::{CheckoutTicket, PaymentGateway};
use crate::config::{DarajaConfig, TlsVerification};
use crate::error::{GatewayError, classify};

/// [`PaymentGateway`] over M-Pesa STK push.
pub struct DarajaGateway {
    client: DarajaClient,
}

impl DarajaGateway {
    pub fn new(config: &DarajaConfig) -> Result<Self, ApiError> {
        let credentials = DarajaCredentials {
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            shortcode: config.shortcode.clone(),
            passkey: config.passkey.clone(),
            callback_url: config.callback_url.clone(),
        };
        let transport = build_transport(&TlsVerification::SystemDefaults, config.timeout);
        let client = DarajaClient::new(config.base_url.clone(), credentials, &transport)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: DarajaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    fn name(&self) -> &str {
        "mpesa"
    }

    async fn initiate(
        &self,
        phone: &str,
        amount: u64,
        reference: &str,
        description: &str,
    ) -> Result<CheckoutTicket, GatewayError> {
        let resp = self
            .client
            .stk_push(phone, amount, reference, description, Utc::now())
            .await
            .map_err(classify("stk_push"))?;
        Ok(CheckoutTicket {
            checkout_id: resp.checkout_request_id,
            customer_message: resp.customer_message,
        })
    }
}

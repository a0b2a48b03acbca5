//! Payment gateway trait and the HTTP implementation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PayoutError;

/// Confirmation returned by a gateway for a settled payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Gateway-issued reference for the settlement.
    pub reference: String,
    pub amount: Decimal,
}

/// Anything that can move money to a recipient.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name, for logs and errors.
    fn name(&self) -> &str;

    async fn send_payment(
        &self,
        recipient: &str,
        amount: Decimal,
    ) -> Result<PaymentReceipt, PayoutError>;
}

#[derive(Debug, Serialize)]
struct PaymentRequest<'a> {
    recipient: &'a str,
    amount: Decimal,
    currency: &'static str,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    reference: String,
    #[serde(default)]
    amount: Option<Decimal>,
}

/// Posts payments as JSON to a settlement endpoint with a bearer token.
pub struct HttpGateway {
    endpoint: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn http_error(&self, e: impl std::fmt::Display) -> PayoutError {
        PayoutError::Http {
            gateway: self.name().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_payment(
        &self,
        recipient: &str,
        amount: Decimal,
    ) -> Result<PaymentReceipt, PayoutError> {
        debug!(endpoint = %self.endpoint, %amount, "Sending payment");
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&PaymentRequest {
                recipient,
                amount,
                currency: "USD",
            })
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Payment rejected by gateway");
            return Err(PayoutError::Rejected {
                gateway: self.name().to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        let parsed: PaymentResponse =
            resp.json().await.map_err(|e| PayoutError::InvalidResponse {
                gateway: self.name().to_string(),
                reason: e.to_string(),
            })?;
        if parsed.reference.trim().is_empty() {
            return Err(PayoutError::InvalidResponse {
                gateway: self.name().to_string(),
                reason: "empty reference".to_string(),
            });
        }

        Ok(PaymentReceipt {
            reference: parsed.reference,
            amount: parsed.amount.unwrap_or(amount),
        })
    }
}

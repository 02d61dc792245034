//! Pi platform server API: access-token verification and payment approval.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MarketError, MarketResult};

/// Wallet account behind a verified access token
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WalletUser {
    pub uid: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PaymentStatusDto {
    #[serde(default)]
    pub developer_approved: bool,
    #[serde(default)]
    pub transaction_verified: bool,
    #[serde(default)]
    pub developer_completed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub user_cancelled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PaymentTransactionDto {
    pub txid: String,
    #[serde(default)]
    pub verified: bool,
}

/// Payment as reported by the wallet platform; untrusted until converted
/// into a `PaymentEvent`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PaymentDto {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub user_uid: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub status: PaymentStatusDto,
    #[serde(default)]
    pub transaction: Option<PaymentTransactionDto>,
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Resolve a user access token to the wallet account.
    async fn me(&self, access_token: &str) -> MarketResult<WalletUser>;

    async fn payment(&self, payment_id: &str) -> MarketResult<PaymentDto>;

    async fn approve(&self, payment_id: &str) -> MarketResult<PaymentDto>;

    async fn complete(&self, payment_id: &str, txid: &str) -> MarketResult<PaymentDto>;
}

/// `WalletGateway` over the Pi platform REST API
#[derive(Clone)]
pub struct PiGateway {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PiGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn api_key(&self) -> MarketResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| MarketError::Payment("PI_API_KEY is not configured".to_string()))
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> MarketResult<T> {
        let response = request.send().await.map_err(|err| {
            tracing::warn!(error = %err, "wallet platform unreachable");
            MarketError::Payment(format!("wallet platform unreachable: {err}"))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MarketError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "wallet platform rejected request");
            return Err(MarketError::Payment(format!("wallet platform returned {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| MarketError::Payment(format!("unexpected wallet platform response: {err}")))
    }

    fn payment_url(&self, payment_id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/v2/payments/{payment_id}/{action}", self.base_url),
            None => format!("{}/v2/payments/{payment_id}", self.base_url),
        }
    }
}

#[async_trait]
impl WalletGateway for PiGateway {
    async fn me(&self, access_token: &str) -> MarketResult<WalletUser> {
        let request = self
            .http
            .get(format!("{}/v2/me", self.base_url))
            .bearer_auth(access_token);
        self.send(request).await
    }

    async fn payment(&self, payment_id: &str) -> MarketResult<PaymentDto> {
        let request = self
            .http
            .get(self.payment_url(payment_id, None))
            .header("Authorization", format!("Key {}", self.api_key()?));
        self.send(request).await
    }

    async fn approve(&self, payment_id: &str) -> MarketResult<PaymentDto> {
        let request = self
            .http
            .post(self.payment_url(payment_id, Some("approve")))
            .header("Authorization", format!("Key {}", self.api_key()?));
        self.send(request).await
    }

    async fn complete(&self, payment_id: &str, txid: &str) -> MarketResult<PaymentDto> {
        let request = self
            .http
            .post(self.payment_url(payment_id, Some("complete")))
            .header("Authorization", format!("Key {}", self.api_key()?))
            .json(&json!({ "txid": txid }));
        self.send(request).await
    }
}

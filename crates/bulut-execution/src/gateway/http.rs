//! Gateway over a Circle-style developer-controlled wallet REST API.
//!
//! Gas is sponsored by the platform wallet (`fee.type = GAS`), so users
//! never hold the chain's native token. Without an API key and entity id
//! the gateway falls back to an in-process [`SimulatedGateway`].

use std::time::Duration;

use async_trait::async_trait;
use bulut_types::Currency;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    GatewayError, ReceiptStatus, SimulatedGateway, TransferGateway, TransferReceipt,
    TransferRequest, TransferStatus,
};

pub const DEFAULT_BASE_URL: &str = "https://api.circle.com/v1/w3s";

/// Connection settings for [`HttpGateway`].
#[derive(Clone, Debug, Default)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub entity_id: String,
    /// Platform wallet that sponsors gas.
    pub wallet_id: String,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.entity_id.is_empty()
    }
}

enum Backend {
    Remote(Client),
    Simulated(SimulatedGateway),
}

/// REST transfer gateway.
pub struct HttpGateway {
    config: HttpGatewayConfig,
    backend: Backend,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let backend = if config.has_credentials() {
            let client = Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| GatewayError::Permanent(format!("http client: {e}")))?;
            tracing::info!(base_url = %config.base_url, "gateway using remote wallet API");
            Backend::Remote(client)
        } else {
            tracing::warn!("gateway credentials missing, running in simulation mode");
            Backend::Simulated(SimulatedGateway::new())
        };
        Ok(Self { config, backend })
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.backend, Backend::Simulated(_))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        client: &Client,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let response = client
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody<'a> {
    entity_id: &'a str,
    wallet_id: &'a str,
    destination_address: String,
    token: &'static str,
    amount: String,
    ref_id: &'a str,
    fee: FeeBody,
}

#[derive(Serialize)]
struct FeeBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTransaction {
    id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ref_id: Option<String>,
}

#[derive(Deserialize)]
struct TransactionData {
    transaction: RemoteTransaction,
}

#[derive(Deserialize)]
struct TransactionList {
    #[serde(default)]
    transactions: Vec<RemoteTransaction>,
}

fn transport(e: reqwest::Error) -> GatewayError {
    GatewayError::Transient(format!("transport: {e}"))
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify(status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::Transient(format!("unreadable response: {e}")))
}

/// Map an HTTP failure to a gateway error class.
pub(crate) fn classify(status: StatusCode, body: &str) -> GatewayError {
    let message = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::Transient(message)
    } else {
        GatewayError::Permanent(message)
    }
}

/// Map a remote transaction state to a settlement status.
pub(crate) fn parse_state(state: &str) -> TransferStatus {
    match state.to_ascii_uppercase().as_str() {
        "COMPLETE" | "CONFIRMED" => TransferStatus::Confirmed,
        "FAILED" | "CANCELLED" | "DENIED" => TransferStatus::Failed,
        _ => TransferStatus::Pending,
    }
}

fn token(currency: Currency) -> &'static str {
    match currency {
        Currency::Usd | Currency::Usdc => "USDC",
        other => other.code(),
    }
}

#[async_trait]
impl TransferGateway for HttpGateway {
    async fn submit_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, GatewayError> {
        let client = match &self.backend {
            Backend::Simulated(sim) => return sim.submit_transfer(request).await,
            Backend::Remote(client) => client,
        };

        let body = TransferBody {
            entity_id: &self.config.entity_id,
            wallet_id: &self.config.wallet_id,
            destination_address: request.recipient.to_string(),
            token: token(request.currency),
            amount: request.amount.to_decimal(request.currency),
            ref_id: &request.correlation_id,
            fee: FeeBody { kind: "GAS" },
        };
        let response = client
            .post(self.url("/developer/transactions/transfer"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let created: Envelope<RemoteTransaction> = read_json(response).await?;
        let tx = created.data;
        if parse_state(&tx.state) == TransferStatus::Failed {
            return Ok(TransferReceipt {
                status: ReceiptStatus::Rejected,
                gateway_ref: Some(tx.id),
                correlation_id: request.correlation_id.clone(),
                reason: Some(format!("transaction state {}", tx.state)),
            });
        }
        Ok(TransferReceipt {
            status: ReceiptStatus::Accepted,
            gateway_ref: Some(tx.id),
            correlation_id: tx.ref_id.unwrap_or_else(|| request.correlation_id.clone()),
            reason: None,
        })
    }

    async fn query_transfer(&self, gateway_ref: &str) -> Result<TransferStatus, GatewayError> {
        let client = match &self.backend {
            Backend::Simulated(sim) => return sim.query_transfer(gateway_ref).await,
            Backend::Remote(client) => client,
        };
        let found: Envelope<TransactionData> = self
            .get_json(client, &format!("/transactions/{gateway_ref}"), &[])
            .await?;
        Ok(parse_state(&found.data.transaction.state))
    }

    async fn lookup_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<(String, TransferStatus)>, GatewayError> {
        let client = match &self.backend {
            Backend::Simulated(sim) => return sim.lookup_correlation(correlation_id).await,
            Backend::Remote(client) => client,
        };
        let list: Envelope<TransactionList> = self
            .get_json(client, "/transactions", &[("refId", correlation_id)])
            .await?;
        Ok(list
            .data
            .transactions
            .into_iter()
            .find(|t| t.ref_id.as_deref() == Some(correlation_id))
            .map(|t| {
                let status = parse_state(&t.state);
                (t.id, status)
            }))
    }
}

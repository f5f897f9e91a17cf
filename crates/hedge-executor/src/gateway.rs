//! HTTP trading client.
//!
//! Posts market orders to an order gateway that owns key custody and
//! signing. The gateway answers `{success, orderId, filledSize?, avgPrice?,
//! error?}`; anything else is a rejection.

use crate::client::TradingClient;
use crate::error::{ExecutorError, ExecutorResult};
use hedge_core::{book::parse_decimal, BoxFuture, MarketOrderArgs, OrderAck, Price, Size};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for gateway requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    condition_id: &'a str,
    token_id: &'a str,
    side: String,
    amount: String,
    price: String,
}

/// Gateway-backed trading client.
pub struct GatewayTradingClient {
    client: Client,
    orders_url: String,
    api_key: Option<String>,
}

impl GatewayTradingClient {
    /// Create a new gateway client.
    ///
    /// # Arguments
    /// * `base_url` - Gateway base URL; orders are posted to `{base_url}/orders`
    /// * `api_key` - Optional bearer token
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> ExecutorResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExecutorError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            orders_url: format!("{}/orders", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    async fn submit(&self, args: MarketOrderArgs) -> ExecutorResult<OrderAck> {
        let request = OrderRequest {
            condition_id: args.condition_id.as_str(),
            token_id: args.token_id.as_str(),
            side: args.side.to_string(),
            amount: args.amount.to_string(),
            price: args.reference_price.to_string(),
        };

        let mut builder = self.client.post(&self.orders_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ExecutorError::SubmissionFailed(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, token = %args.token_id, "Gateway rejected order");
            return Err(ExecutorError::OrderRejected(format!("HTTP {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExecutorError::SubmissionFailed(format!("Failed to parse response: {e}")))?;

        let ack = parse_ack(&body)?;
        info!(
            token = %args.token_id,
            side = %args.side,
            order_id = ?ack.order_id,
            "Order acknowledged"
        );
        Ok(ack)
    }
}

impl TradingClient for GatewayTradingClient {
    fn create_market_order(&self, args: MarketOrderArgs) -> BoxFuture<'_, ExecutorResult<OrderAck>> {
        Box::pin(self.submit(args))
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

/// Parse a gateway acknowledgement.
pub fn parse_ack(body: &Value) -> ExecutorResult<OrderAck> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let reason = body
            .get("error")
            .or_else(|| body.get("errorMsg"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ExecutorError::OrderRejected(reason.to_string()));
    }

    let order_id = body
        .get("orderId")
        .or_else(|| body.get("orderID"))
        .or_else(|| body.get("order_id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let filled_size = body
        .get("filledSize")
        .and_then(parse_decimal)
        .map(Size::new)
        .filter(Size::is_positive);
    let avg_price = body
        .get("avgPrice")
        .and_then(parse_decimal)
        .map(Price::new)
        .filter(Price::is_positive);

    Ok(OrderAck {
        success,
        order_id,
        filled_size,
        avg_price,
    })
}

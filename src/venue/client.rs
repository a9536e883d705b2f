//! REST client for the venue's signed-order proxy.
//!
//! Order signing itself happens inside the venue's gateway; this client
//! presents the API key, speaks the errno envelope, and keeps strictly to
//! the documented price/amount formats (<= 3dp price inside (0,1), <= 2dp
//! amount).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    decode_errno, BalanceSnapshot, MarketDetail, MarketSummary, Orderbook, PlaceOrderRequest,
    PlacedOrder, RedeemOutcome, VenueClient, VenuePosition, VenueTrade,
};
use crate::error::{Result, TipsterError};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    errno: i64,
    #[serde(default)]
    errmsg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Listed<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

pub struct VenueRestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VenueRestClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TipsterError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await?;
        self.unwrap_envelope(path, response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        self.unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TipsterError::RateLimited(format!("venue {path}")));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TipsterError::Venue {
                errno: 404,
                message: format!("{path} not found"),
            });
        }
        if status.is_server_error() {
            return Err(TipsterError::Transient(format!(
                "venue {path} returned {status}"
            )));
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.errno != 0 {
            return Err(decode_errno(envelope.errno, &envelope.errmsg));
        }
        envelope
            .result
            .ok_or_else(|| TipsterError::Internal(format!("venue {path}: empty result on errno=0")))
    }
}

#[derive(Debug, Deserialize)]
struct RawMarketSummary {
    market_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    status: serde_json::Value,
    #[serde(default)]
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawMarketDetail {
    market_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    status: serde_json::Value,
    yes_token_id: Option<String>,
    no_token_id: Option<String>,
    winner_token_id: Option<String>,
    resolution_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// The venue serializes status either as an int code or a string tag.
fn status_text(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct RawRedeem {
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    deferred: bool,
    #[serde(default)]
    reason: String,
}

#[async_trait]
impl VenueClient for VenueRestClient {
    async fn enable_trading(&self) -> Result<()> {
        let _: serde_json::Value = self.post("/openapi/trade/enable", json!({})).await?;
        debug!("venue trading enabled");
        Ok(())
    }

    async fn get_markets(&self, limit: u32, offset: u32) -> Result<Vec<MarketSummary>> {
        let listed: Listed<RawMarketSummary> = self
            .get(
                "/openapi/market/list",
                &[
                    ("topic_type", "BINARY".to_string()),
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;

        Ok(listed
            .list
            .into_iter()
            .map(|raw| MarketSummary {
                market_id: raw.market_id,
                title: raw.title,
                category: raw.category,
                status: status_text(&raw.status),
                volume: raw.volume,
            })
            .collect())
    }

    async fn get_market(&self, market_id: i64) -> Result<Option<MarketDetail>> {
        let result: Result<RawMarketDetail> =
            self.get(&format!("/openapi/market/{market_id}"), &[]).await;

        match result {
            Ok(raw) => Ok(Some(MarketDetail {
                market_id: raw.market_id,
                title: raw.title,
                category: raw.category,
                status: status_text(&raw.status),
                yes_token_id: raw.yes_token_id.filter(|t| !t.is_empty()),
                no_token_id: raw.no_token_id.filter(|t| !t.is_empty()),
                winner_token_id: raw.winner_token_id.filter(|t| !t.is_empty()),
                resolution_time: raw.resolution_time,
            })),
            // listing can briefly lead the detail endpoint; treat 404 as absent
            Err(TipsterError::Venue { errno: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn get_orderbook(&self, token_id: &str) -> Result<Orderbook> {
        self.get(&format!("/openapi/orderbook/{token_id}"), &[])
            .await
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder> {
        if request.price.scale() > 3 {
            return Err(TipsterError::Validation(format!(
                "order price {} exceeds 3 decimals",
                request.price
            )));
        }
        let body = json!({
            "market_id": request.market_id,
            "token_id": request.token_id,
            "side": request.side.as_str(),
            "order_type": "LIMIT",
            "price": request.price.to_string(),
            "amount": request.amount.round_dp(2).to_f64().unwrap_or(0.0),
            "check_approval": request.check_approval,
            "client_order_id": request.client_order_id,
        });
        self.post("/openapi/order", body).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(&format!("/openapi/order/{order_id}/cancel"), json!({}))
            .await?;
        Ok(())
    }

    async fn redeem(&self, market_id: i64) -> Result<RedeemOutcome> {
        let raw: RawRedeem = self
            .post(&format!("/openapi/market/{market_id}/redeem"), json!({}))
            .await?;
        if raw.deferred {
            warn!(
                "redemption for market {} deferred: {}",
                market_id, raw.reason
            );
            return Ok(RedeemOutcome::DeferredLowGas);
        }
        Ok(RedeemOutcome::Submitted {
            tx_hash: raw.tx_hash,
        })
    }

    async fn get_my_trades(&self, limit: u32) -> Result<Vec<VenueTrade>> {
        let listed: Listed<VenueTrade> = self
            .get("/openapi/trade/mine", &[("limit", limit.to_string())])
            .await?;
        Ok(listed.list)
    }

    async fn get_my_positions(&self, limit: u32) -> Result<Vec<VenuePosition>> {
        let listed: Listed<VenuePosition> = self
            .get("/openapi/position/mine", &[("limit", limit.to_string())])
            .await?;
        Ok(listed.list)
    }

    async fn get_my_balances(&self) -> Result<BalanceSnapshot> {
        self.get("/openapi/balance/mine", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_handles_both_encodings() {
        assert_eq!(status_text(&json!("ACTIVATED")), "ACTIVATED");
        assert_eq!(status_text(&json!(2)), "2");
        assert_eq!(status_text(&json!(null)), "");
    }
}

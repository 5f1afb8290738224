//! Centralized derivatives exchange adapter: HMAC-SHA256 query-string
//! auth over REST, grounded in the workspace precedent's
//! `BinanceRequestSigner`/`CreateOrderParams` shape.

use crate::adapter::{
    AccountHydration, OrderRequest, OrderUpdateRequest, PositionMetadata, PublicSnapshot,
    VenueAdapter,
};
use async_trait::async_trait;
use chrono::Utc;
use polytrade_core::WorkerError;
use polytrade_execution::{AccountSigner, Signer};
use polytrade_store::model::{
    AmountLimit, AmountPrecision, Balance, LeverageLimit, Market, MarketLimits,
    OrderSide, OrderType, VenueId,
};
use serde::Deserialize;
use std::collections::HashMap;

pub struct CexDerivativesAdapter {
    base_rest_url: String,
    base_ws_url: String,
    client: reqwest::Client,
    signer: AccountSigner,
    api_key: String,
}

impl std::fmt::Debug for CexDerivativesAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CexDerivativesAdapter")
            .field("base_rest_url", &self.base_rest_url)
            .finish_non_exhaustive()
    }
}

impl CexDerivativesAdapter {
    pub fn new(base_rest_url: impl Into<String>, base_ws_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            base_rest_url: base_rest_url.into(),
            base_ws_url: base_ws_url.into(),
            client: reqwest::Client::new(),
            signer: AccountSigner::hmac_only(api_secret.into()),
            api_key: api_key.into(),
        }
    }

    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, WorkerError> {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={timestamp}"));
        let signature = self.signer.sign_hmac(&query)?;
        Ok(format!("{query}&signature={signature}"))
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    status: String,
}

#[async_trait]
impl VenueAdapter for CexDerivativesAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::Cex
    }

    async fn fetch_public_snapshot(&self) -> Result<PublicSnapshot, WorkerError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_rest_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WorkerError::VenueReject {
                code: resp.status().as_u16().to_string(),
                msg: "exchangeInfo rejected".into(),
            });
        }
        let parsed: ExchangeInfoResponse = resp
            .json()
            .await
            .map_err(|e| WorkerError::Programming(e.to_string()))?;

        let mut markets = HashMap::new();
        let tickers = HashMap::new();
        for sym in parsed.symbols {
            markets.insert(
                sym.symbol.clone(),
                Market {
                    id: sym.symbol.clone(),
                    exchange: "cex".into(),
                    symbol: sym.symbol.clone(),
                    base: sym.base_asset,
                    quote: sym.quote_asset,
                    active: sym.status == "TRADING",
                    precision: AmountPrecision { amount: 0.001, price: 0.01 },
                    limits: MarketLimits {
                        amount: AmountLimit { min: 0.0, max: f64::MAX, max_market: f64::MAX },
                        leverage: LeverageLimit { min: 1.0, max: 125.0 },
                    },
                    metadata: None,
                },
            );
        }
        Ok(PublicSnapshot { markets, tickers })
    }

    async fn hydrate_account(&self, _account_id: &str) -> Result<AccountHydration, WorkerError> {
        let query = self.signed_query(&[])?;
        let url = format!("{}/api/v3/account?{}", self.base_rest_url, query);
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(WorkerError::AuthError("HMAC rejected".into()));
        }
        if !resp.status().is_success() {
            return Err(WorkerError::VenueReject {
                code: resp.status().as_u16().to_string(),
                msg: "account fetch rejected".into(),
            });
        }
        Ok(AccountHydration {
            balance: Balance::default(),
            positions: Vec::new(),
            orders: Vec::new(),
            fills: Vec::new(),
        })
    }

    async fn submit_batch(
        &self,
        _account_id: &str,
        orders: Vec<OrderRequest>,
    ) -> Result<Vec<String>, WorkerError> {
        let mut ids = Vec::with_capacity(orders.len());
        for order in orders {
            let side = match order.side {
                OrderSide::Buy => "BUY",
                OrderSide::Sell => "SELL",
            };
            let order_type = match order.kind {
                OrderType::Market => "MARKET",
                OrderType::Limit => "LIMIT",
                OrderType::StopMarket => "STOP_MARKET",
                OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
                OrderType::TrailingStopMarket => "TRAILING_STOP_MARKET",
            };
            let mut params = vec![
                ("symbol", order.symbol.clone()),
                ("side", side.to_string()),
                ("type", order_type.to_string()),
                ("quantity", order.amount.to_string()),
                ("newClientOrderId", order.client_order_id.clone()),
            ];
            if let Some(price) = order.price {
                params.push(("price", price.to_string()));
            }
            let params_ref: Vec<(&str, String)> =
                params.iter().map(|(k, v)| (*k, v.clone())).collect();
            let query = self.signed_query(&params_ref)?;
            let url = format!("{}/api/v3/order?{}", self.base_rest_url, query);
            let resp = self
                .client
                .post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| WorkerError::Transport(e.to_string()))?;
            if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(WorkerError::Throttled("CEX order rate limit".into()));
            }
            if !resp.status().is_success() {
                return Err(WorkerError::VenueReject {
                    code: resp.status().as_u16().to_string(),
                    msg: "order rejected".into(),
                });
            }
            ids.push(order.client_order_id);
        }
        Ok(ids)
    }

    async fn cancel_batch(
        &self,
        _account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError> {
        let mut canceled = Vec::with_capacity(order_ids.len());
        for order_id in order_ids {
            let params = vec![("origClientOrderId", order_id.clone())];
            let query = self.signed_query(&params)?;
            let url = format!("{}/api/v3/order?{}", self.base_rest_url, query);
            let resp = self
                .client
                .delete(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| WorkerError::Transport(e.to_string()))?;
            if resp.status().is_success() {
                canceled.push(order_id);
            }
        }
        Ok(canceled)
    }

    async fn fetch_position_metadata(
        &self,
        _account_id: &str,
        _symbol: &str,
    ) -> Result<PositionMetadata, WorkerError> {
        Ok(PositionMetadata { leverage: 1.0, is_hedged: false })
    }

    async fn set_leverage(
        &self,
        _account_id: &str,
        symbol: &str,
        leverage: f64,
    ) -> Result<bool, WorkerError> {
        let params = vec![("symbol", symbol.to_string()), ("leverage", (leverage as i64).to_string())];
        let query = self.signed_query(&params)?;
        let url = format!("{}/fapi/v1/leverage?{}", self.base_rest_url, query);
        let resp = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    fn public_ws_url(&self) -> String {
        format!("{}/stream", self.base_ws_url)
    }

    fn private_ws_url(&self, _account_id: &str) -> String {
        format!("{}/ws", self.base_ws_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_query_appends_timestamp_and_signature() {
        let adapter = CexDerivativesAdapter::new(
            "https://example.invalid",
            "wss://example.invalid",
            "key",
            "secret",
        );
        let query = adapter.signed_query(&[("symbol", "BTCUSDT".into())]).unwrap();
        assert!(query.contains("symbol=BTCUSDT"));
        assert!(query.contains("timestamp="));
        assert!(query.contains("signature="));
    }
}

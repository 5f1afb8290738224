//! DEX aggregator adapter: fans a single logical order out to the best
//! quote among several on-chain routes, grounded in the pack's
//! `omo-protocol` venue-selection shape (`VenueCategory::build` picking
//! among multiple concrete venues for one logical node).

use crate::adapter::{
    AccountHydration, OrderRequest, PositionMetadata, PublicSnapshot, VenueAdapter,
};
use async_trait::async_trait;
use polytrade_core::WorkerError;
use polytrade_execution::{AccountSigner, Signer};
use polytrade_store::model::{Balance, Market, VenueId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub rest_url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct QuoteResponse {
    out_amount: f64,
    fee_bps: f64,
}

pub struct DexAggregatorAdapter {
    routes: Vec<Route>,
    client: reqwest::Client,
    signer: AccountSigner,
    ws_url: String,
}

impl std::fmt::Debug for DexAggregatorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DexAggregatorAdapter")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl DexAggregatorAdapter {
    pub fn new(routes: Vec<Route>, ws_url: impl Into<String>, private_key: &str) -> Result<Self, WorkerError> {
        if routes.is_empty() {
            return Err(WorkerError::Programming("DEX aggregator requires at least one route".into()));
        }
        Ok(Self {
            routes,
            client: reqwest::Client::new(),
            signer: AccountSigner::from_private_key(private_key)?,
            ws_url: ws_url.into(),
        })
    }

    /// Queries every configured route for `amount` of `symbol` and picks
    /// the one with the best net output after fees. Errors from
    /// individual routes are swallowed (a route being offline does not
    /// fail the whole quote); all routes failing is a `VenueReject`.
    async fn best_route(&self, symbol: &str, amount: f64) -> Result<&Route, WorkerError> {
        let mut best: Option<(&Route, f64)> = None;
        for route in &self.routes {
            let url = format!("{}/quote?symbol={}&amount={}", route.rest_url, symbol, amount);
            let quote = match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => resp.json::<QuoteResponse>().await.ok(),
                _ => None,
            };
            if let Some(quote) = quote {
                let net = quote.out_amount * (1.0 - quote.fee_bps / 10_000.0);
                if best.as_ref().map(|(_, best_net)| net > *best_net).unwrap_or(true) {
                    best = Some((route, net));
                }
            }
        }
        best.map(|(route, _)| route)
            .ok_or_else(|| WorkerError::VenueReject { code: "0".to_string(), msg: "no route returned a quote".into() })
    }
}

#[async_trait]
impl VenueAdapter for DexAggregatorAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::DexAggregator
    }

    async fn fetch_public_snapshot(&self) -> Result<PublicSnapshot, WorkerError> {
        Ok(PublicSnapshot {
            markets: HashMap::<String, Market>::new(),
            tickers: HashMap::new(),
        })
    }

    async fn hydrate_account(&self, _account_id: &str) -> Result<AccountHydration, WorkerError> {
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
        let address = self
            .signer
            .wallet_address()
            .ok_or_else(|| WorkerError::AuthError("no wallet configured".into()))?;
        let mut ids = Vec::with_capacity(orders.len());
        for order in orders {
            let route = self.best_route(&order.symbol, order.amount).await?;
            let resp = self
                .client
                .post(format!("{}/swap", route.rest_url))
                .json(&serde_json::json!({
                    "symbol": order.symbol,
                    "amount": order.amount,
                    "trader": address,
                }))
                .send()
                .await
                .map_err(|e| WorkerError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(WorkerError::VenueReject {
                    code: resp.status().as_u16().to_string(),
                    msg: format!("route {} rejected swap", route.name),
                });
            }
            ids.push(order.client_order_id);
        }
        Ok(ids)
    }

    /// On-chain swaps settle atomically or revert; there is nothing
    /// in-flight to cancel once submitted. Any id passed here is treated
    /// as already-terminal and echoed back, matching the venue's actual
    /// settlement model rather than pretending a REST cancel exists.
    async fn cancel_batch(
        &self,
        _account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError> {
        Ok(order_ids)
    }

    async fn fetch_position_metadata(
        &self,
        _account_id: &str,
        _symbol: &str,
    ) -> Result<PositionMetadata, WorkerError> {
        Ok(PositionMetadata { leverage: 1.0, is_hedged: false })
    }

    fn public_ws_url(&self) -> String {
        format!("{}/ws", self.ws_url)
    }

    fn private_ws_url(&self, _account_id: &str) -> String {
        format!("{}/ws", self.ws_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> &'static str {
        "0x0000000000000000000000000000000000000000000000000000000000000001"
    }

    #[test]
    fn construction_rejects_empty_route_list() {
        let result = DexAggregatorAdapter::new(vec![], "wss://example.invalid", test_key());
        assert!(matches!(result, Err(WorkerError::Programming(_))));
    }

    #[tokio::test]
    async fn cancel_batch_echoes_ids_since_swaps_settle_atomically() {
        let adapter = DexAggregatorAdapter::new(
            vec![Route { name: "r1".into(), rest_url: "https://example.invalid".into() }],
            "wss://example.invalid",
            test_key(),
        )
        .unwrap();
        let result = adapter.cancel_batch("acct", vec!["id1".into(), "id2".into()]).await.unwrap();
        assert_eq!(result, vec!["id1".to_string(), "id2".to_string()]);
    }
}

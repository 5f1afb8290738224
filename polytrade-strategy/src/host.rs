//! The seam a strategy instance calls back into. Implemented by the
//! worker so TWAP/Chase never depend on `polytrade-worker` directly
//! (the worker depends on the strategy engines, not the reverse).

use async_trait::async_trait;
use polytrade_core::WorkerError;
use polytrade_store::model::{Market, Position, Side, Ticker};

#[derive(Debug, Clone)]
pub struct StrategyOrderRequest {
    pub symbol: String,
    pub side: polytrade_store::model::OrderSide,
    pub kind: polytrade_store::model::OrderType,
    pub price: Option<f64>,
    pub amount: f64,
    pub reduce_only: bool,
    pub time_in_force: Option<polytrade_store::model::TimeInForce>,
}

#[async_trait]
pub trait StrategyHost: Send + Sync {
    /// Places one or more orders for `account_id`, returning venue order
    /// ids in input order — the same contract §4.4 gives the pipeline.
    async fn place_orders(
        &self,
        account_id: &str,
        orders: Vec<StrategyOrderRequest>,
    ) -> Result<Vec<String>, WorkerError>;

    async fn cancel_orders(
        &self,
        account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError>;

    fn market(&self, symbol: &str) -> Option<Market>;

    fn position(&self, account_id: &str, symbol: &str, side: Side) -> Option<Position>;

    fn ticker(&self, symbol: &str) -> Option<Ticker>;

    /// Mirrors the instance's current `TwapState`/`ChaseState` to
    /// `private.<accountId>.twaps[.]`/`chases[.]` via the host's own
    /// mutation-command plumbing.
    fn mirror_twap(&self, account_id: &str, state: polytrade_store::model::TwapState);

    fn mirror_chase(&self, account_id: &str, state: polytrade_store::model::ChaseState);

    /// Removes the instance's mirrored state on completion/stop.
    fn unmirror_twap(&self, account_id: &str, id: &str);

    fn unmirror_chase(&self, account_id: &str, id: &str);
}

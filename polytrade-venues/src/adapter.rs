//! The seam between a worker and the venue-specific wire format: the
//! worker core names its commands against this trait, never against a
//! concrete venue, the way `omo-protocol`'s `Venue` trait decouples its
//! node execution loop from the category that builds it.

use async_trait::async_trait;
use polytrade_core::WorkerError;
use polytrade_store::model::{
    Balance, Candle, Fill, Market, Notification, Order, OrderBook, Position, Ticker, VenueId,
};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct PublicSnapshot {
    pub markets: HashMap<String, Market>,
    pub tickers: HashMap<String, Ticker>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountHydration {
    pub balance: Balance,
    pub positions: Vec<Position>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: polytrade_store::model::OrderSide,
    pub kind: polytrade_store::model::OrderType,
    pub price: Option<f64>,
    pub amount: f64,
    pub reduce_only: bool,
    pub time_in_force: Option<polytrade_store::model::TimeInForce>,
}

#[derive(Debug, Clone)]
pub struct OrderUpdateRequest {
    pub order_id: String,
    pub price: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionMetadata {
    pub leverage: f64,
    pub is_hedged: bool,
}

/// A parsed message off a venue's public socket. Stream-style `Candle`/
/// `OrderBook` variants are forwarded to the host as-is (§6: not part of
/// the mutation store); `Ticker` drives the worker's ticker-delta
/// propagation (§4.3).
#[derive(Debug, Clone)]
pub enum PublicStreamEvent {
    Ticker(Ticker),
    Candle { symbol: String, candle: Candle },
    OrderBook { symbol: String, book: OrderBook },
}

/// A parsed message off an account's private socket.
#[derive(Debug, Clone)]
pub enum PrivateStreamEvent {
    Positions(Vec<Position>),
    Orders(Vec<Order>),
    Balance(Balance),
    Notification(Notification),
}

/// One implementation per venue kind (§1: CEX derivatives, decentralized
/// perps, prediction-market CLOB, DEX aggregator). The worker never
/// branches on venue identity beyond selecting which adapter to hold.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue_id(&self) -> VenueId;

    async fn fetch_public_snapshot(&self) -> Result<PublicSnapshot, WorkerError>;

    async fn hydrate_account(&self, account_id: &str) -> Result<AccountHydration, WorkerError>;

    async fn submit_batch(
        &self,
        account_id: &str,
        orders: Vec<OrderRequest>,
    ) -> Result<Vec<String>, WorkerError>;

    async fn cancel_batch(
        &self,
        account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError>;

    /// Default: amendment unsupported. Venues that support it (none of
    /// the four concrete adapters here do) override this.
    async fn update_batch(
        &self,
        _account_id: &str,
        _updates: Vec<OrderUpdateRequest>,
    ) -> Result<Vec<String>, WorkerError> {
        Err(WorkerError::Unsupported("updateOrders".into()))
    }

    async fn fetch_position_metadata(
        &self,
        _account_id: &str,
        _symbol: &str,
    ) -> Result<PositionMetadata, WorkerError> {
        Ok(PositionMetadata {
            leverage: 1.0,
            is_hedged: false,
        })
    }

    async fn set_leverage(
        &self,
        _account_id: &str,
        _symbol: &str,
        _leverage: f64,
    ) -> Result<bool, WorkerError> {
        Ok(false)
    }

    fn public_ws_url(&self) -> String;

    fn private_ws_url(&self, account_id: &str) -> String;

    /// Opens the venue's public stream and returns a channel of parsed
    /// events. Bit-exact subscription-envelope parsing is per-venue wire
    /// shaping (§1 Non-goal: "mechanical glue, not design"); the default
    /// returns a channel whose sender is dropped immediately, so a worker
    /// built on an adapter without a live implementation simply sees no
    /// further public ticks (its snapshot from `fetch_public_snapshot`
    /// still stands).
    async fn open_public_stream(&self) -> Result<mpsc::UnboundedReceiver<PublicStreamEvent>, WorkerError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }

    /// Opens an account's private stream (fills, position/balance/order
    /// pushes). Same default-empty rationale as `open_public_stream`.
    async fn open_private_stream(
        &self,
        _account_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<PrivateStreamEvent>, WorkerError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }
}

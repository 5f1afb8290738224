//! # Data model
//!
//! The full shape of a venue's in-memory shard: public market caches, and
//! one [`AccountShard`] per account the worker has been told to track.
//! Every type here is plain data — `Serialize`/`Deserialize` so it can cross
//! the worker→host channel as a JSON leaf value carried by a [`crate::Command`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which of the four venue kinds a worker is wired to. Distinct from the
/// venue *name* (the string key under which a [`crate::Store`] indexes
/// shards) — two accounts on the same exchange share a `VenueId` but a
/// deployment names each worker instance independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum VenueId {
    /// Centralized crypto derivatives exchange (HMAC-signed REST/WS).
    Cex,
    /// Decentralized perpetuals venue (wallet-signed REST).
    DexPerp,
    /// Prediction-market CLOB (EIP-712 + HMAC L2 auth).
    ClobPm,
    /// Heterogeneous on-chain DEX aggregator.
    DexAggregator,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Cex => "cex",
            VenueId::DexPerp => "dex_perp",
            VenueId::ClobPm => "clob_pm",
            VenueId::DexAggregator => "dex_aggregator",
        }
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic load flags: become `true` after the first successful public
/// snapshot, may briefly flip back to `false` during a full reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Loaded {
    pub markets: bool,
    pub tickers: bool,
}

/// A venue's full in-memory state: public caches plus one shard per account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VenueShard {
    pub loaded: Loaded,
    pub public: PublicState,
    pub private: IndexMap<String, AccountShard>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PublicState {
    pub latency: f64,
    pub tickers: IndexMap<String, Ticker>,
    pub markets: IndexMap<String, Market>,
}

/// Per-{Yes,No} price set carried only by prediction-market tickers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct PolymarketSide {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub mark: f64,
    pub index: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct PolymarketTicker {
    pub yes: PolymarketSide,
    pub no: PolymarketSide,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Ticker {
    pub id: String,
    pub exchange: String,
    pub symbol: String,
    pub clean_symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub mark: f64,
    pub index: f64,
    pub percentage: f64,
    pub open_interest: f64,
    pub funding_rate: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub polymarket: Option<PolymarketTicker>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct AmountPrecision {
    pub amount: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct AmountLimit {
    pub min: f64,
    pub max: f64,
    pub max_market: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct LeverageLimit {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct MarketLimits {
    pub amount: AmountLimit,
    pub leverage: LeverageLimit,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Market {
    pub id: String,
    pub exchange: String,
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub active: bool,
    pub precision: AmountPrecision,
    pub limits: MarketLimits,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
    TrailingStopMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    PostOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub used: f64,
    pub free: f64,
    pub total: f64,
    pub upnl: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub exchange: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub notional: f64,
    pub leverage: f64,
    pub upnl: f64,
    pub rpnl: f64,
    pub contracts: f64,
    pub liquidation_price: f64,
    #[serde(default)]
    pub is_hedged: Option<bool>,
}

impl Position {
    /// Recompute `notional`/`upnl` from a fresh `last` price (§4.3 "ticker
    /// delta propagation"). Long notional and Short notional are both the
    /// positive magnitude `last * contracts`; upnl flips sign by side.
    pub fn recompute_from_last(&mut self, last: f64) {
        self.notional = last * self.contracts;
        let raw = (last - self.entry_price) * self.contracts;
        self.upnl = match self.side {
            Side::Long => raw,
            Side::Short => -raw,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: String,
    pub exchange: String,
    pub account_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub status: OrderStatus,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: OrderType,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub filled: f64,
    pub remaining: f64,
    pub reduce_only: bool,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationFillData {
    pub id: String,
    pub side: OrderSide,
    pub amount: f64,
    pub symbol: String,
    /// `"MARKET"` or a numeric fill price, per spec's `price|"MARKET"` leaf.
    pub price: FillPrice,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FillPrice {
    Numeric(f64),
    Market(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Notification {
    pub id: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: NotificationFillData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TwapStatus {
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TwapState {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub amount: f64,
    pub amount_executed: f64,
    pub lots: Vec<f64>,
    pub side: OrderSide,
    pub status: TwapStatus,
    pub lots_count: usize,
    pub lots_executed: usize,
    /// Unix millis of the next scheduled lot submission.
    pub next_order_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ChaseStatus {
    Active,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChaseState {
    pub id: String,
    pub account_id: String,
    pub side: OrderSide,
    pub symbol: String,
    pub max: f64,
    pub min: f64,
    pub amount: f64,
    pub price: f64,
    #[serde(default)]
    pub stalk: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AccountMetadata {
    pub leverage: IndexMap<String, f64>,
    pub hedged_position: IndexMap<String, bool>,
}

/// A single execution report for a previously-placed order. Distinct from
/// [`Notification`], which is the append-only user-facing fill stream;
/// `fills` is the venue's raw execution-report history for the order book.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fill {
    pub id: String,
    pub order_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub fee: f64,
    pub timestamp: i64,
}

/// Stream-style output, not part of the mutation store (§6: `candle{candle}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub amount: f64,
}

/// Stream-style output, not part of the mutation store (§6: `orderBook{symbol, orderBook}`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AccountShard {
    pub balance: Balance,
    pub positions: Vec<Position>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
    pub notifications: Vec<Notification>,
    pub twaps: Vec<TwapState>,
    pub chases: Vec<ChaseState>,
    pub metadata: AccountMetadata,
}

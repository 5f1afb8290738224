//! Inbound command envelope: the tagged union a worker's single task loop
//! accepts. The dispatcher matches every variant — an unhandled tag is a
//! compile error, not a runtime surprise.

use polytrade_core::WorkerConfig;
use polytrade_store::model::{OrderSide, OrderType, TimeInForce};
use polytrade_strategy::{ChaseOpts, TwapOpts};
use serde::{Deserialize, Serialize};

pub type RequestId = String;

/// One order leg of a `PlaceOrders` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub kind: OrderType,
    pub price: Option<f64>,
    pub amount: f64,
    pub reduce_only: bool,
    pub time_in_force: Option<TimeInForce>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdateSpec {
    pub order_id: String,
    pub price: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    Start {
        accounts: Vec<String>,
        config: WorkerConfig,
        request_id: RequestId,
    },
    AddAccounts {
        accounts: Vec<String>,
        request_id: Option<RequestId>,
    },
    RemoveAccount {
        account_id: String,
        request_id: RequestId,
    },
    /// Fire-and-forget: never produces a `response`.
    Stop,
    FetchOhlcv {
        symbol: String,
        timeframe: String,
        request_id: RequestId,
    },
    ListenOhlcv {
        symbol: String,
        timeframe: String,
    },
    UnlistenOhlcv {
        symbol: String,
        timeframe: String,
    },
    ListenOb {
        symbol: String,
    },
    UnlistenOb {
        symbol: String,
    },
    PlaceOrders {
        account_id: String,
        orders: Vec<OrderSpec>,
        #[serde(default)]
        priority: bool,
        request_id: RequestId,
    },
    UpdateOrders {
        account_id: String,
        updates: Vec<OrderUpdateSpec>,
        #[serde(default)]
        priority: bool,
        request_id: RequestId,
    },
    CancelOrders {
        account_id: String,
        order_ids: Vec<String>,
        #[serde(default)]
        priority: bool,
        request_id: RequestId,
    },
    CancelSymbolOrders {
        account_id: String,
        symbol: String,
        request_id: RequestId,
    },
    CancelAllOrders {
        account_id: String,
        request_id: RequestId,
    },
    FetchPositionMetadata {
        account_id: String,
        symbol: String,
        request_id: RequestId,
    },
    SetLeverage {
        account_id: String,
        symbol: String,
        leverage: f64,
        request_id: RequestId,
    },
    PlacePositionStop {
        account_id: String,
        symbol: String,
        stop_price: f64,
        request_id: RequestId,
    },
    StartTwap {
        account_id: String,
        twap: TwapOpts,
        request_id: Option<RequestId>,
    },
    PauseTwap {
        account_id: String,
        id: String,
    },
    ResumeTwap {
        account_id: String,
        id: String,
    },
    StopTwap {
        account_id: String,
        id: String,
    },
    StartChase {
        account_id: String,
        chase: ChaseOpts,
        request_id: Option<RequestId>,
    },
    StopChase {
        account_id: String,
        id: String,
    },
}

//! Outbound event envelope: the tagged union a worker emits. `Update`
//! carries the mutation stream (every path already prefixed with the
//! venue name); `Response` is the one-per-request-command reply;
//! `Candle`/`OrderBook` are stream-style outputs outside the store.

use crate::command::RequestId;
use polytrade_store::model::{Candle, OrderBook};
use polytrade_store::Command;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerEvent {
    Update { changes: Vec<Command> },
    Response { request_id: RequestId, data: Option<serde_json::Value> },
    Log { message: String },
    Error { error: String },
    Candle { symbol: String, candle: Candle },
    OrderBook { symbol: String, order_book: OrderBook },
}

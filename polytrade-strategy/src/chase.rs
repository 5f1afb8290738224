//! Reactive post-only quoting that chases the top of book until filled,
//! canceled, or stopped. Exactly one resting order exists at any time.

use crate::host::{StrategyHost, StrategyOrderRequest};
use polytrade_store::model::{
    ChaseState, ChaseStatus, Notification, OrderSide, OrderType, Ticker, TimeInForce,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaseOpts {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub min: f64,
    pub max: f64,
    /// Percent of price, e.g. `0.5` for half a percent.
    pub distance: f64,
    pub reduce_only: bool,
    pub stalk: Option<bool>,
    pub infinite: Option<bool>,
}

#[derive(Debug)]
pub enum ChaseControl {
    Stop,
}

/// Pure target-price rule: base reference is `ask` for Buy / `bid` for
/// Sell; `stalk` quotes behind the touch by `distance`%, otherwise at the
/// touch by one `price_tick`; clamped to `[min, max]` unless `infinite`.
pub fn target_price(opts: &ChaseOpts, ticker: &Ticker, price_tick: f64) -> f64 {
    let reference = match opts.side {
        OrderSide::Buy => ticker.ask,
        OrderSide::Sell => ticker.bid,
    };
    let sign = match opts.side {
        OrderSide::Buy => -1.0,
        OrderSide::Sell => 1.0,
    };
    let raw = if opts.stalk.unwrap_or(false) {
        reference + sign * (opts.distance / 100.0) * reference
    } else {
        reference + sign * price_tick
    };
    let rounded = round_to_tick(raw, price_tick);
    if opts.infinite.unwrap_or(false) {
        rounded
    } else {
        rounded.clamp(opts.min, opts.max)
    }
}

fn round_to_tick(value: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return value;
    }
    (value / tick).round() * tick
}

#[derive(Debug)]
pub struct ChaseEngine {
    id: String,
    account_id: String,
    opts: ChaseOpts,
    price_tick: f64,
    current_order_id: Option<String>,
    current_price: Option<f64>,
    status: ChaseStatus,
}

impl ChaseEngine {
    pub fn new(id: String, account_id: String, opts: ChaseOpts, price_tick: f64) -> Self {
        Self {
            id,
            account_id,
            opts,
            price_tick,
            current_order_id: None,
            current_price: None,
            status: ChaseStatus::Active,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state_mirror(&self) -> ChaseState {
        ChaseState {
            id: self.id.clone(),
            account_id: self.account_id.clone(),
            side: self.opts.side,
            symbol: self.opts.symbol.clone(),
            max: self.opts.max,
            min: self.opts.min,
            amount: self.opts.amount,
            price: self.current_price.unwrap_or(0.0),
            stalk: self.opts.stalk,
        }
    }

    fn order_matches_fill(&self, notification: &Notification) -> bool {
        self.current_order_id.as_deref() == Some(notification.data.id.as_str())
    }

    /// Cancels-then-places at `target`, retrying the place immediately if
    /// the venue rejects it (an empty id list), per the engine's
    /// concurrency discipline.
    async fn retarget(&mut self, host: &dyn StrategyHost, target: f64) {
        if let Some(order_id) = self.current_order_id.take() {
            let _ = host.cancel_orders(&self.account_id, vec![order_id]).await;
        }
        loop {
            let order = StrategyOrderRequest {
                symbol: self.opts.symbol.clone(),
                side: self.opts.side,
                kind: OrderType::Limit,
                price: Some(target),
                amount: self.opts.amount,
                reduce_only: self.opts.reduce_only,
                time_in_force: Some(TimeInForce::PostOnly),
            };
            match host.place_orders(&self.account_id, vec![order]).await {
                Ok(ids) if !ids.is_empty() => {
                    self.current_order_id = Some(ids[0].clone());
                    self.current_price = Some(target);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(chase = %self.id, error = %e, "place failed, retrying");
                    continue;
                }
            }
        }
        host.mirror_chase(&self.account_id, self.state_mirror());
    }

    async fn stop(&mut self, host: &dyn StrategyHost) {
        self.status = ChaseStatus::Stopped;
        if let Some(order_id) = self.current_order_id.take() {
            let _ = host.cancel_orders(&self.account_id, vec![order_id]).await;
        }
        host.unmirror_chase(&self.account_id, &self.id);
    }

    pub async fn run(
        mut self,
        host: Arc<dyn StrategyHost>,
        mut ticker_rx: watch::Receiver<Ticker>,
        mut notify_rx: mpsc::Receiver<Notification>,
        mut control: mpsc::Receiver<ChaseControl>,
    ) {
        {
            let ticker = ticker_rx.borrow_and_update().clone();
            let target = target_price(&self.opts, &ticker, self.price_tick);
            self.retarget(host.as_ref(), target).await;
        }

        loop {
            tokio::select! {
                changed = ticker_rx.changed() => {
                    if changed.is_err() {
                        self.stop(host.as_ref()).await;
                        return;
                    }
                    let ticker = ticker_rx.borrow_and_update().clone();
                    let target = target_price(&self.opts, &ticker, self.price_tick);
                    if self.current_price != Some(target) {
                        self.retarget(host.as_ref(), target).await;
                    }
                }
                notification = notify_rx.recv() => {
                    match notification {
                        Some(n) if self.order_matches_fill(&n) => {
                            self.stop(host.as_ref()).await;
                            return;
                        }
                        Some(_) => continue,
                        None => {
                            self.stop(host.as_ref()).await;
                            return;
                        }
                    }
                }
                msg = control.recv() => {
                    match msg {
                        Some(ChaseControl::Stop) | None => {
                            self.stop(host.as_ref()).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use polytrade_store::model::{FillPrice, Market, NotificationFillData, Position, Side};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn ticker_with_ask_bid(ask: f64, bid: f64) -> Ticker {
        Ticker { ask, bid, ..Default::default() }
    }

    #[test]
    fn buy_stalk_targets_half_percent_behind_the_ask() {
        let opts = ChaseOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            amount: 1.0,
            min: 0.0,
            max: 1_000_000.0,
            distance: 0.5,
            reduce_only: false,
            stalk: Some(true),
            infinite: Some(true),
        };
        let ticker = ticker_with_ask_bid(100.00, 99.90);
        assert!((target_price(&opts, &ticker, 0.01) - 99.50).abs() < 1e-9);

        let ticker = ticker_with_ask_bid(100.20, 100.10);
        assert!((target_price(&opts, &ticker, 0.01) - 99.70).abs() < 1e-9);
    }

    #[test]
    fn non_stalk_targets_one_tick_through_the_touch() {
        let opts = ChaseOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Sell,
            amount: 1.0,
            min: 0.0,
            max: 1_000_000.0,
            distance: 0.5,
            reduce_only: false,
            stalk: Some(false),
            infinite: Some(true),
        };
        let ticker = ticker_with_ask_bid(100.00, 99.90);
        assert!((target_price(&opts, &ticker, 0.01) - 99.91).abs() < 1e-9);
    }

    #[test]
    fn finite_band_clamps_the_target() {
        let opts = ChaseOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            amount: 1.0,
            min: 99.60,
            max: 99.80,
            distance: 0.5,
            reduce_only: false,
            stalk: Some(true),
            infinite: Some(false),
        };
        let ticker = ticker_with_ask_bid(100.00, 99.90);
        assert_eq!(target_price(&opts, &ticker, 0.01), 99.60);
    }

    #[derive(Default)]
    struct MockHost {
        place_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
        unmirrored: Mutex<bool>,
        next_order_id: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StrategyHost for MockHost {
        async fn place_orders(
            &self,
            _account_id: &str,
            _orders: Vec<StrategyOrderRequest>,
        ) -> Result<Vec<String>, polytrade_core::WorkerError> {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            let mut queued = self.next_order_id.lock().unwrap();
            if queued.is_empty() {
                Ok(vec![format!("order-{}", self.place_calls.load(Ordering::SeqCst))])
            } else {
                Ok(vec![queued.remove(0)])
            }
        }

        async fn cancel_orders(
            &self,
            _account_id: &str,
            order_ids: Vec<String>,
        ) -> Result<Vec<String>, polytrade_core::WorkerError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(order_ids)
        }

        fn market(&self, _symbol: &str) -> Option<Market> {
            None
        }

        fn position(&self, _account_id: &str, _symbol: &str, _side: Side) -> Option<Position> {
            None
        }

        fn ticker(&self, _symbol: &str) -> Option<Ticker> {
            None
        }

        fn mirror_twap(&self, _account_id: &str, _state: polytrade_store::model::TwapState) {}

        fn mirror_chase(&self, _account_id: &str, _state: ChaseState) {}

        fn unmirror_twap(&self, _account_id: &str, _id: &str) {}

        fn unmirror_chase(&self, _account_id: &str, _id: &str) {
            *self.unmirrored.lock().unwrap() = true;
        }
    }

    fn chase_opts() -> ChaseOpts {
        ChaseOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            amount: 1.0,
            min: 0.0,
            max: 1_000_000.0,
            distance: 0.5,
            reduce_only: false,
            stalk: Some(true),
            infinite: Some(true),
        }
    }

    #[tokio::test]
    async fn retargets_on_ticker_change_and_stops_on_matching_fill() {
        let mock = Arc::new(MockHost::default());
        let host: Arc<dyn StrategyHost> = mock.clone();
        let engine = ChaseEngine::new("chase-1".into(), "acct-1".into(), chase_opts(), 0.01);

        let (ticker_tx, ticker_rx) = watch::channel(ticker_with_ask_bid(100.00, 99.90));
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (_control_tx, control_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move { engine.run(host, ticker_rx, notify_rx, control_rx).await });

        tokio::task::yield_now().await;
        ticker_tx.send(ticker_with_ask_bid(100.20, 100.10)).unwrap();
        tokio::task::yield_now().await;

        notify_tx
            .send(Notification {
                id: "n1".into(),
                account_id: "acct-1".into(),
                kind: "fill".into(),
                data: NotificationFillData {
                    id: "order-2".into(),
                    side: OrderSide::Buy,
                    amount: 1.0,
                    symbol: "BTC-PERP".into(),
                    price: FillPrice::Numeric(99.70),
                },
            })
            .await
            .unwrap();

        handle.await.unwrap();

        assert!(*mock.unmirrored.lock().unwrap());
        assert!(mock.place_calls.load(Ordering::SeqCst) >= 2);
        assert!(mock.cancel_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn control_stop_cancels_the_resting_order() {
        let mock = Arc::new(MockHost::default());
        let host: Arc<dyn StrategyHost> = mock.clone();
        let engine = ChaseEngine::new("chase-2".into(), "acct-1".into(), chase_opts(), 0.01);

        let (_ticker_tx, ticker_rx) = watch::channel(ticker_with_ask_bid(100.00, 99.90));
        let (_notify_tx, notify_rx) = mpsc::channel(4);
        let (control_tx, control_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move { engine.run(host, ticker_rx, notify_rx, control_rx).await });
        tokio::task::yield_now().await;
        control_tx.send(ChaseControl::Stop).await.unwrap();
        handle.await.unwrap();

        assert!(*mock.unmirrored.lock().unwrap());
        assert_eq!(mock.cancel_calls.load(Ordering::SeqCst), 1);
    }
}

//! Time-sliced execution: a parent order split into `lotsCount` children
//! placed over `duration` minutes, with lot-size jitter and an optional
//! profit pause.

use crate::host::{StrategyHost, StrategyOrderRequest};
use crate::lots::{base_interval_ms, compute_lots, next_fire_at_ms};
use chrono::Utc;
use polytrade_store::model::{OrderSide, OrderType, Side, TwapState, TwapStatus};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapOpts {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub duration_min: f64,
    pub lots_count: usize,
    pub randomness: f64,
    pub reduce_only: bool,
    pub limit_orders: bool,
    pub pause_in_profit: bool,
}

#[derive(Debug)]
pub enum TwapControl {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug)]
pub struct TwapEngine {
    id: String,
    account_id: String,
    opts: TwapOpts,
    lots: Vec<f64>,
    lots_executed: usize,
    amount_executed: f64,
    status: TwapStatus,
    rng: StdRng,
}

impl TwapEngine {
    pub fn new(id: String, account_id: String, opts: TwapOpts, amount_precision: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let lots = compute_lots(opts.amount, opts.lots_count, opts.randomness, amount_precision, &mut rng);
        Self {
            id,
            account_id,
            opts,
            lots,
            lots_executed: 0,
            amount_executed: 0.0,
            status: TwapStatus::Running,
            rng,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state_mirror(&self, next_order_at: i64) -> TwapState {
        TwapState {
            id: self.id.clone(),
            account_id: self.account_id.clone(),
            symbol: self.opts.symbol.clone(),
            amount: self.opts.amount,
            amount_executed: self.amount_executed,
            lots: self.lots.clone(),
            side: self.opts.side,
            status: self.status,
            lots_count: self.opts.lots_count,
            lots_executed: self.lots_executed,
            next_order_at,
        }
    }

    fn position_side(&self) -> Side {
        match self.opts.side {
            OrderSide::Buy => Side::Long,
            OrderSide::Sell => Side::Short,
        }
    }

    /// `true` when this lot must be skipped because `pauseInProfit` is set
    /// and the account is already in profit on this `(symbol, side)`.
    fn should_pause_for_profit(&self, host: &dyn StrategyHost) -> bool {
        if self.opts.reduce_only || !self.opts.pause_in_profit {
            return false;
        }
        host.position(&self.account_id, &self.opts.symbol, self.position_side())
            .map(|p| p.upnl > 0.0)
            .unwrap_or(false)
    }

    /// Drives the instance to completion or until `control` delivers
    /// `Stop`. Terminal state is implicit: once every lot has executed
    /// the instance removes its own mirror and returns.
    pub async fn run(mut self, host: Arc<dyn StrategyHost>, mut control: mpsc::Receiver<TwapControl>) {
        let interval = base_interval_ms(self.opts.duration_min, self.opts.lots_count);
        host.mirror_twap(&self.account_id, self.state_mirror(Utc::now().timestamp_millis() + interval));

        let mut fire_now = false;
        while self.lots_executed < self.lots.len() {
            let now = Utc::now().timestamp_millis();
            let next_at = if fire_now {
                fire_now = false;
                now
            } else {
                next_fire_at_ms(now, interval, self.opts.randomness, &mut self.rng)
            };
            let sleep_ms = (next_at - now).max(0) as u64;
            host.mirror_twap(&self.account_id, self.state_mirror(next_at));

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {
                    if self.should_pause_for_profit(host.as_ref()) {
                        tracing::debug!(twap = %self.id, "skipping lot: position already in profit");
                        continue;
                    }
                    if let Err(e) = self.execute_next_lot(host.as_ref()).await {
                        tracing::warn!(twap = %self.id, error = %e, "lot placement failed, skipping");
                    }
                }
                msg = control.recv() => {
                    match msg {
                        Some(TwapControl::Pause) => {
                            self.status = TwapStatus::Paused;
                            host.mirror_twap(&self.account_id, self.state_mirror(next_at));
                            loop {
                                match control.recv().await {
                                    Some(TwapControl::Resume) => {
                                        self.status = TwapStatus::Running;
                                        fire_now = true;
                                        break;
                                    }
                                    Some(TwapControl::Stop) | None => {
                                        host.unmirror_twap(&self.account_id, &self.id);
                                        return;
                                    }
                                    Some(TwapControl::Pause) => continue,
                                }
                            }
                        }
                        Some(TwapControl::Stop) | None => {
                            host.unmirror_twap(&self.account_id, &self.id);
                            return;
                        }
                        Some(TwapControl::Resume) => {}
                    }
                }
            }
        }

        host.unmirror_twap(&self.account_id, &self.id);
    }

    async fn execute_next_lot(&mut self, host: &dyn StrategyHost) -> Result<(), polytrade_core::WorkerError> {
        let lot_size = self.lots[self.lots_executed];
        let price = if self.opts.limit_orders {
            host.ticker(&self.opts.symbol).map(|t| t.last)
        } else {
            None
        };
        let order = StrategyOrderRequest {
            symbol: self.opts.symbol.clone(),
            side: self.opts.side,
            kind: if self.opts.limit_orders { OrderType::Limit } else { OrderType::Market },
            price,
            amount: lot_size,
            reduce_only: self.opts.reduce_only,
            time_in_force: None,
        };
        host.place_orders(&self.account_id, vec![order]).await?;
        self.lots_executed += 1;
        self.amount_executed += lot_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StrategyOrderRequest;
    use async_trait::async_trait;
    use polytrade_store::model::{Market, Position, Ticker};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockHost {
        placed: Mutex<Vec<StrategyOrderRequest>>,
        mirrored_final: Mutex<Option<TwapState>>,
        unmirrored: Mutex<bool>,
    }

    #[async_trait]
    impl StrategyHost for MockHost {
        async fn place_orders(
            &self,
            _account_id: &str,
            orders: Vec<StrategyOrderRequest>,
        ) -> Result<Vec<String>, polytrade_core::WorkerError> {
            let mut placed = self.placed.lock().unwrap();
            let ids = orders.iter().map(|_| uuid::Uuid::new_v4().to_string()).collect();
            placed.extend(orders);
            Ok(ids)
        }

        async fn cancel_orders(
            &self,
            _account_id: &str,
            order_ids: Vec<String>,
        ) -> Result<Vec<String>, polytrade_core::WorkerError> {
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

        fn mirror_twap(&self, _account_id: &str, state: TwapState) {
            *self.mirrored_final.lock().unwrap() = Some(state);
        }

        fn mirror_chase(&self, _account_id: &str, _state: polytrade_store::model::ChaseState) {}

        fn unmirror_twap(&self, _account_id: &str, _id: &str) {
            *self.unmirrored.lock().unwrap() = true;
        }

        fn unmirror_chase(&self, _account_id: &str, _id: &str) {}
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_placing_every_lot() {
        let mock = Arc::new(MockHost::default());
        let host: Arc<dyn StrategyHost> = mock.clone();
        let opts = TwapOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            amount: 10.0,
            duration_min: 2.0,
            lots_count: 4,
            randomness: 0.1,
            reduce_only: false,
            limit_orders: false,
            pause_in_profit: false,
        };
        let engine = TwapEngine::new("twap-1".into(), "acct-1".into(), opts, 0.0001, 42);
        let (_tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move { engine.run(host, rx).await });

        tokio::time::advance(Duration::from_secs(600)).await;
        handle.await.unwrap();

        let placed = mock.placed.lock().unwrap();
        assert_eq!(placed.len(), 4);
        let total: f64 = placed.iter().map(|o| o.amount).sum();
        assert!((total - 10.0).abs() < 1e-6);
        assert!(*mock.unmirrored.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_control_message_ends_the_run_early() {
        let mock = Arc::new(MockHost::default());
        let host: Arc<dyn StrategyHost> = mock.clone();
        let opts = TwapOpts {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            amount: 10.0,
            duration_min: 10.0,
            lots_count: 4,
            randomness: 0.0,
            reduce_only: false,
            limit_orders: false,
            pause_in_profit: false,
        };
        let engine = TwapEngine::new("twap-2".into(), "acct-1".into(), opts, 0.0001, 7);
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { engine.run(host, rx).await });

        tx.send(TwapControl::Stop).await.unwrap();
        handle.await.unwrap();

        assert!(*mock.unmirrored.lock().unwrap());
        assert!(mock.placed.lock().unwrap().len() < 4);
    }
}

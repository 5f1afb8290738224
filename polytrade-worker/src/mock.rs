//! In-memory venue adapter driving scenario tests without network access.
//! Mirrors the pack's own connector-mock convention (a fake implementation
//! of the real seam trait, not a record/replay harness).

use async_trait::async_trait;
use polytrade_core::WorkerError;
use polytrade_store::model::{Balance, Market, Ticker, VenueId};
use polytrade_venues::adapter::{PublicStreamEvent, VenueAdapter};
use polytrade_venues::{AccountHydration, OrderRequest, OrderUpdateRequest, PositionMetadata, PublicSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A fully scripted, network-free [`VenueAdapter`]. Construct with a fixed
/// public snapshot; call [`MockVenueAdapter::push_ticker`] after
/// [`VenueAdapter::open_public_stream`] has been called once to simulate
/// live ticks, and [`MockVenueAdapter::reject_next_submission`] to exercise
/// the `VenueReject` path.
#[derive(Debug)]
pub struct MockVenueAdapter {
    venue_id: VenueId,
    markets: HashMap<String, Market>,
    tickers: HashMap<String, Ticker>,
    order_counter: AtomicU64,
    public_tx: Mutex<Option<mpsc::UnboundedSender<PublicStreamEvent>>>,
    reject_next: AtomicBool,
}

impl MockVenueAdapter {
    pub fn new(venue_id: VenueId, markets: HashMap<String, Market>, tickers: HashMap<String, Ticker>) -> Self {
        Self {
            venue_id,
            markets,
            tickers,
            order_counter: AtomicU64::new(0),
            public_tx: Mutex::new(None),
            reject_next: AtomicBool::new(false),
        }
    }

    /// Pushes a ticker tick to whichever worker last opened the public
    /// stream. A no-op if nothing is listening.
    pub fn push_ticker(&self, ticker: Ticker) {
        if let Some(tx) = self.public_tx.lock().unwrap().as_ref() {
            let _ = tx.send(PublicStreamEvent::Ticker(ticker));
        }
    }

    pub fn reject_next_submission(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VenueAdapter for MockVenueAdapter {
    fn venue_id(&self) -> VenueId {
        self.venue_id
    }

    async fn fetch_public_snapshot(&self) -> Result<PublicSnapshot, WorkerError> {
        Ok(PublicSnapshot {
            markets: self.markets.clone(),
            tickers: self.tickers.clone(),
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
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(WorkerError::VenueReject {
                code: "400".into(),
                msg: "mock rejection".into(),
            });
        }
        Ok(orders
            .iter()
            .map(|_| format!("mock-{}", self.order_counter.fetch_add(1, Ordering::SeqCst)))
            .collect())
    }

    async fn cancel_batch(
        &self,
        _account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError> {
        Ok(order_ids)
    }

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
        Ok(PositionMetadata { leverage: 1.0, is_hedged: false })
    }

    async fn set_leverage(&self, _account_id: &str, _symbol: &str, _leverage: f64) -> Result<bool, WorkerError> {
        Ok(true)
    }

    fn public_ws_url(&self) -> String {
        "mock://public".into()
    }

    fn private_ws_url(&self, _account_id: &str) -> String {
        "mock://private".into()
    }

    async fn open_public_stream(&self) -> Result<mpsc::UnboundedReceiver<PublicStreamEvent>, WorkerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.public_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

//! The exchange worker core: one task loop per venue, owning a [`Store`]
//! shard, a reconnecting pair of public/private streams, one order queue
//! per account, and any live TWAP/Chase instances for its accounts. Every
//! mutation to shared state happens inside [`Worker::run`]'s own task —
//! nothing here is shared behind a lock held across an `.await`.

use crate::command::{OrderSpec, OrderUpdateSpec, RequestId, WorkerCommand};
use crate::event::WorkerEvent;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use polytrade_core::{WorkerConfig, WorkerError};
use polytrade_execution::queue::{chunk_into_batches, drain, submission_interval, OrderQueue, QueuedBatch};
use polytrade_execution::resolver::{ResolverMap, VenueResponse};
use polytrade_store::model::{
    AccountShard, ChaseState, Order, OrderStatus, Position, Side, Ticker, VenueShard,
};
use polytrade_store::{Command, Path, Store};
use polytrade_strategy::chase::{ChaseControl, ChaseEngine};
use polytrade_strategy::host::{StrategyHost, StrategyOrderRequest};
use polytrade_strategy::twap::{TwapControl, TwapEngine};
use polytrade_venues::adapter::{OrderRequest, OrderUpdateRequest, PrivateStreamEvent, PublicStreamEvent, VenueAdapter};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// One already-chunked submission, shaped for a single venue REST call.
#[derive(Debug, Clone)]
pub enum SubmissionBatch {
    Place(Vec<OrderRequest>),
    Cancel(Vec<String>),
    Update(Vec<OrderUpdateRequest>),
}

/// Where to deliver an order-pipeline aggregate's final result: back to
/// the host as a `response` event, or back to a waiting strategy instance.
enum ResponseTarget {
    External(RequestId),
    Strategy(oneshot::Sender<Result<Vec<String>, WorkerError>>),
}

/// Messages routed back into the single dispatch-loop task. Venue
/// responses arrive from per-account drain tasks; strategy callbacks
/// arrive from [`WorkerHandle`] on behalf of a running TWAP/Chase
/// instance. Both kinds are handled exclusively inside [`Worker::run`].
enum InternalMsg {
    VenueResponse { chunk_id: RequestId, response: VenueResponse },
    StrategyPlace {
        account_id: String,
        orders: Vec<StrategyOrderRequest>,
        reply: oneshot::Sender<Result<Vec<String>, WorkerError>>,
    },
    StrategyCancel {
        account_id: String,
        order_ids: Vec<String>,
        reply: oneshot::Sender<Result<Vec<String>, WorkerError>>,
    },
    MirrorTwap { account_id: String, state: polytrade_store::model::TwapState },
    MirrorChase { account_id: String, state: ChaseState },
    UnmirrorTwap { account_id: String, id: String },
    UnmirrorChase { account_id: String, id: String },
}

type AggregateFuture = Pin<Box<dyn Future<Output = AggregateDone> + Send>>;

enum AggregateDone {
    Place { account_id: String, target: ResponseTarget, chunks: Vec<(Vec<OrderRequest>, VenueResponse)> },
    Cancel { account_id: String, target: ResponseTarget, chunks: Vec<(Vec<String>, VenueResponse)> },
    Update { account_id: String, target: ResponseTarget, chunks: Vec<(Vec<OrderUpdateSpec>, VenueResponse)> },
}

/// Read-only snapshot [`WorkerHandle`]'s synchronous `StrategyHost`
/// accessors serve from, kept in lockstep with every store mutation.
#[derive(Debug, Default)]
struct SharedMarketView {
    tickers: HashMap<String, Ticker>,
    markets: HashMap<String, polytrade_store::model::Market>,
    positions: HashMap<(String, String, Side), Position>,
}

/// The seam TWAP/Chase instances hold. Routes every call back into the
/// worker's single task loop over a channel rather than sharing the
/// worker behind a lock, so no venue I/O ever happens while holding one.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
    shared: Arc<parking_lot::RwLock<SharedMarketView>>,
}

#[async_trait::async_trait]
impl StrategyHost for WorkerHandle {
    async fn place_orders(
        &self,
        account_id: &str,
        orders: Vec<StrategyOrderRequest>,
    ) -> Result<Vec<String>, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.internal_tx
            .send(InternalMsg::StrategyPlace { account_id: account_id.to_string(), orders, reply })
            .map_err(|_| WorkerError::Programming("worker shut down".into()))?;
        rx.await.map_err(|_| WorkerError::Programming("worker shut down".into()))?
    }

    async fn cancel_orders(
        &self,
        account_id: &str,
        order_ids: Vec<String>,
    ) -> Result<Vec<String>, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.internal_tx
            .send(InternalMsg::StrategyCancel { account_id: account_id.to_string(), order_ids, reply })
            .map_err(|_| WorkerError::Programming("worker shut down".into()))?;
        rx.await.map_err(|_| WorkerError::Programming("worker shut down".into()))?
    }

    fn market(&self, symbol: &str) -> Option<polytrade_store::model::Market> {
        self.shared.read().markets.get(symbol).cloned()
    }

    fn position(&self, account_id: &str, symbol: &str, side: Side) -> Option<Position> {
        self.shared
            .read()
            .positions
            .get(&(account_id.to_string(), symbol.to_string(), side))
            .cloned()
    }

    fn ticker(&self, symbol: &str) -> Option<Ticker> {
        self.shared.read().tickers.get(symbol).cloned()
    }

    fn mirror_twap(&self, account_id: &str, state: polytrade_store::model::TwapState) {
        let _ = self
            .internal_tx
            .send(InternalMsg::MirrorTwap { account_id: account_id.to_string(), state });
    }

    fn mirror_chase(&self, account_id: &str, state: ChaseState) {
        let _ = self
            .internal_tx
            .send(InternalMsg::MirrorChase { account_id: account_id.to_string(), state });
    }

    fn unmirror_twap(&self, account_id: &str, id: &str) {
        let _ = self
            .internal_tx
            .send(InternalMsg::UnmirrorTwap { account_id: account_id.to_string(), id: id.to_string() });
    }

    fn unmirror_chase(&self, account_id: &str, id: &str) {
        let _ = self
            .internal_tx
            .send(InternalMsg::UnmirrorChase { account_id: account_id.to_string(), id: id.to_string() });
    }
}

async fn submit_one(adapter: &dyn VenueAdapter, account_id: &str, batch: SubmissionBatch) -> VenueResponse {
    match batch {
        SubmissionBatch::Place(orders) => adapter.submit_batch(account_id, orders).await,
        SubmissionBatch::Cancel(ids) => adapter.cancel_batch(account_id, ids).await,
        SubmissionBatch::Update(updates) => adapter.update_batch(account_id, updates).await,
    }
}

/// Long-lived consumer for one account's order queue. Never touches the
/// `ResolverMap` — it only executes venue calls and reports raw results
/// back to the dispatch loop over `internal_tx`.
fn spawn_account_drain(
    account_id: String,
    adapter: Arc<dyn VenueAdapter>,
    interval: Duration,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
) -> mpsc::UnboundedSender<QueuedBatch<SubmissionBatch>> {
    let (tx, mut inbox) = mpsc::unbounded_channel::<QueuedBatch<SubmissionBatch>>();
    tokio::spawn(async move {
        let mut queue: OrderQueue<SubmissionBatch> = OrderQueue::new();
        while let Some(first) = inbox.recv().await {
            queue.push(first);
            while let Ok(next) = inbox.try_recv() {
                queue.push(next);
            }
            let account_id = account_id.clone();
            let adapter = adapter.clone();
            let internal_tx = internal_tx.clone();
            drain(&mut queue, interval, move |batch| {
                let account_id = account_id.clone();
                let adapter = adapter.clone();
                let internal_tx = internal_tx.clone();
                async move {
                    let chunk_id = batch.request_id.clone();
                    let response = match batch.items.into_iter().next() {
                        Some(item) => submit_one(adapter.as_ref(), &account_id, item).await,
                        None => Err(WorkerError::Programming("empty submission batch".into())),
                    };
                    let _ = internal_tx.send(InternalMsg::VenueResponse { chunk_id, response });
                }
            })
            .await;
        }
    });
    tx
}

fn build_place_aggregate(
    account_id: String,
    target: ResponseTarget,
    chunks: Vec<(Vec<OrderRequest>, oneshot::Receiver<VenueResponse>)>,
) -> AggregateFuture {
    Box::pin(async move {
        let mut done = Vec::with_capacity(chunks.len());
        for (items, rx) in chunks {
            let result = rx.await.unwrap_or_else(|_| Err(WorkerError::Programming("resolver dropped".into())));
            done.push((items, result));
        }
        AggregateDone::Place { account_id, target, chunks: done }
    })
}

fn build_cancel_aggregate(
    account_id: String,
    target: ResponseTarget,
    chunks: Vec<(Vec<String>, oneshot::Receiver<VenueResponse>)>,
) -> AggregateFuture {
    Box::pin(async move {
        let mut done = Vec::with_capacity(chunks.len());
        for (items, rx) in chunks {
            let result = rx.await.unwrap_or_else(|_| Err(WorkerError::Programming("resolver dropped".into())));
            done.push((items, result));
        }
        AggregateDone::Cancel { account_id, target, chunks: done }
    })
}

fn build_update_aggregate(
    account_id: String,
    target: ResponseTarget,
    chunks: Vec<(Vec<OrderUpdateSpec>, oneshot::Receiver<VenueResponse>)>,
) -> AggregateFuture {
    Box::pin(async move {
        let mut done = Vec::with_capacity(chunks.len());
        for (items, rx) in chunks {
            let result = rx.await.unwrap_or_else(|_| Err(WorkerError::Programming("resolver dropped".into())));
            done.push((items, result));
        }
        AggregateDone::Update { account_id, target, chunks: done }
    })
}

async fn recv_optional<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

/// One venue's exchange worker. Construct with [`Worker::new`], then
/// drive it to completion with [`Worker::run`]; it exits when the host
/// sends `Stop` or drops the command channel.
pub struct Worker {
    venue_name: String,
    adapter: Arc<dyn VenueAdapter>,
    config: WorkerConfig,
    store: Store,
    state: WorkerState,
    inbox: mpsc::Receiver<WorkerCommand>,
    outbox: mpsc::Sender<WorkerEvent>,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
    internal_rx: mpsc::UnboundedReceiver<InternalMsg>,
    resolver: ResolverMap,
    account_queues: HashMap<String, mpsc::UnboundedSender<QueuedBatch<SubmissionBatch>>>,
    pending_aggregates: FuturesUnordered<AggregateFuture>,
    ticker_watches: HashMap<String, watch::Sender<Ticker>>,
    twap_controls: HashMap<(String, String), mpsc::Sender<TwapControl>>,
    chase_controls: HashMap<(String, String), mpsc::Sender<ChaseControl>>,
    chase_notify: HashMap<(String, String), mpsc::Sender<polytrade_store::model::Notification>>,
    shared: Arc<parking_lot::RwLock<SharedMarketView>>,
    public_rx: Option<mpsc::UnboundedReceiver<PublicStreamEvent>>,
    private_streams: StreamMap<String, UnboundedReceiverStream<PrivateStreamEvent>>,
}

impl Worker {
    pub fn new(
        venue_name: String,
        adapter: Arc<dyn VenueAdapter>,
        inbox: mpsc::Receiver<WorkerCommand>,
        outbox: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            venue_name,
            adapter,
            config: WorkerConfig::default(),
            store: Store::new(),
            state: WorkerState::Idle,
            inbox,
            outbox,
            internal_tx,
            internal_rx,
            resolver: ResolverMap::new(),
            account_queues: HashMap::new(),
            pending_aggregates: FuturesUnordered::new(),
            ticker_watches: HashMap::new(),
            twap_controls: HashMap::new(),
            chase_controls: HashMap::new(),
            chase_notify: HashMap::new(),
            shared: Arc::new(parking_lot::RwLock::new(SharedMarketView::default())),
            public_rx: None,
            private_streams: StreamMap::new(),
        }
    }

    fn handle(&self) -> Arc<dyn StrategyHost> {
        Arc::new(WorkerHandle { internal_tx: self.internal_tx.clone(), shared: self.shared.clone() })
    }

    fn venue_path(&self) -> Path {
        Path::key(&self.venue_name)
    }

    async fn emit(&self, event: WorkerEvent) {
        let _ = self.outbox.send(event).await;
    }

    async fn apply_and_emit(&mut self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        if let Err(e) = self.store.apply(&commands) {
            tracing::warn!(venue = %self.venue_name, error = %e, "store apply failed, dropping batch");
            self.emit(WorkerEvent::Error { error: e.to_string() }).await;
            return;
        }
        self.emit(WorkerEvent::Update { changes: commands }).await;
    }

    fn submission_interval(&self) -> Duration {
        submission_interval(self.config.rate_limit, self.config.consume)
    }

    fn account_queue(&mut self, account_id: &str) -> mpsc::UnboundedSender<QueuedBatch<SubmissionBatch>> {
        if let Some(tx) = self.account_queues.get(account_id) {
            return tx.clone();
        }
        let tx = spawn_account_drain(
            account_id.to_string(),
            self.adapter.clone(),
            self.submission_interval(),
            self.internal_tx.clone(),
        );
        self.account_queues.insert(account_id.to_string(), tx.clone());
        tx
    }

    fn next_chunk_id() -> RequestId {
        uuid::Uuid::new_v4().to_string()
    }

    fn order_spec_to_request(spec: &OrderSpec) -> OrderRequest {
        OrderRequest {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            symbol: spec.symbol.clone(),
            side: spec.side,
            kind: spec.kind,
            price: spec.price,
            amount: spec.amount,
            reduce_only: spec.reduce_only,
            time_in_force: spec.time_in_force,
        }
    }

    /// Chunks, registers, and enqueues a `placeOrders`-shaped submission;
    /// returns the pending chunk receivers for the caller to wrap in an
    /// [`AggregateFuture`].
    fn dispatch_place(
        &mut self,
        account_id: &str,
        requests: Vec<OrderRequest>,
        priority: bool,
    ) -> Vec<(Vec<OrderRequest>, oneshot::Receiver<VenueResponse>)> {
        let max_per_batch = self.config.max_orders_per_batch;
        let chunks = chunk_into_batches(requests, max_per_batch, priority, Self::next_chunk_id);
        let queue = self.account_queue(account_id);
        let mut pending = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let rx = self.resolver.register(chunk.request_id.clone());
            let items = chunk.items.clone();
            let _ = queue.send(QueuedBatch {
                request_id: chunk.request_id,
                priority: chunk.priority,
                items: vec![SubmissionBatch::Place(chunk.items)],
            });
            pending.push((items, rx));
        }
        pending
    }

    fn dispatch_cancel(
        &mut self,
        account_id: &str,
        order_ids: Vec<String>,
        priority: bool,
    ) -> Vec<(Vec<String>, oneshot::Receiver<VenueResponse>)> {
        let max_per_batch = self.config.max_orders_per_batch;
        let chunks = chunk_into_batches(order_ids, max_per_batch, priority, Self::next_chunk_id);
        let queue = self.account_queue(account_id);
        let mut pending = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let rx = self.resolver.register(chunk.request_id.clone());
            let items = chunk.items.clone();
            let _ = queue.send(QueuedBatch {
                request_id: chunk.request_id,
                priority: chunk.priority,
                items: vec![SubmissionBatch::Cancel(chunk.items)],
            });
            pending.push((items, rx));
        }
        pending
    }

    fn account_order_ids(&self, account_id: &str) -> Vec<String> {
        self.store
            .venue(&self.venue_name)
            .and_then(|v| v.private.get(account_id).cloned())
            .map(|shard| shard.orders.into_iter().map(|o| o.id).collect())
            .unwrap_or_default()
    }

    fn account_symbol_order_ids(&self, account_id: &str, symbol: &str) -> Vec<String> {
        self.store
            .venue(&self.venue_name)
            .and_then(|v| v.private.get(account_id).cloned())
            .map(|shard| {
                shard
                    .orders
                    .into_iter()
                    .filter(|o| o.symbol == symbol && o.status == OrderStatus::Open)
                    .map(|o| o.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn dispatch(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Start { accounts, config, request_id } => {
                self.state = WorkerState::Starting;
                self.config = config;
                match self.adapter.fetch_public_snapshot().await {
                    Ok(snapshot) => {
                        let shard = VenueShard {
                            loaded: polytrade_store::model::Loaded { markets: true, tickers: true },
                            public: polytrade_store::model::PublicState {
                                latency: 0.0,
                                tickers: snapshot.tickers.clone().into_iter().collect(),
                                markets: snapshot.markets.clone().into_iter().collect(),
                            },
                            private: Default::default(),
                        };
                        {
                            let mut shared = self.shared.write();
                            shared.tickers = snapshot.tickers;
                            shared.markets = snapshot.markets;
                        }
                        self.apply_and_emit(vec![Command::Update {
                            path: self.venue_path(),
                            value: serde_json::to_value(&shard).unwrap_or(serde_json::Value::Null),
                        }])
                        .await;
                        if let Ok(rx) = self.adapter.open_public_stream().await {
                            self.public_rx = Some(rx);
                        }
                        for account_id in accounts {
                            self.add_account(account_id).await;
                        }
                        self.state = WorkerState::Running;
                        self.emit(WorkerEvent::Response { request_id, data: None }).await;
                    }
                    Err(e) => {
                        self.state = WorkerState::Idle;
                        self.emit(WorkerEvent::Error { error: e.to_string() }).await;
                        self.emit(WorkerEvent::Response { request_id, data: None }).await;
                    }
                }
            }
            WorkerCommand::AddAccounts { accounts, request_id } => {
                for account_id in accounts {
                    self.add_account(account_id).await;
                }
                if let Some(request_id) = request_id {
                    self.emit(WorkerEvent::Response { request_id, data: None }).await;
                }
            }
            WorkerCommand::RemoveAccount { account_id, request_id } => {
                self.remove_account(&account_id).await;
                self.emit(WorkerEvent::Response { request_id, data: None }).await;
            }
            WorkerCommand::Stop => {
                self.shutdown().await;
            }
            WorkerCommand::FetchOhlcv { request_id, .. } => {
                self.emit(WorkerEvent::Error {
                    error: "ohlcv history is not exposed by this venue".to_string(),
                })
                .await;
                self.emit(WorkerEvent::Response { request_id, data: Some(serde_json::json!([])) }).await;
            }
            WorkerCommand::ListenOhlcv { .. } | WorkerCommand::UnlistenOhlcv { .. } => {
                // Candle ticks (when a venue's public stream emits them) are
                // forwarded unconditionally; subscription bookkeeping is a
                // host-side filter, not a worker-side one.
            }
            WorkerCommand::ListenOb { .. } | WorkerCommand::UnlistenOb { .. } => {}
            WorkerCommand::PlaceOrders { account_id, orders, priority, request_id } => {
                let requests: Vec<OrderRequest> = orders.iter().map(Self::order_spec_to_request).collect();
                let pending = self.dispatch_place(&account_id, requests, priority);
                self.pending_aggregates.push(build_place_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::UpdateOrders { account_id, updates, priority, request_id } => {
                let max_per_batch = self.config.max_orders_per_batch;
                let venue_updates: Vec<OrderUpdateRequest> = updates
                    .iter()
                    .map(|u| OrderUpdateRequest { order_id: u.order_id.clone(), price: u.price, amount: u.amount })
                    .collect();
                let chunks = chunk_into_batches(venue_updates, max_per_batch, priority, Self::next_chunk_id);
                let spec_chunks = chunk_into_batches(updates, max_per_batch, priority, Self::next_chunk_id);
                let queue = self.account_queue(&account_id);
                let mut pending = Vec::with_capacity(chunks.len());
                for (chunk, spec_chunk) in chunks.into_iter().zip(spec_chunks.into_iter()) {
                    let rx = self.resolver.register(chunk.request_id.clone());
                    let _ = queue.send(QueuedBatch {
                        request_id: chunk.request_id,
                        priority: chunk.priority,
                        items: vec![SubmissionBatch::Update(chunk.items)],
                    });
                    pending.push((spec_chunk.items, rx));
                }
                self.pending_aggregates.push(build_update_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::CancelOrders { account_id, order_ids, priority, request_id } => {
                let pending = self.dispatch_cancel(&account_id, order_ids, priority);
                self.pending_aggregates.push(build_cancel_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::CancelSymbolOrders { account_id, symbol, request_id } => {
                let order_ids = self.account_symbol_order_ids(&account_id, &symbol);
                let pending = self.dispatch_cancel(&account_id, order_ids, false);
                self.pending_aggregates.push(build_cancel_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::CancelAllOrders { account_id, request_id } => {
                let order_ids = self.account_order_ids(&account_id);
                let pending = self.dispatch_cancel(&account_id, order_ids, false);
                self.pending_aggregates.push(build_cancel_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::FetchPositionMetadata { account_id, symbol, request_id } => {
                match self.adapter.fetch_position_metadata(&account_id, &symbol).await {
                    Ok(meta) => {
                        self.emit(WorkerEvent::Response {
                            request_id,
                            data: Some(serde_json::json!({ "leverage": meta.leverage, "isHedged": meta.is_hedged })),
                        })
                        .await;
                    }
                    Err(e) => {
                        self.emit(WorkerEvent::Error { error: e.to_string() }).await;
                        self.emit(WorkerEvent::Response {
                            request_id,
                            data: Some(serde_json::json!({ "leverage": 1.0, "isHedged": false })),
                        })
                        .await;
                    }
                }
            }
            WorkerCommand::SetLeverage { account_id, symbol, leverage, request_id } => {
                match self.adapter.set_leverage(&account_id, &symbol, leverage).await {
                    Ok(applied) => {
                        if applied {
                            let path = self
                                .venue_path()
                                .push_key("private")
                                .push_key(&account_id)
                                .push_key("metadata")
                                .push_key("leverage")
                                .push_key(&symbol);
                            self.apply_and_emit(vec![Command::Update {
                                path,
                                value: serde_json::json!(leverage),
                            }])
                            .await;
                        }
                        self.emit(WorkerEvent::Response {
                            request_id,
                            data: Some(serde_json::json!({ "applied": applied })),
                        })
                        .await;
                    }
                    Err(e) => {
                        self.emit(WorkerEvent::Error { error: e.to_string() }).await;
                        self.emit(WorkerEvent::Response { request_id, data: Some(serde_json::json!(false)) })
                            .await;
                    }
                }
            }
            WorkerCommand::PlacePositionStop { account_id, symbol, stop_price, request_id } => {
                let request = OrderRequest {
                    client_order_id: uuid::Uuid::new_v4().to_string(),
                    symbol,
                    side: polytrade_store::model::OrderSide::Sell,
                    kind: polytrade_store::model::OrderType::StopMarket,
                    price: Some(stop_price),
                    amount: 0.0,
                    reduce_only: true,
                    time_in_force: None,
                };
                let pending = self.dispatch_place(&account_id, vec![request], true);
                self.pending_aggregates.push(build_place_aggregate(
                    account_id,
                    ResponseTarget::External(request_id),
                    pending,
                ));
            }
            WorkerCommand::StartTwap { account_id, twap, request_id } => {
                let id = uuid::Uuid::new_v4().to_string();
                let amount_precision =
                    self.config.min_size.get(&twap.symbol).copied().unwrap_or(0.0001);
                let seed = rand::random::<u64>();
                let engine = TwapEngine::new(id.clone(), account_id.clone(), twap, amount_precision, seed);
                let (control_tx, control_rx) = mpsc::channel(4);
                self.twap_controls.insert((account_id.clone(), id.clone()), control_tx);
                let host = self.handle();
                tokio::spawn(async move { engine.run(host, control_rx).await });
                if let Some(request_id) = request_id {
                    self.emit(WorkerEvent::Response {
                        request_id,
                        data: Some(serde_json::json!({ "id": id })),
                    })
                    .await;
                }
            }
            WorkerCommand::PauseTwap { account_id, id } => {
                if let Some(tx) = self.twap_controls.get(&(account_id, id)) {
                    let _ = tx.send(TwapControl::Pause).await;
                }
            }
            WorkerCommand::ResumeTwap { account_id, id } => {
                if let Some(tx) = self.twap_controls.get(&(account_id, id)) {
                    let _ = tx.send(TwapControl::Resume).await;
                }
            }
            WorkerCommand::StopTwap { account_id, id } => {
                if let Some(tx) = self.twap_controls.get(&(account_id, id)) {
                    let _ = tx.send(TwapControl::Stop).await;
                }
            }
            WorkerCommand::StartChase { account_id, chase, request_id } => {
                let id = uuid::Uuid::new_v4().to_string();
                let price_tick = self.config.tick_size.get(&chase.symbol).copied().unwrap_or(0.01);
                let ticker_rx = self.ticker_watch(&chase.symbol).subscribe();
                let (control_tx, control_rx) = mpsc::channel(4);
                let (notify_tx, notify_rx) = mpsc::channel(16);
                self.chase_controls.insert((account_id.clone(), id.clone()), control_tx);
                self.chase_notify.insert((account_id.clone(), id.clone()), notify_tx);
                let engine = ChaseEngine::new(id.clone(), account_id.clone(), chase, price_tick);
                let host = self.handle();
                tokio::spawn(async move { engine.run(host, ticker_rx, notify_rx, control_rx).await });
                if let Some(request_id) = request_id {
                    self.emit(WorkerEvent::Response {
                        request_id,
                        data: Some(serde_json::json!({ "id": id })),
                    })
                    .await;
                }
            }
            WorkerCommand::StopChase { account_id, id } => {
                if let Some(tx) = self.chase_controls.get(&(account_id, id)) {
                    let _ = tx.send(ChaseControl::Stop).await;
                }
            }
        }
    }

    fn ticker_watch(&mut self, symbol: &str) -> &watch::Sender<Ticker> {
        let initial = self.shared.read().tickers.get(symbol).cloned().unwrap_or_default();
        self.ticker_watches
            .entry(symbol.to_string())
            .or_insert_with(|| watch::channel(initial).0)
    }

    async fn add_account(&mut self, account_id: String) {
        let path = self.venue_path().push_key("private").push_key(&account_id);
        self.apply_and_emit(vec![Command::Update {
            path,
            value: serde_json::to_value(AccountShard::default()).unwrap_or(serde_json::Value::Null),
        }])
        .await;
        match self.adapter.hydrate_account(&account_id).await {
            Ok(hydration) => {
                let mut positions_by_key = Vec::new();
                for p in &hydration.positions {
                    positions_by_key.push((
                        (account_id.clone(), p.symbol.clone(), p.side),
                        p.clone(),
                    ));
                }
                let shard = AccountShard {
                    balance: hydration.balance,
                    positions: hydration.positions,
                    orders: hydration.orders,
                    fills: hydration.fills,
                    notifications: Vec::new(),
                    twaps: Vec::new(),
                    chases: Vec::new(),
                    metadata: Default::default(),
                };
                {
                    let mut shared = self.shared.write();
                    for (key, pos) in positions_by_key {
                        shared.positions.insert(key, pos);
                    }
                }
                let path = self.venue_path().push_key("private").push_key(&account_id);
                self.apply_and_emit(vec![Command::Update {
                    path,
                    value: serde_json::to_value(&shard).unwrap_or(serde_json::Value::Null),
                }])
                .await;
                if let Ok(rx) = self.adapter.open_private_stream(&account_id).await {
                    self.private_streams.insert(account_id.clone(), UnboundedReceiverStream::new(rx));
                }
                self.account_queue(&account_id);
            }
            Err(e) => {
                self.emit(WorkerEvent::Error { error: format!("hydrate {account_id} failed: {e}") }).await;
            }
        }
    }

    async fn remove_account(&mut self, account_id: &str) {
        self.account_queues.remove(account_id);
        self.private_streams.remove(account_id);
        self.shared.write().positions.retain(|(acct, _, _), _| acct != account_id);
        let stale_twaps: Vec<_> = self
            .twap_controls
            .keys()
            .filter(|(a, _)| a == account_id)
            .cloned()
            .collect();
        for key in stale_twaps {
            if let Some(tx) = self.twap_controls.remove(&key) {
                let _ = tx.send(TwapControl::Stop).await;
            }
        }
        let stale_chases: Vec<_> = self
            .chase_controls
            .keys()
            .filter(|(a, _)| a == account_id)
            .cloned()
            .collect();
        for key in stale_chases {
            if let Some(tx) = self.chase_controls.remove(&key) {
                let _ = tx.send(ChaseControl::Stop).await;
            }
            self.chase_notify.remove(&key);
        }
        let path = self.venue_path().push_key("private");
        self.apply_and_emit(vec![Command::RemoveObjectKey { path, key: account_id.to_string() }])
            .await;
    }

    async fn shutdown(&mut self) {
        self.state = WorkerState::Stopped;
        for (_, tx) in self.twap_controls.drain() {
            let _ = tx.send(TwapControl::Stop).await;
        }
        for (_, tx) in self.chase_controls.drain() {
            let _ = tx.send(ChaseControl::Stop).await;
        }
        self.chase_notify.clear();
        self.account_queues.clear();
        self.public_rx = None;
        self.private_streams = StreamMap::new();
    }

    /// Emits one `Command::Update` per changed ticker field, then
    /// propagates a `last` change into every open position on that symbol
    /// across every account (§4.3 ticker-delta propagation).
    fn ticker_delta_commands(&self, symbol: &str, new: &Ticker) -> Vec<Command> {
        let tickers_path = self.venue_path().push_key("public").push_key("tickers").push_key(symbol);
        let old = self.shared.read().tickers.get(symbol).cloned();
        let mut commands = Vec::new();
        let last_changed;
        match old {
            None => {
                commands.push(Command::Update {
                    path: tickers_path.clone(),
                    value: serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
                });
                last_changed = true;
            }
            Some(old) => {
                last_changed = old.last != new.last;
                macro_rules! field {
                    ($name:ident) => {
                        if old.$name != new.$name {
                            commands.push(Command::Update {
                                path: tickers_path.clone().push_key(stringify!($name)),
                                value: serde_json::json!(new.$name),
                            });
                        }
                    };
                }
                field!(bid);
                field!(ask);
                field!(last);
                field!(mark);
                field!(index);
                field!(percentage);
                field!(open_interest);
                field!(funding_rate);
                field!(volume);
                field!(quote_volume);
            }
        }

        if last_changed {
            if let Some(venue) = self.store.venue(&self.venue_name) {
                for (account_id, shard) in venue.private.iter() {
                    for (idx, position) in shard.positions.iter().enumerate() {
                        if position.symbol != symbol {
                            continue;
                        }
                        let mut updated = position.clone();
                        updated.recompute_from_last(new.last);
                        let pos_path = self
                            .venue_path()
                            .push_key("private")
                            .push_key(account_id)
                            .push_key("positions")
                            .push_index(idx);
                        commands.push(Command::Update {
                            path: pos_path.clone().push_key("notional"),
                            value: serde_json::json!(updated.notional),
                        });
                        commands.push(Command::Update {
                            path: pos_path.push_key("upnl"),
                            value: serde_json::json!(updated.upnl),
                        });
                    }
                }
            }
        }

        commands
    }

    async fn handle_public_event(&mut self, event: PublicStreamEvent) {
        match event {
            PublicStreamEvent::Ticker(ticker) => {
                let symbol = ticker.symbol.clone();
                let commands = self.ticker_delta_commands(&symbol, &ticker);
                self.apply_and_emit(commands).await;

                if let Some(venue) = self.store.venue(&self.venue_name) {
                    let mut shared = self.shared.write();
                    shared.tickers.insert(symbol.clone(), ticker.clone());
                    for (account_id, shard) in venue.private.iter() {
                        for position in &shard.positions {
                            if position.symbol == symbol {
                                shared
                                    .positions
                                    .insert((account_id.clone(), symbol.clone(), position.side), position.clone());
                            }
                        }
                    }
                }
                if let Some(tx) = self.ticker_watches.get(&symbol) {
                    let _ = tx.send(ticker);
                }
            }
            PublicStreamEvent::Candle { symbol, candle } => {
                self.emit(WorkerEvent::Candle { symbol, candle }).await;
            }
            PublicStreamEvent::OrderBook { symbol, book } => {
                self.emit(WorkerEvent::OrderBook { symbol, order_book: book }).await;
            }
        }
    }

    async fn handle_private_event(&mut self, account_id: String, event: PrivateStreamEvent) {
        match event {
            PrivateStreamEvent::Positions(new_positions) => {
                self.replace_positions(&account_id, new_positions).await;
            }
            PrivateStreamEvent::Orders(orders) => {
                let path = self.venue_path().push_key("private").push_key(&account_id).push_key("orders");
                self.apply_and_emit(vec![Command::Update {
                    path,
                    value: serde_json::to_value(orders).unwrap_or(serde_json::Value::Array(vec![])),
                }])
                .await;
            }
            PrivateStreamEvent::Balance(balance) => {
                let path = self.venue_path().push_key("private").push_key(&account_id).push_key("balance");
                self.apply_and_emit(vec![Command::Update {
                    path,
                    value: serde_json::to_value(balance).unwrap_or(serde_json::Value::Null),
                }])
                .await;
            }
            PrivateStreamEvent::Notification(notification) => {
                let len = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).map(|s| s.notifications.len()))
                    .unwrap_or(0);
                let path = self
                    .venue_path()
                    .push_key("private")
                    .push_key(&account_id)
                    .push_key("notifications")
                    .push_index(len);
                self.apply_and_emit(vec![Command::Update {
                    path,
                    value: serde_json::to_value(&notification).unwrap_or(serde_json::Value::Null),
                }])
                .await;
                for ((acct, _id), tx) in self.chase_notify.iter() {
                    if acct == &account_id {
                        let _ = tx.send(notification.clone()).await;
                    }
                }
            }
        }
    }

    /// Updates existing positions in place, appends genuinely new ones,
    /// and removes positions absent from the fresh snapshot — in
    /// descending index order so earlier removals don't shift the
    /// indices of ones still to come.
    async fn replace_positions(&mut self, account_id: &str, new_positions: Vec<Position>) {
        let Some(shard) = self.store.venue(&self.venue_name).and_then(|v| v.private.get(account_id).cloned())
        else {
            return;
        };
        let mut incoming: HashMap<(String, Side), Position> =
            new_positions.into_iter().map(|p| ((p.symbol.clone(), p.side), p)).collect();

        let base_path = self.venue_path().push_key("private").push_key(account_id).push_key("positions");
        let mut commands = Vec::new();
        let mut stale_indices = Vec::new();
        let mut metadata_inputs = Vec::new();

        for (idx, existing) in shard.positions.iter().enumerate() {
            match incoming.remove(&(existing.symbol.clone(), existing.side)) {
                Some(fresh) => {
                    commands.push(Command::Update {
                        path: base_path.clone().push_index(idx),
                        value: serde_json::to_value(&fresh).unwrap_or(serde_json::Value::Null),
                    });
                    metadata_inputs.push(fresh);
                }
                None => stale_indices.push(idx),
            }
        }
        for idx in stale_indices.into_iter().rev() {
            commands.push(Command::RemoveArrayElement { path: base_path.clone(), index: idx });
        }
        let retained = shard.positions.len() - commands.iter().filter(|c| matches!(c, Command::RemoveArrayElement { .. })).count();
        let mut next_index = retained;
        for fresh in incoming.into_values() {
            commands.push(Command::Update {
                path: base_path.clone().push_index(next_index),
                value: serde_json::to_value(&fresh).unwrap_or(serde_json::Value::Null),
            });
            next_index += 1;
            metadata_inputs.push(fresh);
        }

        let metadata_path = self.venue_path().push_key("private").push_key(account_id).push_key("metadata");
        for position in &metadata_inputs {
            commands.push(Command::Update {
                path: metadata_path.clone().push_key("leverage").push_key(&position.symbol),
                value: serde_json::json!(position.leverage),
            });
            commands.push(Command::Update {
                path: metadata_path.clone().push_key("hedged_position").push_key(&position.symbol),
                value: serde_json::json!(position.is_hedged.unwrap_or(false)),
            });
        }
        self.apply_and_emit(commands).await;

        if let Some(venue) = self.store.venue(&self.venue_name) {
            if let Some(shard) = venue.private.get(account_id) {
                let mut shared = self.shared.write();
                shared.positions.retain(|(acct, _, _), _| acct != account_id);
                for p in &shard.positions {
                    shared.positions.insert((account_id.to_string(), p.symbol.clone(), p.side), p.clone());
                }
            }
        }
    }

    async fn handle_internal(&mut self, msg: InternalMsg) {
        match msg {
            InternalMsg::VenueResponse { chunk_id, response } => {
                self.resolver.resolve(&chunk_id, response);
            }
            InternalMsg::StrategyPlace { account_id, orders, reply } => {
                let requests: Vec<OrderRequest> = orders
                    .into_iter()
                    .map(|o| OrderRequest {
                        client_order_id: uuid::Uuid::new_v4().to_string(),
                        symbol: o.symbol,
                        side: o.side,
                        kind: o.kind,
                        price: o.price,
                        amount: o.amount,
                        reduce_only: o.reduce_only,
                        time_in_force: o.time_in_force,
                    })
                    .collect();
                let pending = self.dispatch_place(&account_id, requests, false);
                self.pending_aggregates.push(build_place_aggregate(account_id, ResponseTarget::Strategy(reply), pending));
            }
            InternalMsg::StrategyCancel { account_id, order_ids, reply } => {
                let pending = self.dispatch_cancel(&account_id, order_ids, false);
                self.pending_aggregates.push(build_cancel_aggregate(account_id, ResponseTarget::Strategy(reply), pending));
            }
            InternalMsg::MirrorTwap { account_id, state } => {
                let len = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).map(|s| s.twaps.len()))
                    .unwrap_or(0);
                let existing_idx = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).cloned())
                    .and_then(|s| s.twaps.iter().position(|t| t.id == state.id));
                let path = self.venue_path().push_key("private").push_key(&account_id).push_key("twaps");
                let idx = existing_idx.unwrap_or(len);
                self.apply_and_emit(vec![Command::Update {
                    path: path.push_index(idx),
                    value: serde_json::to_value(&state).unwrap_or(serde_json::Value::Null),
                }])
                .await;
            }
            InternalMsg::MirrorChase { account_id, state } => {
                let existing_idx = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).cloned())
                    .and_then(|s| s.chases.iter().position(|c| c.id == state.id));
                let len = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).map(|s| s.chases.len()))
                    .unwrap_or(0);
                let path = self.venue_path().push_key("private").push_key(&account_id).push_key("chases");
                let idx = existing_idx.unwrap_or(len);
                self.apply_and_emit(vec![Command::Update {
                    path: path.push_index(idx),
                    value: serde_json::to_value(&state).unwrap_or(serde_json::Value::Null),
                }])
                .await;
            }
            InternalMsg::UnmirrorTwap { account_id, id } => {
                self.twap_controls.remove(&(account_id.clone(), id.clone()));
                if let Some(idx) = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).cloned())
                    .and_then(|s| s.twaps.iter().position(|t| t.id == id))
                {
                    let path = self.venue_path().push_key("private").push_key(&account_id).push_key("twaps");
                    self.apply_and_emit(vec![Command::RemoveArrayElement { path, index: idx }]).await;
                }
            }
            InternalMsg::UnmirrorChase { account_id, id } => {
                self.chase_controls.remove(&(account_id.clone(), id.clone()));
                self.chase_notify.remove(&(account_id.clone(), id.clone()));
                if let Some(idx) = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).cloned())
                    .and_then(|s| s.chases.iter().position(|c| c.id == id))
                {
                    let path = self.venue_path().push_key("private").push_key(&account_id).push_key("chases");
                    self.apply_and_emit(vec![Command::RemoveArrayElement { path, index: idx }]).await;
                }
            }
        }
    }

    /// Resolves an order-pipeline aggregate's `ResponseTarget`. An external
    /// caller gets an `error` event ahead of a response carrying the
    /// documented failure sentinel (empty array) when any chunk failed;
    /// a waiting strategy instance gets the `Result` directly.
    async fn respond_ids(
        &mut self,
        target: ResponseTarget,
        all_ids: Vec<String>,
        first_error: Option<WorkerError>,
    ) {
        match target {
            ResponseTarget::External(request_id) => {
                if let Some(e) = &first_error {
                    self.emit(WorkerEvent::Error { error: e.to_string() }).await;
                }
                let data = if first_error.is_some() { serde_json::json!([]) } else { serde_json::json!(all_ids) };
                self.emit(WorkerEvent::Response { request_id, data: Some(data) }).await;
            }
            ResponseTarget::Strategy(reply) => {
                let _ = reply.send(match first_error {
                    Some(e) => Err(e),
                    None => Ok(all_ids),
                });
            }
        }
    }

    async fn handle_aggregate_done(&mut self, done: AggregateDone) {
        match done {
            AggregateDone::Place { account_id, target, chunks } => {
                let mut commands = Vec::new();
                let mut all_ids = Vec::new();
                let mut first_error = None;
                let base_len = self
                    .store
                    .venue(&self.venue_name)
                    .and_then(|v| v.private.get(&account_id).map(|s| s.orders.len()))
                    .unwrap_or(0);
                let mut next_index = base_len;
                for (requests, result) in chunks {
                    match result {
                        Ok(ids) => {
                            for (request, id) in requests.iter().zip(ids.iter()) {
                                let order = Order {
                                    id: id.clone(),
                                    exchange: self.venue_name.clone(),
                                    account_id: account_id.clone(),
                                    parent_id: None,
                                    status: OrderStatus::Open,
                                    symbol: request.symbol.clone(),
                                    kind: request.kind,
                                    side: request.side,
                                    price: request.price.unwrap_or(0.0),
                                    amount: request.amount,
                                    filled: 0.0,
                                    remaining: request.amount,
                                    reduce_only: request.reduce_only,
                                    time_in_force: request.time_in_force,
                                };
                                let path = self
                                    .venue_path()
                                    .push_key("private")
                                    .push_key(&account_id)
                                    .push_key("orders")
                                    .push_index(next_index);
                                commands.push(Command::Update {
                                    path,
                                    value: serde_json::to_value(&order).unwrap_or(serde_json::Value::Null),
                                });
                                next_index += 1;
                                all_ids.push(id.clone());
                            }
                        }
                        Err(e) => first_error.get_or_insert(e),
                    }
                }
                self.apply_and_emit(commands).await;
                self.respond_ids(target, all_ids, first_error).await;
            }
            AggregateDone::Cancel { account_id, target, chunks } => {
                let shard = self.store.venue(&self.venue_name).and_then(|v| v.private.get(&account_id).cloned());
                let mut commands = Vec::new();
                let mut all_ids = Vec::new();
                let mut first_error = None;
                for (_requested, result) in chunks {
                    match result {
                        Ok(ids) => {
                            for id in &ids {
                                if let Some(shard) = &shard {
                                    if let Some(idx) = shard.orders.iter().position(|o| &o.id == id) {
                                        let path = self
                                            .venue_path()
                                            .push_key("private")
                                            .push_key(&account_id)
                                            .push_key("orders")
                                            .push_index(idx)
                                            .push_key("status");
                                        commands.push(Command::Update {
                                            path,
                                            value: serde_json::json!(OrderStatus::Canceled),
                                        });
                                    }
                                }
                            }
                            all_ids.extend(ids);
                        }
                        Err(e) => first_error.get_or_insert(e),
                    }
                }
                self.apply_and_emit(commands).await;
                self.respond_ids(target, all_ids, first_error).await;
            }
            AggregateDone::Update { account_id: _, target, chunks } => {
                let mut all_ids = Vec::new();
                let mut first_error = None;
                for (_requested, result) in chunks {
                    match result {
                        Ok(ids) => all_ids.extend(ids),
                        Err(e) => first_error.get_or_insert(e),
                    }
                }
                self.respond_ids(target, all_ids, first_error).await;
            }
        }
    }

    /// Drives the worker until the host sends `Stop` or drops the
    /// command channel, mirroring the teacher's own async-shutdown loop
    /// shape: every event source is polled from one `select!`, and a
    /// state transition to `Stopped` ends the loop on the next iteration.
    pub async fn run(mut self) {
        loop {
            if self.state == WorkerState::Stopped {
                break;
            }
            tokio::select! {
                command = self.inbox.recv() => {
                    match command {
                        Some(command) => self.dispatch(command).await,
                        None => self.shutdown().await,
                    }
                }
                msg = self.internal_rx.recv() => {
                    if let Some(msg) = msg {
                        self.handle_internal(msg).await;
                    }
                }
                done = self.pending_aggregates.next(), if !self.pending_aggregates.is_empty() => {
                    if let Some(done) = done {
                        self.handle_aggregate_done(done).await;
                    }
                }
                event = recv_optional(&mut self.public_rx) => {
                    match event {
                        Some(event) => self.handle_public_event(event).await,
                        None => self.public_rx = None,
                    }
                }
                item = self.private_streams.next(), if !self.private_streams.is_empty() => {
                    if let Some((account_id, event)) = item {
                        self.handle_private_event(account_id, event).await;
                    }
                }
            }
        }
    }
}

//! Integration coverage for the worker's command/event loop against
//! [`MockVenueAdapter`], exercising the lifecycle and order-pipeline
//! scenarios end to end without any network access.

use polytrade_core::config::WorkerConfig;
use polytrade_store::model::{AccountShard, Market, OrderSide, OrderStatus, OrderType, Ticker, VenueId};
use polytrade_store::Command;
use polytrade_worker::{MockVenueAdapter, OrderSpec, WorkerCommand, WorkerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

fn sample_market(symbol: &str) -> Market {
    Market { id: symbol.into(), exchange: "mock".into(), symbol: symbol.into(), active: true, ..Default::default() }
}

fn sample_ticker(symbol: &str, bid: f64, ask: f64) -> Ticker {
    Ticker { symbol: symbol.into(), clean_symbol: symbol.into(), bid, ask, last: (bid + ask) / 2.0, ..Default::default() }
}

fn spawn_worker() -> (mpsc::Sender<WorkerCommand>, mpsc::Receiver<WorkerEvent>, Arc<MockVenueAdapter>) {
    let mut markets = HashMap::new();
    markets.insert("BTC-PERP".to_string(), sample_market("BTC-PERP"));
    let mut tickers = HashMap::new();
    tickers.insert("BTC-PERP".to_string(), sample_ticker("BTC-PERP", 100.0, 100.5));
    let adapter = Arc::new(MockVenueAdapter::new(VenueId::Cex, markets, tickers));

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (evt_tx, evt_rx) = mpsc::channel(32);
    let worker = polytrade_worker::Worker::new("mockvenue".into(), adapter.clone(), cmd_rx, evt_tx);
    tokio::spawn(worker.run());
    (cmd_tx, evt_rx, adapter)
}

/// Drains events until the response for `expect_request_id` arrives,
/// returning every event seen ahead of it (in order) plus the response's
/// own `data` payload — lets a test inspect the mutation/error events a
/// command emits before its terminal response.
async fn recv_until_response(
    evt_rx: &mut mpsc::Receiver<WorkerEvent>,
    expect_request_id: &str,
) -> (Vec<WorkerEvent>, Option<serde_json::Value>) {
    let mut seen = Vec::new();
    loop {
        match evt_rx.recv().await.expect("worker dropped the event channel") {
            WorkerEvent::Response { request_id, data } if request_id == expect_request_id => return (seen, data),
            other => seen.push(other),
        }
    }
}

async fn recv_response(evt_rx: &mut mpsc::Receiver<WorkerEvent>, expect_request_id: &str) -> Option<serde_json::Value> {
    recv_until_response(evt_rx, expect_request_id).await.1
}

fn find_update_command<'a>(events: &'a [WorkerEvent], matches: impl Fn(&Command) -> bool) -> Option<&'a Command> {
    events.iter().find_map(|event| match event {
        WorkerEvent::Update { changes } => changes.iter().find(|c| matches(c)),
        _ => None,
    })
}

#[tokio::test]
async fn start_then_place_orders_returns_venue_assigned_ids() {
    let (cmd_tx, mut evt_rx, _adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start {
            accounts: vec!["acct-1".into()],
            config: WorkerConfig::default(),
            request_id: "r-start".into(),
        })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    cmd_tx
        .send(WorkerCommand::PlaceOrders {
            account_id: "acct-1".into(),
            orders: vec![OrderSpec {
                symbol: "BTC-PERP".into(),
                side: OrderSide::Buy,
                kind: OrderType::Market,
                price: None,
                amount: 1.0,
                reduce_only: false,
                time_in_force: None,
            }],
            priority: false,
            request_id: "r-place".into(),
        })
        .await
        .unwrap();

    let data = recv_response(&mut evt_rx, "r-place").await.expect("place response carries data");
    let ids = data.as_array().expect("response data is the bare array of assigned ids");
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn venue_rejection_emits_an_error_event_then_an_empty_sentinel() {
    let (cmd_tx, mut evt_rx, adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start {
            accounts: vec!["acct-1".into()],
            config: WorkerConfig::default(),
            request_id: "r-start".into(),
        })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    adapter.reject_next_submission();
    cmd_tx
        .send(WorkerCommand::PlaceOrders {
            account_id: "acct-1".into(),
            orders: vec![OrderSpec {
                symbol: "BTC-PERP".into(),
                side: OrderSide::Buy,
                kind: OrderType::Market,
                price: None,
                amount: 1.0,
                reduce_only: false,
                time_in_force: None,
            }],
            priority: false,
            request_id: "r-place".into(),
        })
        .await
        .unwrap();

    let (seen, data) = recv_until_response(&mut evt_rx, "r-place").await;
    assert!(seen.iter().any(|e| matches!(e, WorkerEvent::Error { .. })), "expected an error event ahead of the response");
    assert_eq!(data, Some(serde_json::json!([])));
}

#[tokio::test]
async fn cancel_all_orders_on_empty_book_returns_no_ids() {
    let (cmd_tx, mut evt_rx, _adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start {
            accounts: vec!["acct-1".into()],
            config: WorkerConfig::default(),
            request_id: "r-start".into(),
        })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    cmd_tx
        .send(WorkerCommand::CancelAllOrders { account_id: "acct-1".into(), request_id: "r-cancel".into() })
        .await
        .unwrap();

    let data = recv_response(&mut evt_rx, "r-cancel").await.expect("cancel response carries data");
    let ids = data.as_array().expect("response data is the bare array of confirmed ids");
    assert!(ids.is_empty());
}

#[tokio::test]
async fn remove_account_then_stop_does_not_hang() {
    let (cmd_tx, mut evt_rx, _adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start {
            accounts: vec!["acct-1".into()],
            config: WorkerConfig::default(),
            request_id: "r-start".into(),
        })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    cmd_tx
        .send(WorkerCommand::RemoveAccount { account_id: "acct-1".into(), request_id: "r-remove".into() })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-remove").await;

    cmd_tx.send(WorkerCommand::Stop).await.unwrap();
    // The channel closing (rather than a timeout) is the pass condition —
    // `Worker::run` must return once it finishes processing `Stop`.
    while evt_rx.recv().await.is_some() {}
}

/// S2: `addAccounts` emits the zero-initialized shard ahead of hydration.
#[tokio::test]
async fn add_account_emits_zero_shard_before_hydration() {
    let (cmd_tx, mut evt_rx, _adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start { accounts: vec![], config: WorkerConfig::default(), request_id: "r-start".into() })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    cmd_tx
        .send(WorkerCommand::AddAccounts { accounts: vec!["acct-1".into()], request_id: Some("r-add".into()) })
        .await
        .unwrap();

    let (seen, _data) = recv_until_response(&mut evt_rx, "r-add").await;
    let zero_shard = find_update_command(&seen, |c| {
        matches!(c, Command::Update { path, .. } if path.to_string() == "mockvenue.private.acct-1")
    })
    .expect("zero-initialized shard update ahead of hydration");
    if let Command::Update { value, .. } = zero_shard {
        let expected = serde_json::to_value(AccountShard::default()).unwrap();
        assert_eq!(value, &expected);
    }
}

/// S3: placing two orders then canceling one marks that order `Canceled`
/// in the mutation stream, and the response carries just that order's id.
#[tokio::test]
async fn cancel_one_of_two_orders_marks_it_canceled() {
    let (cmd_tx, mut evt_rx, _adapter) = spawn_worker();

    cmd_tx
        .send(WorkerCommand::Start {
            accounts: vec!["acct-1".into()],
            config: WorkerConfig::default(),
            request_id: "r-start".into(),
        })
        .await
        .unwrap();
    recv_response(&mut evt_rx, "r-start").await;

    let two_orders = vec![
        OrderSpec {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            kind: OrderType::Market,
            price: None,
            amount: 1.0,
            reduce_only: false,
            time_in_force: None,
        },
        OrderSpec {
            symbol: "BTC-PERP".into(),
            side: OrderSide::Buy,
            kind: OrderType::Market,
            price: None,
            amount: 1.0,
            reduce_only: false,
            time_in_force: None,
        },
    ];
    cmd_tx
        .send(WorkerCommand::PlaceOrders {
            account_id: "acct-1".into(),
            orders: two_orders,
            priority: false,
            request_id: "r-place".into(),
        })
        .await
        .unwrap();
    let data = recv_response(&mut evt_rx, "r-place").await.expect("place response carries data");
    let ids: Vec<String> =
        data.as_array().expect("ids array").iter().map(|v| v.as_str().unwrap().to_string()).collect();
    assert_eq!(ids.len(), 2);

    cmd_tx
        .send(WorkerCommand::CancelOrders {
            account_id: "acct-1".into(),
            order_ids: vec![ids[0].clone()],
            priority: false,
            request_id: "r-cancel".into(),
        })
        .await
        .unwrap();

    let (seen, cancel_data) = recv_until_response(&mut evt_rx, "r-cancel").await;
    assert_eq!(cancel_data, Some(serde_json::json!([ids[0].clone()])));

    let status_update = find_update_command(&seen, |c| {
        matches!(c, Command::Update { path, .. } if path.to_string() == "mockvenue.private.acct-1.orders.0.status")
    })
    .expect("canceled order's status mutation in the stream");
    if let Command::Update { value, .. } = status_update {
        assert_eq!(value, &serde_json::json!(OrderStatus::Canceled));
    }
}

//! Synchronization against real peers served over HTTP
#![cfg(feature = "api")]

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use votechain::api::{build_api_router, ApiNode};
use votechain::blockchain::{Blockchain, MineOutcome};
use votechain::ledger::Ledger;
use votechain::sync::{ChainSynchronizer, HttpPeerFetcher, Peer, PeerFetcher, SyncOutcome, SyncState};

fn ledger_with_blocks(mined: usize) -> Ledger {
    let ledger = Ledger::new(Blockchain::new(1).expect("Failed to create blockchain"));
    for n in 0..mined {
        ledger.submit_transaction(json!({"seq": n}));
        assert!(matches!(ledger.trigger_mine(), MineOutcome::Mined(_)));
    }
    ledger
}

/// Serve `ledger` on an ephemeral port and return its base URL.
async fn serve(ledger: Ledger) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let app = build_api_router(Arc::new(ApiNode::new(ledger)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn http_fetcher_reads_peer_snapshot() {
    let peer_ledger = ledger_with_blocks(2);
    let url = serve(peer_ledger.clone()).await;

    let fetcher = HttpPeerFetcher::new(Duration::from_secs(5)).unwrap();
    let blocks = fetcher.fetch_chain(&Peer::new(format!("{}/", url))).await.unwrap();
    assert_eq!(blocks, peer_ledger.get_chain());
}

#[tokio::test]
async fn node_converges_on_longest_peer() {
    let short_peer = serve(ledger_with_blocks(1)).await;
    let long_ledger = ledger_with_blocks(4);
    let long_peer = serve(long_ledger.clone()).await;

    let local = ledger_with_blocks(2);
    let fetcher = Arc::new(HttpPeerFetcher::new(Duration::from_secs(2)).unwrap());
    let sync = ChainSynchronizer::new(
        local.clone(),
        fetcher,
        vec![Peer::new(&short_peer), Peer::new(&long_peer), Peer::new("http://127.0.0.1:1")],
        Duration::from_secs(2),
    );

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        report.outcome,
        SyncOutcome::Replaced { old_len: 3, new_len: 5, peer: long_peer.clone() }
    );
    assert_eq!(local.get_chain(), long_ledger.get_chain());
    assert_eq!(sync.get_sync_state().await, SyncState::Synced);

    // Second cycle: nothing longer remains.
    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::UpToDate);
}

#[tokio::test]
async fn equal_length_peer_is_ignored() {
    let peer = serve(ledger_with_blocks(2)).await;
    let local = ledger_with_blocks(2);
    let before = local.get_chain();

    let sync = ChainSynchronizer::new(
        local.clone(),
        Arc::new(HttpPeerFetcher::new(Duration::from_secs(2)).unwrap()),
        vec![Peer::new(&peer)],
        Duration::from_secs(2),
    );

    let report = sync.sync_once().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::UpToDate);
    assert_eq!(local.get_chain(), before);
}

#[tokio::test]
async fn missing_endpoint_counts_as_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, axum::Router::new()).await.unwrap();
    });

    let fetcher = HttpPeerFetcher::new(Duration::from_secs(2)).unwrap();
    let err = fetcher
        .fetch_chain(&Peer::new(format!("http://{}", addr)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));
}

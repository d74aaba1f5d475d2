//! End-to-end ledger behaviour through the public API

use serde_json::json;
use std::collections::HashSet;
use std::thread;
use votechain::blockchain::{Block, Blockchain, MineOutcome, RejectReason, ReplaceOutcome};
use votechain::ledger::{Ledger, SubmitOutcome};
use votechain::transaction::PayloadKind;

fn ledger(difficulty: u32) -> Ledger {
    Ledger::new(Blockchain::new(difficulty).expect("Failed to create blockchain"))
}

/// Ledger of `len` blocks including genesis.
fn ledger_of_length(len: usize, tag: &str) -> Ledger {
    let ledger = ledger(1);
    for n in 1..len {
        ledger.submit_transaction(json!({"seq": n, "tag": tag}));
        assert!(matches!(ledger.trigger_mine(), MineOutcome::Mined(_)));
    }
    assert_eq!(ledger.height(), len);
    ledger
}

fn vote(id: &str) -> serde_json::Value {
    json!({
        "type": "vote",
        "vote_id": id,
        "election_id": "e-2024",
        "voter_id": format!("voter-{}", id),
        "candidate": "Alice",
        "timestamp": "2024-11-05T10:00:00Z"
    })
}

#[test]
fn genesis_only_chain_mines_first_block_at_difficulty_two() {
    let ledger = ledger(2);
    let genesis = ledger.get_chain()[0].clone();
    assert_eq!(genesis, Block::genesis());

    let outcome = ledger.submit_transaction(vote("1"));
    assert_eq!(outcome, SubmitOutcome::Enqueued { kind: PayloadKind::Vote, pending: 1 });

    let block = match ledger.trigger_mine() {
        MineOutcome::Mined(block) => block,
        other => panic!("expected a mined block, got {:?}", other),
    };
    assert_eq!(block.index, 1);
    assert_eq!(block.previous_hash, genesis.hash);
    assert!(block.hash_hex().starts_with("00"));
    assert!(ledger.get_validity());
}

#[test]
fn shorter_candidate_is_rejected() {
    let local = ledger_of_length(3, "local");
    let candidate = ledger_of_length(2, "peer").get_chain();
    let before = local.get_chain();

    let outcome = local.replace_if_longer(candidate);
    assert_eq!(outcome, ReplaceOutcome::Rejected(RejectReason::NotLonger { local: 3, candidate: 2 }));
    assert_eq!(local.get_chain(), before);
}

#[test]
fn tampered_longer_candidate_is_rejected() {
    let local = ledger_of_length(3, "local");
    let mut candidate = ledger_of_length(5, "peer").get_chain();
    candidate[3].previous_hash = [0xAA; 32];
    assert!(votechain::blockchain::validate_chain(&candidate).is_err());
    let before = local.get_chain();

    match local.replace_if_longer(candidate) {
        ReplaceOutcome::Rejected(RejectReason::Invalid(fault)) => assert_eq!(fault.index, 3),
        other => panic!("expected invalid rejection, got {:?}", other),
    }
    assert_eq!(local.get_chain(), before);
}

#[test]
fn valid_longer_candidate_replaces_local_chain() {
    let local = ledger_of_length(3, "local");
    let candidate = ledger_of_length(5, "peer").get_chain();

    let outcome = local.replace_if_longer(candidate.clone());
    assert_eq!(outcome, ReplaceOutcome::Replaced { previous_len: 3, new_len: 5 });

    let hashes = |blocks: &[Block]| blocks.iter().map(|b| b.hash).collect::<Vec<_>>();
    assert_eq!(hashes(&local.get_chain()), hashes(&candidate));
}

#[test]
fn empty_pool_mine_is_noop() {
    let ledger = ledger(1);
    assert_eq!(ledger.trigger_mine(), MineOutcome::NoOp);
    assert_eq!(ledger.height(), 1);
}

#[test]
fn chains_built_by_mining_always_validate() {
    for difficulty in 0..=2 {
        let ledger = ledger(difficulty);
        for round in 0..6 {
            for n in 0..(round % 3 + 1) {
                ledger.submit_transaction(json!({"round": round, "n": n}));
            }
            assert!(matches!(ledger.trigger_mine(), MineOutcome::Mined(_)));
            assert!(ledger.verify_local().is_ok());
        }
        assert_eq!(ledger.height(), 7);
    }
}

#[test]
fn concurrent_mining_never_forks() {
    let ledger = ledger(2);
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for n in 0..3 {
                    ledger.submit_transaction(json!({"worker": worker, "n": n}));
                    ledger.trigger_mine();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }
    // Flush anything left behind by an interleaving where another thread mined first.
    ledger.trigger_mine();

    let chain = ledger.get_chain();
    let parents: HashSet<_> = chain.iter().map(|b| b.previous_hash).collect();
    assert_eq!(parents.len(), chain.len(), "two blocks share a parent");
    for (position, block) in chain.iter().enumerate() {
        assert_eq!(block.index, position as u64);
    }
    let mined: usize = chain.iter().map(|b| b.transactions.len()).sum();
    assert_eq!(mined, 24);
    assert!(ledger.get_validity());
    assert_eq!(ledger.pending_count(), 0);
}

#[test]
fn malformed_vote_never_reaches_the_pool() {
    let ledger = ledger(1);
    let mut bad = vote("1");
    bad["timestamp"] = json!("yesterday");
    assert!(matches!(ledger.submit_transaction(bad), SubmitOutcome::ShapeRejected(_)));

    let mut extra = vote("2");
    extra["ballot_stuffing"] = json!(true);
    assert!(matches!(ledger.submit_transaction(extra), SubmitOutcome::ShapeRejected(_)));

    assert_eq!(ledger.pending_count(), 0);
    assert_eq!(ledger.trigger_mine(), MineOutcome::NoOp);
}

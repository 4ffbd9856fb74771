//! End-to-end seed scenarios (spec §8): a 3-node cluster driven entirely
//! in-process through [`ledger_e2e::Cluster`].

use ledger_crypto::sha256_hex;
use ledger_e2e::Cluster;
use ledger_types::{
    BlockQuery, BlockView, ConditionOperation, ConditionValue, Direction, Transaction, TransactionCondition,
    TransactionConditionSet, H0,
};
use serde_json::json;

fn tx(value: serde_json::Value) -> Transaction {
    Transaction::from_value(value).unwrap()
}

fn fresh_cluster() -> Cluster {
    let mut cluster = Cluster::new(3);
    cluster.generate_genesis();
    cluster.elect_leader();
    cluster
}

#[test]
fn scenario_1_genesis() {
    let cluster = fresh_cluster();
    for i in 0..cluster.len() {
        let block = cluster.store(i).get_block(0).unwrap().unwrap();
        assert!(block.is_genesis());
        assert_eq!(block.prev_hash, "");
        assert!(block.transactions.is_empty());
        let expected_hash = sha256_hex(format!("{}{}{}", "", block.nonce, H0).as_bytes());
        assert_eq!(block.hash, expected_hash);
    }
    cluster.cleanup();
}

#[test]
fn scenario_2_single_transaction_round_trip() {
    let mut cluster = fresh_cluster();
    let t = tx(json!({
        "transactionId": "00000000-0000-0000-0000-000000000001",
        "articleCode": "4900000000001",
        "tradingDate": 1639065600000i64,
    }));
    cluster.submit_and_settle(0, vec![t.clone()], 1);

    for i in 0..cluster.len() {
        let block = cluster.store(i).get_block(1).unwrap().unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions, vec![t.clone()]);
    }
    cluster.cleanup();
}

#[test]
fn scenario_3_multi_transaction_block() {
    let mut cluster = fresh_cluster();
    let first = tx(json!({"transactionId": "tx-1", "articleCode": "4900000000001"}));
    cluster.submit_and_settle(0, vec![first.clone()], 1);

    let second = tx(json!({"transactionId": "tx-2", "articleCode": "4900000000002"}));
    let third = tx(json!({"transactionId": "tx-3", "articleCode": "4900000000003"}));
    cluster.submit_and_settle(0, vec![second.clone(), third.clone()], 2);

    let query = BlockQuery { direction: Direction::Backward, ..Default::default() };
    let results = cluster.store(0).restore_blocks(&query).unwrap();
    assert_eq!(results.len(), 2);
    match &results[0] {
        BlockView::Full(b) => {
            assert_eq!(b.index, 2);
            assert_eq!(b.transactions, vec![second, third]);
        }
        _ => panic!("expected a full block"),
    }
    cluster.cleanup();
}

#[test]
fn scenario_4_equality_query() {
    let mut cluster = fresh_cluster();
    let first = tx(json!({"transactionId": "tx-1", "articleCode": "4900000000004"}));
    cluster.submit_and_settle(0, vec![first.clone()], 1);
    let second = tx(json!({"transactionId": "tx-2", "articleCode": "4900000000005"}));
    cluster.submit_and_settle(0, vec![second], 2);

    let query = BlockQuery {
        direction: Direction::Backward,
        transaction_condition: Some(TransactionConditionSet::Single(TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: false,
            conditions: [("articleCode".to_string(), ConditionValue::Scalar(json!("4900000000004")))]
                .into_iter()
                .collect(),
        })),
        ..Default::default()
    };
    let results = cluster.store(0).restore_blocks(&query).unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        BlockView::Full(b) => assert_eq!(b.transactions, vec![first]),
        _ => panic!("expected a full block"),
    }
    cluster.cleanup();
}

#[test]
fn scenario_5_range_and_disjunction_query() {
    let mut cluster = fresh_cluster();
    let t1 = tx(json!({"transactionId": "tx-1", "recipientCompanyId": 3, "tradingDate": 1636502400000i64}));
    let t2 = tx(json!({"transactionId": "tx-2", "recipientCompanyId": 3, "tradingDate": 1637798400000i64}));
    let t3 = tx(json!({"transactionId": "tx-3", "recipientCompanyId": 3, "tradingDate": 1638489600000i64}));
    let t4 = tx(json!({"transactionId": "tx-4", "recipientCompanyId": 3, "tradingDate": 1639958400000i64}));
    cluster.submit_and_settle(0, vec![t1, t2.clone(), t3.clone(), t4], 1);

    let query: BlockQuery = serde_json::from_value(json!({
        "direction": "backward",
        "transactionCondition": [
            {"operation": "or", "conditions": {"recipientCompanyId": 3, "inspectionCompanyId": 4}},
            {"operation": "between", "conditions": {"tradingDate": {"begin": 1636934400000i64, "end": 1639526400000i64}}},
        ],
    }))
    .unwrap();
    let results = cluster.store(0).restore_blocks(&query).unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        BlockView::Full(b) => assert_eq!(b.transactions, vec![t2, t3]),
        _ => panic!("expected a full block"),
    }
    cluster.cleanup();
}

#[test]
fn scenario_6_substring_query() {
    let mut cluster = fresh_cluster();
    let transactions: Vec<Transaction> = (1..=4)
        .map(|i| tx(json!({"transactionId": format!("tx-{i}"), "cocCertificateCode": format!("JP-000{i}")})))
        .collect();
    cluster.submit_and_settle(0, transactions.clone(), 1);

    let query = BlockQuery {
        direction: Direction::Backward,
        transaction_condition: Some(TransactionConditionSet::Single(TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: true,
            conditions: [("cocCertificateCode".to_string(), ConditionValue::Scalar(json!("JP-000")))]
                .into_iter()
                .collect(),
        })),
        ..Default::default()
    };
    let results = cluster.store(0).restore_blocks(&query).unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        BlockView::Full(b) => assert_eq!(b.transactions, transactions),
        _ => panic!("expected a full block"),
    }
    cluster.cleanup();
}

//! Transaction-condition evaluation for `restoreBlocks` (spec §4.3).
//!
//! Pure functions over [`Transaction`] and [`TransactionCondition`]; no
//! storage access. [`BlockStore`](crate::block_store::BlockStore) uses these
//! both for the full in-memory scan and to re-verify candidates surfaced by
//! the index-assisted fast path.

use serde_json::Value;

use ledger_types::{ConditionOperation, ConditionValue, Transaction, TransactionCondition, TransactionConditionSet};

/// Coerce a JSON value to the string form substring-matching compares
/// against: strings pass through unquoted, everything else uses its
/// `Display`-equivalent JSON rendering.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Order two JSON values for a `between` bound check. Numbers compare
/// numerically, strings lexicographically; anything else falls back to
/// comparing the stringified form (covers ISO date strings as well as
/// numeric epoch-millisecond timestamps).
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return x.cmp(y);
    }
    stringify_value(a).cmp(&stringify_value(b))
}

fn matches_equality(tx: &Transaction, key: &str, expected: &Value) -> bool {
    tx.get(key) == Some(expected)
}

fn matches_substring(tx: &Transaction, key: &str, expected: &Value) -> bool {
    match tx.get(key) {
        Some(actual) => stringify_value(actual).contains(&stringify_value(expected)),
        None => false,
    }
}

fn matches_between(tx: &Transaction, key: &str, begin: &Option<Value>, end: &Option<Value>) -> bool {
    let Some(actual) = tx.get(key) else {
        return false;
    };
    if let (Some(b), Some(e)) = (begin, end) {
        if compare_values(b, e) == std::cmp::Ordering::Greater {
            // Inverted range: silently dropped (never excludes a transaction).
            return true;
        }
    }
    if let Some(b) = begin {
        if compare_values(actual, b) == std::cmp::Ordering::Less {
            return false;
        }
    }
    if let Some(e) = end {
        if compare_values(actual, e) == std::cmp::Ordering::Greater {
            return false;
        }
    }
    true
}

/// Whether `tx` passes a single condition stage.
pub fn transaction_matches_stage(tx: &Transaction, stage: &TransactionCondition) -> bool {
    let mut results = stage.conditions.iter().map(|(key, value)| match (stage.operation, value) {
        (ConditionOperation::Between, ConditionValue::Range { begin, end }) => {
            matches_between(tx, key, begin, end)
        }
        (ConditionOperation::Between, ConditionValue::Scalar(_)) => true,
        (_, ConditionValue::Scalar(expected)) if stage.ambiguous => matches_substring(tx, key, expected),
        (_, ConditionValue::Scalar(expected)) => matches_equality(tx, key, expected),
        (_, ConditionValue::Range { .. }) => true,
    });

    match stage.operation {
        ConditionOperation::And | ConditionOperation::Between => results.all(|m| m),
        ConditionOperation::Or => results.any(|m| m),
    }
}

/// Filter `transactions` down to those surviving every stage of
/// `condition_set`, applied as successive intersecting filters.
pub fn filter_transactions<'a>(
    transactions: &'a [Transaction],
    condition_set: &TransactionConditionSet,
) -> Vec<&'a Transaction> {
    let mut working: Vec<&Transaction> = transactions.iter().collect();
    for stage in condition_set.stages() {
        working.retain(|t| transaction_matches_stage(t, stage));
        if working.is_empty() {
            break;
        }
    }
    working
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(value: Value) -> Transaction {
        Transaction::from_value(value).unwrap()
    }

    #[test]
    fn test_equality_match() {
        let t = tx(json!({"articleCode": "4900000000004"}));
        let single = TransactionConditionSet::Single(TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: false,
            conditions: [("articleCode".to_string(), ConditionValue::Scalar(json!("4900000000004")))]
                .into_iter()
                .collect(),
        });
        assert_eq!(filter_transactions(&[t], &single).len(), 1);
    }

    #[test]
    fn test_substring_match() {
        let t = tx(json!({"cocCertificateCode": "JP-000123"}));
        let single = TransactionConditionSet::Single(TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: true,
            conditions: [("cocCertificateCode".to_string(), ConditionValue::Scalar(json!("JP-000")))]
                .into_iter()
                .collect(),
        });
        assert_eq!(filter_transactions(&[t], &single).len(), 1);
    }

    #[test]
    fn test_substring_no_match() {
        let t = tx(json!({"cocCertificateCode": "US-000123"}));
        let single = TransactionConditionSet::Single(TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: true,
            conditions: [("cocCertificateCode".to_string(), ConditionValue::Scalar(json!("JP-000")))]
                .into_iter()
                .collect(),
        });
        assert!(filter_transactions(&[t], &single).is_empty());
    }

    #[test]
    fn test_or_across_keys() {
        let matches_first = tx(json!({"recipientCompanyId": 3, "inspectionCompanyId": 9}));
        let matches_neither = tx(json!({"recipientCompanyId": 1, "inspectionCompanyId": 2}));
        let stage = TransactionCondition {
            operation: ConditionOperation::Or,
            ambiguous: false,
            conditions: [
                ("recipientCompanyId".to_string(), ConditionValue::Scalar(json!(3))),
                ("inspectionCompanyId".to_string(), ConditionValue::Scalar(json!(4))),
            ]
            .into_iter()
            .collect(),
        };
        let set = TransactionConditionSet::Single(stage);
        assert_eq!(filter_transactions(&[matches_first, matches_neither], &set).len(), 1);
    }

    #[test]
    fn test_between_range() {
        let in_range = tx(json!({"tradingDate": 1_637_800_000_000i64}));
        let out_of_range = tx(json!({"tradingDate": 1_630_000_000_000i64}));
        let stage = TransactionCondition {
            operation: ConditionOperation::Between,
            ambiguous: false,
            conditions: [(
                "tradingDate".to_string(),
                ConditionValue::Range {
                    begin: Some(json!(1_636_000_000_000i64)),
                    end: Some(json!(1_639_000_000_000i64)),
                },
            )]
            .into_iter()
            .collect(),
        };
        let set = TransactionConditionSet::Single(stage);
        assert_eq!(filter_transactions(&[in_range, out_of_range], &set).len(), 1);
    }

    #[test]
    fn test_successive_stages_intersect() {
        let tx1 = tx(json!({"recipientCompanyId": 3, "tradingDate": 1_637_000_000_000i64}));
        let tx2 = tx(json!({"recipientCompanyId": 1, "tradingDate": 1_637_000_000_000i64}));
        let set = TransactionConditionSet::Many(vec![
            TransactionCondition {
                operation: ConditionOperation::Or,
                ambiguous: false,
                conditions: [("recipientCompanyId".to_string(), ConditionValue::Scalar(json!(3)))]
                    .into_iter()
                    .collect(),
            },
            TransactionCondition {
                operation: ConditionOperation::Between,
                ambiguous: false,
                conditions: [(
                    "tradingDate".to_string(),
                    ConditionValue::Range {
                        begin: Some(json!(1_636_000_000_000i64)),
                        end: Some(json!(1_639_000_000_000i64)),
                    },
                )]
                .into_iter()
                .collect(),
            },
        ]);
        let result = filter_transactions(&[tx1, tx2], &set);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("recipientCompanyId"), Some(&json!(3)));
    }

    #[test]
    fn test_inverted_range_is_dropped() {
        let t = tx(json!({"tradingDate": 1_637_000_000_000i64}));
        let stage = TransactionCondition {
            operation: ConditionOperation::Between,
            ambiguous: false,
            conditions: [(
                "tradingDate".to_string(),
                ConditionValue::Range {
                    begin: Some(json!(1_639_000_000_000i64)),
                    end: Some(json!(1_636_000_000_000i64)),
                },
            )]
            .into_iter()
            .collect(),
        };
        let set = TransactionConditionSet::Single(stage);
        assert_eq!(filter_transactions(&[t], &set).len(), 1);
    }
}

//! Transaction type: an opaque JSON object with two interpreted fields.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TypesError;

/// The attribute the core interprets as a stable primary key.
pub const TRANSACTION_ID_FIELD: &str = "transactionId";

/// Internal annotation marking a transaction as pending finalization.
pub const TEMP_FIELD: &str = "@temp";

fn next_identity() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An opaque, client-supplied JSON object.
///
/// The core interprets exactly two attributes: `transactionId` (a stable
/// key used by `commitTransaction`) and the internal `@temp` timestamp
/// added when a transaction is accepted in temporary mode. Every other
/// attribute passes through untouched. `serde_json::Map` is backed by a
/// `BTreeMap` unless the `preserve_order` feature is enabled (it is not,
/// here), so key iteration order is already the sorted order `canonical_json`
/// requires.
///
/// Carries an `identity` tag, minted fresh each time a transaction is built
/// from JSON (`new`/`from_value`/deserialize) and preserved across `clone`.
/// This stands in for the reference-identity the pool's dedup rule is
/// defined against: two transactions built from identical content get
/// distinct identities and coexist, while cloning the same transaction and
/// resubmitting it is recognized as the same element. `identity` plays no
/// part in `PartialEq`/`Eq`, which stay content-based.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    #[serde(skip, default = "next_identity")]
    identity: u64,
    fields: Map<String, Value>,
}

impl Transaction {
    /// Wrap a JSON object as a transaction, minting a fresh identity.
    pub fn new(fields: Map<String, Value>) -> Self {
        Transaction { identity: next_identity(), fields }
    }

    /// Parse a transaction from an arbitrary JSON value, requiring an object.
    pub fn from_value(value: Value) -> Result<Self, TypesError> {
        match value {
            Value::Object(map) => Ok(Transaction::new(map)),
            other => Err(TypesError::InvalidTransaction(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Render back to a plain JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Borrow the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The transaction's `transactionId`, if present and a string.
    pub fn transaction_id(&self) -> Option<&str> {
        self.fields.get(TRANSACTION_ID_FIELD).and_then(Value::as_str)
    }

    /// Look up an arbitrary attribute by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether this transaction is still pending finalization.
    pub fn is_temp(&self) -> bool {
        self.fields.contains_key(TEMP_FIELD)
    }

    /// The `@temp` timestamp, if present.
    pub fn temp_timestamp(&self) -> Option<i64> {
        self.fields.get(TEMP_FIELD).and_then(Value::as_i64)
    }

    /// Tag this transaction as temporary with the given wall-clock timestamp
    /// (milliseconds since epoch).
    pub fn mark_temp(&mut self, timestamp_ms: i64) {
        self.fields
            .insert(TEMP_FIELD.to_string(), Value::from(timestamp_ms));
    }

    /// Remove the `@temp` annotation, finalizing the transaction.
    pub fn clear_temp(&mut self) {
        self.fields.remove(TEMP_FIELD);
    }

    /// Whether `self` and `other` are the same pool element, as opposed to
    /// merely having equal content. Used by the pool's dedup check.
    pub fn same_identity(&self, other: &Transaction) -> bool {
        self.identity == other.identity
    }

    /// The JSON form used for hashing: object keys in sorted order, numbers
    /// rendered as JSON numbers (integers used by this ledger fit in `i64`/`u64`
    /// so no BigInt-as-decimal-string special case is needed in practice, but
    /// the field is passed through serde_json verbatim either way).
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.fields).expect("transaction fields are always serializable")
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Transaction {}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(json_value: Value) -> Transaction {
        Transaction::from_value(json_value).unwrap()
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Transaction::from_value(json!(42)).is_err());
        assert!(Transaction::from_value(json!({"a": 1})).is_ok());
    }

    #[test]
    fn test_transaction_id() {
        let t = tx(json!({"transactionId": "tx-1", "articleCode": "490"}));
        assert_eq!(t.transaction_id(), Some("tx-1"));
    }

    #[test]
    fn test_missing_transaction_id() {
        let t = tx(json!({"articleCode": "490"}));
        assert_eq!(t.transaction_id(), None);
    }

    #[test]
    fn test_temp_lifecycle() {
        let mut t = tx(json!({"transactionId": "tx-1"}));
        assert!(!t.is_temp());
        t.mark_temp(1_700_000_000_000);
        assert!(t.is_temp());
        assert_eq!(t.temp_timestamp(), Some(1_700_000_000_000));
        t.clear_temp();
        assert!(!t.is_temp());
        assert_eq!(t.temp_timestamp(), None);
    }

    #[test]
    fn test_canonical_json_is_sorted() {
        let t = tx(json!({"b": 1, "a": 2}));
        assert_eq!(t.canonical_json(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_value_roundtrip() {
        let original = json!({"transactionId": "tx-1", "amount": 10});
        let t = Transaction::from_value(original.clone()).unwrap();
        assert_eq!(t.to_value(), original);
    }

    #[test]
    fn test_equal_content_but_distinct_identity() {
        // Two transactions built from identical content are equal by value
        // but carry distinct identities: they are different pool elements.
        let a = tx(json!({"transactionId": "tx-1"}));
        let b = tx(json!({"transactionId": "tx-1"}));
        assert_eq!(a, b);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_clone_preserves_identity() {
        let a = tx(json!({"transactionId": "tx-1"}));
        let b = a.clone();
        assert!(a.same_identity(&b));
    }

    #[test]
    fn test_serde_roundtrip() {
        let t = tx(json!({"transactionId": "tx-1", "value": 5}));
        let s = serde_json::to_string(&t).unwrap();
        let back: Transaction = serde_json::from_str(&s).unwrap();
        assert_eq!(t, back);
    }
}

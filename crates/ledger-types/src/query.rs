//! The `getBlocks` query model: direction, paging, timestamp bounds, and
//! the dynamically-shaped transaction condition tree (spec §4.3, §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Iteration direction over the primary block keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending by block index.
    Forward,
    /// Descending by block index.
    Backward,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Backward
    }
}

/// How a condition's own keys combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperation {
    /// Conjunction across the condition's keys.
    And,
    /// Disjunction across the condition's keys (the default).
    Or,
    /// Per-key range predicate; keys hold `{begin, end}` bounds.
    Between,
}

impl Default for ConditionOperation {
    fn default() -> Self {
        ConditionOperation::Or
    }
}

/// One side of a `between` range bound. Present as a plain equality value
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// `{begin, end}` range bound, used when `operation == "between"`.
    Range {
        /// Inclusive lower bound.
        begin: Option<Value>,
        /// Inclusive upper bound.
        end: Option<Value>,
    },
    /// A plain scalar or structured value to match by equality or substring.
    Scalar(Value),
}

/// One stage of a `transactionCondition`: `{ operation?, ambiguous?, conditions }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCondition {
    /// How the condition's keys combine (defaults to `or`).
    #[serde(default)]
    pub operation: ConditionOperation,
    /// Substring matching instead of equality (ignored for `between`).
    #[serde(default)]
    pub ambiguous: bool,
    /// Attribute name -> expected value or range.
    pub conditions: HashMap<String, ConditionValue>,
}

/// `transactionCondition` may be a single object or an ordered array of
/// stages; an array is applied as successive AND filters (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionConditionSet {
    /// A single condition stage.
    Single(TransactionCondition),
    /// An ordered sequence of stages, intersected.
    Many(Vec<TransactionCondition>),
}

impl TransactionConditionSet {
    /// View the condition set as a slice of stages, regardless of which
    /// wire shape it was parsed from.
    pub fn stages(&self) -> Vec<&TransactionCondition> {
        match self {
            TransactionConditionSet::Single(c) => vec![c],
            TransactionConditionSet::Many(cs) => cs.iter().collect(),
        }
    }

    /// Every attribute name mentioned by any stage, used to decide whether
    /// the index-assisted fast path applies.
    pub fn mentioned_keys(&self) -> Vec<&str> {
        self.stages()
            .into_iter()
            .flat_map(|c| c.conditions.keys().map(String::as_str))
            .collect()
    }

    /// Whether any stage uses `between`, which disqualifies the fast path.
    pub fn has_between(&self) -> bool {
        self.stages()
            .iter()
            .any(|c| c.operation == ConditionOperation::Between)
    }
}

/// Query parameters for `getBlocks` / `restoreBlocks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockQuery {
    /// Iteration direction (default `backward`).
    #[serde(default)]
    pub direction: Direction,
    /// Number of matching blocks to skip before emitting.
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of blocks to emit.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Inclusive lower bound on block timestamp.
    #[serde(default)]
    pub timestamp_start: Option<i64>,
    /// Inclusive upper bound on block timestamp.
    #[serde(default)]
    pub timestamp_end: Option<i64>,
    /// Emit condensed `BlockHeader`s instead of full blocks.
    #[serde(default)]
    pub header_only: bool,
    /// Transaction-level filter, narrowing which transactions (and thus
    /// which blocks) are returned.
    #[serde(default)]
    pub transaction_condition: Option<TransactionConditionSet>,
}

fn default_limit() -> usize {
    usize::MAX
}

impl Default for BlockQuery {
    fn default() -> Self {
        BlockQuery {
            direction: Direction::default(),
            offset: 0,
            limit: default_limit(),
            timestamp_start: None,
            timestamp_end: None,
            header_only: false,
            transaction_condition: None,
        }
    }
}

//! Wire message shapes and the provisional-block entry model (spec §3, §4.1).

use ledger_primitives::NodeId;
use ledger_types::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConsensusError, ConsensusResult};

/// What kind of client command a provisional entry replays once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// `addTransaction`.
    Normal,
    /// `addTemporaryTransaction`.
    Temporary,
    /// `commitTransaction`.
    Commit,
}

/// A provisional entry's payload: transactions for `normal`/`temporary`,
/// transaction ids for `commit`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionalPayload {
    /// One or more transactions to add to the pool.
    Transactions(Vec<Transaction>),
    /// One or more transaction ids to finalize.
    TransactionIds(Vec<String>),
}

impl ProvisionalPayload {
    /// Encode to the wire's `Transaction | [Transaction]` / `id | [id]` shape:
    /// bare for a single element, an array for more than one.
    pub fn to_value(&self) -> Value {
        match self {
            ProvisionalPayload::Transactions(ts) => match ts.as_slice() {
                [single] => single.to_value(),
                many => Value::Array(many.iter().map(Transaction::to_value).collect()),
            },
            ProvisionalPayload::TransactionIds(ids) => match ids.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            },
        }
    }

    /// Decode a wire value according to `entry_type`.
    pub fn from_value(entry_type: EntryType, value: &Value) -> ConsensusResult<Self> {
        match entry_type {
            EntryType::Normal | EntryType::Temporary => {
                let values = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                let transactions = values
                    .into_iter()
                    .map(Transaction::from_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ConsensusError::MalformedPayload(e.to_string()))?;
                Ok(ProvisionalPayload::Transactions(transactions))
            }
            EntryType::Commit => {
                let ids = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| {
                            v.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| ConsensusError::MalformedPayload("expected a string id".into()))
                        })
                        .collect::<ConsensusResult<Vec<_>>>()?,
                    Value::String(s) => vec![s.clone()],
                    other => {
                        return Err(ConsensusError::MalformedPayload(format!(
                            "expected a transaction id or array of ids, got {other}"
                        )))
                    }
                };
                Ok(ProvisionalPayload::TransactionIds(ids))
            }
        }
    }
}

/// `{sequence, transaction, type}` entry in an `append` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    /// Leader-assigned monotonic sequence number.
    pub sequence: u64,
    /// Transaction(s) or transaction id(s), shaped per `entry_type`.
    pub transaction: Value,
    /// Which client command this entry replays.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// `{sequences}` batch-commit notice appended by the leader once a quorum
/// of entries has been acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedEntry {
    /// Sequences the leader has determined are safe to commit.
    pub sequences: Vec<u64>,
}

/// The `entry` field of an `append` message: either a single new entry or a
/// batch commit notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppendEntry {
    /// A new provisional entry being replicated.
    New(NewEntry),
    /// A batch of sequences being committed.
    Committed(CommittedEntry),
}

/// `{command: "vote", data: {id, term}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Candidate's node id.
    pub id: NodeId,
    /// Candidate's term.
    pub term: u64,
}

/// `{dataName: "voted", data: {granted, from, term}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotedReply {
    /// Whether the vote was granted.
    pub granted: bool,
    /// Replying node's id.
    pub from: NodeId,
    /// Term the vote was cast in.
    pub term: u64,
}

/// `{command: "append", data: {id, term, sequence?, entry?}}`. A bare
/// heartbeat carries `sequence` and no `entry`; a replication message
/// carries `entry` and no `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMessage {
    /// Sender's node id (the leader, or believed leader).
    pub id: NodeId,
    /// Sender's term.
    pub term: u64,
    /// Heartbeat's current provisional sequence, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// A new entry or commit batch, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<AppendEntry>,
}

/// `{dataName: "appended", data: {from, term, entry: {sequence}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendedMessage {
    /// Replying follower's id.
    pub from: NodeId,
    /// Follower's term at acknowledgment time.
    pub term: u64,
    /// The acknowledged sequence.
    pub entry: AppendedEntry,
}

/// The `entry` field of an `appended` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendedEntry {
    /// The sequence being acknowledged.
    pub sequence: u64,
}

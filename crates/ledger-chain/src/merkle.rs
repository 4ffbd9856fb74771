//! Merkle root computation over a block's transactions.

use ledger_crypto::sha256_hex;
use ledger_types::Transaction;

/// Recursive pair-wise SHA-256 of transaction hashes, carrying a trailing
/// singleton through unchanged (spec §4.2). Returns `None` for an empty
/// sequence; the genesis block uses the `H0` constant instead of calling
/// this function.
pub fn merkle_root(transactions: &[Transaction]) -> Option<String> {
    if transactions.is_empty() {
        return None;
    }

    let mut level: Vec<String> = transactions
        .iter()
        .map(|t| sha256_hex(t.canonical_json().as_bytes()))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut pairs = level.chunks(2);
        while let Some(pair) = pairs.next() {
            let combined = match pair {
                [a, b] => sha256_hex(format!("{a}{b}").as_bytes()),
                [a] => a.clone(),
                _ => unreachable!("chunks(2) never yields more than 2 elements"),
            };
            next.push(combined);
        }
        level = next;
    }

    level.into_iter().next()
}

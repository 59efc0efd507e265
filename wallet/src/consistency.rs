// Copyright 2018 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pool consistency checks (§3 invariants 1-6, §8 universal properties
//! 1-4). `debug_assert_consistent` is the hook every mutating operation
//! is meant to run through in debug builds; release builds skip the
//! O(n) walk entirely, mirroring how `grin`'s own sum-verification
//! assertions are gated behind `debug_assertions` rather than shipped as
//! always-on runtime checks.

use crate::error::{Error, ErrorKind};
use crate::pool::{PoolKind, TransactionPool};
use crate::tx::{ConfidenceType, Outpoint};
use std::collections::HashSet;

/// Walks `pool` and returns the first invariant violation found, if any.
pub fn is_consistent_or_throw(pool: &TransactionPool) -> Result<(), Error> {
	check_pool_disjointness(pool)?;
	check_unspent_has_available_output(pool)?;
	check_spent_has_no_available_output(pool)?;
	check_my_unspents_completeness(pool)?;
	check_confidence_pool_agreement(pool)?;
	check_connected_output_pointers(pool)?;
	Ok(())
}

fn violation(message: impl Into<String>) -> Error {
	ErrorKind::InvariantViolation(message.into()).into()
}

/// §3 invariant 5 / §8 property 1: no hash appears in more than one
/// pool, and `all_txs` matches the union exactly (guaranteed by
/// construction since the four pools are disjoint maps, but checked
/// here in case a future refactor breaks that).
fn check_pool_disjointness(pool: &TransactionPool) -> Result<(), Error> {
	let mut seen = HashSet::new();
	for kind in PoolKind::all() {
		for tx in pool.pool(kind) {
			if !seen.insert(tx.hash) {
				return Err(violation(format!("transaction {} present in more than one pool", tx.hash)));
			}
		}
	}
	Ok(())
}

/// §3 invariant 1 / §8 property 2 (UNSPENT direction).
fn check_unspent_has_available_output(pool: &TransactionPool) -> Result<(), Error> {
	for tx in pool.pool(PoolKind::Unspent) {
		let has_available = tx.outputs.iter().any(|o| o.is_mine && o.available_for_spending());
		if !has_available {
			return Err(violation(format!("transaction {} in UNSPENT has no available owned output", tx.hash)));
		}
	}
	Ok(())
}

/// §3 invariant 2 / §8 property 2 (SPENT direction).
fn check_spent_has_no_available_output(pool: &TransactionPool) -> Result<(), Error> {
	for tx in pool.pool(PoolKind::Spent) {
		let all_spent = tx.outputs.iter().filter(|o| o.is_mine).all(|o| !o.available_for_spending());
		if !all_spent {
			return Err(violation(format!("transaction {} in SPENT has an available owned output", tx.hash)));
		}
	}
	Ok(())
}

/// §3 invariant 3 / §8 property 3: `my_unspents` is exactly the set of
/// owned-or-watched, available outputs whose parent is in UNSPENT or
/// PENDING.
fn check_my_unspents_completeness(pool: &TransactionPool) -> Result<(), Error> {
	let mut expected: HashSet<Outpoint> = HashSet::new();
	for kind in [PoolKind::Unspent, PoolKind::Pending] {
		for tx in pool.pool(kind) {
			for (idx, output) in tx.outputs.iter().enumerate() {
				if output.is_mine && output.available_for_spending() {
					expected.insert(Outpoint { hash: tx.hash, index: idx as u32 });
				}
			}
		}
	}
	let actual: HashSet<Outpoint> = pool.my_unspents().clone();
	if actual != expected {
		return Err(violation("my_unspents does not match the set of available owned outputs in UNSPENT/PENDING"));
	}
	Ok(())
}

/// §3 invariant 4 / §8 property 4: confidence type matches pool
/// membership.
fn check_confidence_pool_agreement(pool: &TransactionPool) -> Result<(), Error> {
	for tx in pool.pool(PoolKind::Pending) {
		if !tx.confidence.is_pending_like() {
			return Err(violation(format!("transaction {} in PENDING has non-pending confidence", tx.hash)));
		}
	}
	for kind in [PoolKind::Unspent, PoolKind::Spent] {
		for tx in pool.pool(kind) {
			if !matches!(tx.confidence.confidence_type, ConfidenceType::Building { .. }) {
				return Err(violation(format!("transaction {} in UNSPENT/SPENT is not BUILDING", tx.hash)));
			}
		}
	}
	for tx in pool.pool(PoolKind::Dead) {
		if !tx.confidence.is_dead() {
			return Err(violation(format!("transaction {} in DEAD does not carry DEAD confidence", tx.hash)));
		}
	}
	Ok(())
}

/// §3 invariant 6: an input's `connected_output` pointer, when set, must
/// point at an output whose `spent_by` is that same input.
fn check_connected_output_pointers(pool: &TransactionPool) -> Result<(), Error> {
	for tx in pool.all_txs() {
		for (index, input) in tx.inputs.iter().enumerate() {
			if let Some(pointee) = input.connected_output {
				let back_reference = Outpoint { hash: tx.hash, index: index as u32 };
				let points_back = pool
					.get(&pointee.hash)
					.and_then(|t| t.outputs.get(pointee.index as usize))
					.map(|o| o.spent_by == Some(back_reference))
					.unwrap_or(false);
				if !points_back {
					return Err(violation(format!("dangling connected_output pointer on an input of {}", tx.hash)));
				}
			}
		}
	}
	Ok(())
}

/// Debug-only hook mutating operations run through after they finish.
/// Panics on the first violation found, the same "fail loudly in debug,
/// trust the invariant in release" posture as the teacher's balance sum
/// verification.
#[cfg(debug_assertions)]
pub fn debug_assert_consistent(pool: &TransactionPool) {
	if let Err(e) = is_consistent_or_throw(pool) {
		panic!("wallet pool consistency check failed: {}", e);
	}
}

/// No-op in release builds.
#[cfg(not(debug_assertions))]
pub fn debug_assert_consistent(_pool: &TransactionPool) {}

#[cfg(test)]
mod test {
	use super::*;
	use crate::amount::Amount;
	use crate::tx::{Confidence, Script, Source, Tx, TxHash, TxOutput};

	fn owned_confirmed_tx(byte: u8, value: u64) -> Tx {
		let mut tx = Tx::new(TxHash([byte; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(value), Script(vec![byte]))]);
		tx.outputs[0].is_mine = true;
		tx.confidence = Confidence::pending(Source::Network);
		tx.confidence.confirm(10);
		tx
	}

	#[test]
	fn freshly_admitted_pool_is_consistent() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Unspent, owned_confirmed_tx(1, 1000)).unwrap();
		assert!(is_consistent_or_throw(&pool).is_ok());
	}

	#[test]
	fn spent_tx_with_available_output_is_flagged() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Spent, owned_confirmed_tx(2, 1000)).unwrap();
		let err = is_consistent_or_throw(&pool).unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::InvariantViolation(_)));
	}

	#[test]
	fn pending_pool_with_building_confidence_is_flagged() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Pending, owned_confirmed_tx(3, 1000)).unwrap();
		let err = is_consistent_or_throw(&pool).unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::InvariantViolation(_)));
	}
}

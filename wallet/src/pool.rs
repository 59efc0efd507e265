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

//! The transaction pool: the four maps (pending, unspent, spent, dead)
//! plus `my_unspents`, and the move rules between them (§4.A).
//!
//! Grounded in `grin`'s `pool::types::Parent` tracking, generalized from
//! a single mempool-vs-blockchain distinction to the four-pool model this
//! wallet needs.

use crate::error::{Error, ErrorKind};
use crate::tx::{Outpoint, Tx, TxHash};
use std::collections::{HashMap, HashSet};

/// Which of the four pools a transaction currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
	/// seen but not yet confirmed, or in conflict
	Pending,
	/// confirmed, at least one owned output still spendable
	Unspent,
	/// confirmed, every owned output already spent
	Spent,
	/// displaced by a winning double spend
	Dead,
}

impl PoolKind {
	/// All four pool tags, in the canonical order used by persistence.
	pub fn all() -> [PoolKind; 4] {
		[
			PoolKind::Pending,
			PoolKind::Unspent,
			PoolKind::Spent,
			PoolKind::Dead,
		]
	}
}

/// The transaction pool proper. All mutation is expected to happen under
/// the caller's `wallet_lock` (§5); this type has no internal locking of
/// its own.
#[derive(Debug, Default)]
pub struct TransactionPool {
	pending: HashMap<TxHash, Tx>,
	unspent: HashMap<TxHash, Tx>,
	spent: HashMap<TxHash, Tx>,
	dead: HashMap<TxHash, Tx>,
	/// outpoints of owned-or-watched outputs that are currently available
	/// for spending, kept in sync with every pool mutation rather than
	/// recomputed on read.
	my_unspents: HashSet<Outpoint>,
}

impl TransactionPool {
	/// Builds an empty pool.
	pub fn new() -> TransactionPool {
		TransactionPool::default()
	}

	fn map_for(&self, pool: PoolKind) -> &HashMap<TxHash, Tx> {
		match pool {
			PoolKind::Pending => &self.pending,
			PoolKind::Unspent => &self.unspent,
			PoolKind::Spent => &self.spent,
			PoolKind::Dead => &self.dead,
		}
	}

	fn map_for_mut(&mut self, pool: PoolKind) -> &mut HashMap<TxHash, Tx> {
		match pool {
			PoolKind::Pending => &mut self.pending,
			PoolKind::Unspent => &mut self.unspent,
			PoolKind::Spent => &mut self.spent,
			PoolKind::Dead => &mut self.dead,
		}
	}

	/// O(1) membership: which pool (if any) holds this hash.
	pub fn containing_pool(&self, hash: &TxHash) -> Option<PoolKind> {
		for pool in PoolKind::all() {
			if self.map_for(pool).contains_key(hash) {
				return Some(pool);
			}
		}
		None
	}

	/// Inserts `tx` into `pool` and the global index. Fails if the hash
	/// is already present in any pool (§4.A).
	pub fn add(&mut self, pool: PoolKind, tx: Tx) -> Result<(), Error> {
		if self.containing_pool(&tx.hash).is_some() {
			return Err(ErrorKind::InvariantViolation(format!(
				"transaction {} already present in the pool",
				tx.hash
			))
			.into());
		}
		self.sync_my_unspents_for_insert(&tx);
		self.map_for_mut(pool).insert(tx.hash, tx);
		Ok(())
	}

	/// Moves a transaction between pools, atomically from the caller's
	/// perspective (no intermediate state is observable since both maps
	/// are mutated before returning).
	pub fn move_tx(&mut self, hash: &TxHash, to: PoolKind) -> Result<(), Error> {
		let from = self
			.containing_pool(hash)
			.ok_or_else(|| ErrorKind::InvariantViolation(format!("unknown transaction {}", hash)))?;
		if from == to {
			return Ok(());
		}
		let tx = self.map_for_mut(from).remove(hash).unwrap();
		self.map_for_mut(to).insert(*hash, tx);
		Ok(())
	}

	/// Borrows a transaction by hash, regardless of pool.
	pub fn get(&self, hash: &TxHash) -> Option<&Tx> {
		PoolKind::all()
			.iter()
			.find_map(|&pool| self.map_for(pool).get(hash))
	}

	/// Mutably borrows a transaction by hash, regardless of pool.
	pub fn get_mut(&mut self, hash: &TxHash) -> Option<&mut Tx> {
		if self.pending.contains_key(hash) {
			return self.pending.get_mut(hash);
		}
		if self.unspent.contains_key(hash) {
			return self.unspent.get_mut(hash);
		}
		if self.spent.contains_key(hash) {
			return self.spent.get_mut(hash);
		}
		self.dead.get_mut(hash)
	}

	/// Removes a transaction from whichever pool holds it.
	pub fn remove(&mut self, hash: &TxHash) -> Option<(PoolKind, Tx)> {
		let pool = self.containing_pool(hash)?;
		let tx = self.map_for_mut(pool).remove(hash)?;
		Some((pool, tx))
	}

	/// Iterates every transaction the wallet holds, across all four pools.
	pub fn all_txs(&self) -> impl Iterator<Item = &Tx> {
		self.pending
			.values()
			.chain(self.unspent.values())
			.chain(self.spent.values())
			.chain(self.dead.values())
	}

	/// Read-only access to a specific pool's contents.
	pub fn pool(&self, pool: PoolKind) -> impl Iterator<Item = &Tx> {
		self.map_for(pool).values()
	}

	/// The owned-or-watched outputs currently available for spending.
	pub fn my_unspents(&self) -> &HashSet<Outpoint> {
		&self.my_unspents
	}

	/// Re-evaluates whether `hash` belongs in UNSPENT or SPENT, moving it
	/// if its pool disagrees with the state of its owned outputs (§4.A
	/// `maybe_move_pool`). No-op for transactions outside those two
	/// pools.
	pub fn maybe_move_pool(&mut self, hash: &TxHash) -> Result<(), Error> {
		let current = match self.containing_pool(hash) {
			Some(p @ PoolKind::Unspent) | Some(p @ PoolKind::Spent) => p,
			_ => return Ok(()),
		};
		let tx = self.get(hash).unwrap();
		let any_owned_available = tx
			.outputs
			.iter()
			.filter(|o| o.is_mine)
			.any(|o| o.available_for_spending());
		let target = if any_owned_available {
			PoolKind::Unspent
		} else {
			PoolKind::Spent
		};
		if target != current {
			self.move_tx(hash, target)?;
		}
		Ok(())
	}

	/// Marks the output at `outpoint` (which must belong to a transaction
	/// already in the pool) as spent by `spending_input`, updating
	/// `my_unspents` before returning (§4.A policy).
	pub fn mark_output_spent(&mut self, outpoint: Outpoint, spending_input: Outpoint) {
		if let Some(tx) = self.get_mut(&outpoint.hash) {
			if let Some(out) = tx.outputs.get_mut(outpoint.index as usize) {
				out.spent_by = Some(spending_input);
				tx.touch();
			}
		}
		self.my_unspents.remove(&outpoint);
	}

	/// Marks the output at `outpoint` available again (used when
	/// disconnecting during reorg), updating `my_unspents` before
	/// returning.
	pub fn mark_output_available(&mut self, outpoint: Outpoint) {
		let is_mine = if let Some(tx) = self.get_mut(&outpoint.hash) {
			if let Some(out) = tx.outputs.get_mut(outpoint.index as usize) {
				out.spent_by = None;
				let is_mine = out.is_mine;
				tx.touch();
				is_mine
			} else {
				false
			}
		} else {
			false
		};
		let parent_in_unspent_or_pending = matches!(
			self.containing_pool(&outpoint.hash),
			Some(PoolKind::Unspent) | Some(PoolKind::Pending)
		);
		if is_mine && parent_in_unspent_or_pending {
			self.my_unspents.insert(outpoint);
		}
	}

	fn sync_my_unspents_for_insert(&mut self, tx: &Tx) {
		for (idx, out) in tx.outputs.iter().enumerate() {
			if out.is_mine && out.available_for_spending() {
				self.my_unspents.insert(Outpoint {
					hash: tx.hash,
					index: idx as u32,
				});
			}
		}
	}

	/// Number of transactions across all pools.
	pub fn len(&self) -> usize {
		self.pending.len() + self.unspent.len() + self.spent.len() + self.dead.len()
	}

	/// True iff the pool holds no transactions.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::tx::{Confidence, TxOutput};
	use crate::amount::Amount;
	use crate::tx::Script;

	fn hash(byte: u8) -> TxHash {
		TxHash([byte; 32])
	}

	fn owned_tx(h: TxHash, value: u64) -> Tx {
		let mut tx = Tx::new(h, Vec::new(), vec![TxOutput::new(Amount::from_sat(value), Script(vec![]))]);
		tx.outputs[0].is_mine = true;
		tx.confidence = Confidence::pending(crate::tx::Source::Network);
		tx
	}

	#[test]
	fn add_rejects_duplicate_hash() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Pending, owned_tx(hash(1), 100)).unwrap();
		let err = pool.add(PoolKind::Pending, owned_tx(hash(1), 200)).unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::InvariantViolation(_)));
	}

	#[test]
	fn move_tx_changes_containing_pool() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Pending, owned_tx(hash(2), 100)).unwrap();
		pool.move_tx(&hash(2), PoolKind::Unspent).unwrap();
		assert_eq!(pool.containing_pool(&hash(2)), Some(PoolKind::Unspent));
	}

	#[test]
	fn maybe_move_pool_tracks_spend_state() {
		let mut pool = TransactionPool::new();
		pool.add(PoolKind::Unspent, owned_tx(hash(3), 100)).unwrap();
		pool.mark_output_spent(
			Outpoint {
				hash: hash(3),
				index: 0,
			},
			Outpoint {
				hash: hash(4),
				index: 0,
			},
		);
		pool.maybe_move_pool(&hash(3)).unwrap();
		assert_eq!(pool.containing_pool(&hash(3)), Some(PoolKind::Spent));
		assert!(!pool.my_unspents().contains(&Outpoint {
			hash: hash(3),
			index: 0
		}));
	}
}

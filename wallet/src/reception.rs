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

//! Reception Engine (§4.C): admits transactions from mempool
//! announcements and from best-chain/side-chain block events, driving
//! the pool (A) and confidence tracker (B).
//!
//! Grounded in `libwallet/internal/updater.rs`'s pattern of mapping
//! wallet state against chain state and then reconciling the two, here
//! specialized to the pool/confidence model instead of grin's single
//! `OutputData` status field.

use crate::blockchain::{BlockType, StoredBlock};
use crate::error::Error;
use crate::keybag::KeyBag;
use crate::pool::{PoolKind, TransactionPool};
use crate::risk::{RiskAnalyzer, RiskVerdict};
use crate::tx::{ChangeReason, Confidence, Outpoint, Source, Tx, TxHash};
use std::collections::{HashSet, VecDeque};

/// Outcome of `receive_pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
	/// admitted into the pool
	Admitted,
	/// the tx was already known; admission is a silent no-op (§4.C)
	AlreadyKnown,
	/// not relevant to this wallet
	NotRelevant,
	/// rejected by the risk analyzer and recorded in the risk-dropped
	/// cache
	RiskDropped,
}

/// A bounded FIFO set of recently risk-dropped transaction hashes
/// (§4.C, §8 property 8). Reannouncements of a remembered hash are
/// rejected without re-running the risk analyzer.
#[derive(Debug)]
struct RiskDroppedCache {
	capacity: usize,
	order: VecDeque<TxHash>,
	set: HashSet<TxHash>,
}

impl RiskDroppedCache {
	fn new(capacity: usize) -> RiskDroppedCache {
		RiskDroppedCache {
			capacity,
			order: VecDeque::new(),
			set: HashSet::new(),
		}
	}

	fn contains(&self, hash: &TxHash) -> bool {
		self.set.contains(hash)
	}

	fn insert(&mut self, hash: TxHash) {
		if self.set.contains(&hash) {
			return;
		}
		if self.order.len() >= self.capacity {
			if let Some(oldest) = self.order.pop_front() {
				self.set.remove(&oldest);
			}
		}
		self.order.push_back(hash);
		self.set.insert(hash);
	}
}

/// Drives pending/block admission against a `TransactionPool`. Owns the
/// risk-dropped cache, which must persist across calls, and the
/// pluggable risk policy.
pub struct ReceptionEngine {
	risk_dropped: RiskDroppedCache,
	risk_analyzer: Box<dyn RiskAnalyzer + Send + Sync>,
}

impl ReceptionEngine {
	/// Builds a reception engine with the given risk policy and
	/// risk-dropped cache capacity.
	pub fn new(risk_analyzer: Box<dyn RiskAnalyzer + Send + Sync>, cache_capacity: usize) -> ReceptionEngine {
		ReceptionEngine {
			risk_dropped: RiskDroppedCache::new(cache_capacity),
			risk_analyzer,
		}
	}

	/// True if a previously risk-dropped hash was remembered (used by
	/// tests and callers wanting to avoid duplicate work upstream).
	pub fn is_risk_dropped(&self, hash: &TxHash) -> bool {
		self.risk_dropped.contains(hash)
	}

	/// (1) `receive_pending`: admits a mempool-announced transaction.
	/// Confidence transitions along the way are appended to
	/// `confidence_events` for the caller to dispatch as
	/// `WalletEvent::ConfidenceChanged` (§4.J).
	pub fn receive_pending(
		&mut self,
		pool: &mut TransactionPool,
		keybag: &dyn KeyBag,
		mut tx: Tx,
		allow_risky: bool,
		current_height: u32,
		current_time: i64,
		confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>,
	) -> Result<ReceiveOutcome, Error> {
		if pool.containing_pool(&tx.hash).is_some() {
			return Ok(ReceiveOutcome::AlreadyKnown);
		}
		if self.risk_dropped.contains(&tx.hash) {
			return Ok(ReceiveOutcome::RiskDropped);
		}
		if !is_pending_relevant(&tx, pool, keybag) {
			return Ok(ReceiveOutcome::NotRelevant);
		}

		if !allow_risky {
			if let RiskVerdict::NonFinal =
				self.risk_analyzer.analyze(&tx, current_height, current_time)
			{
				self.risk_dropped.insert(tx.hash);
				return Ok(ReceiveOutcome::RiskDropped);
			}
		}

		mark_ownership(&mut tx, keybag);
		tx.confidence = Confidence::pending(Source::Network);
		let conflicts = find_pool_conflicts(pool, &tx);
		if !conflicts.is_empty() {
			push_event(confidence_events, tx.hash, tx.confidence.mark_in_conflict());
			for conflictor in &conflicts {
				if let Some(other) = pool.get_mut(conflictor) {
					let reasons = other.confidence.mark_in_conflict();
					push_event(confidence_events, *conflictor, reasons);
				}
			}
		}
		pool.add(PoolKind::Pending, tx.clone())?;
		update_for_spends(pool, &tx.hash, false)?;
		Ok(ReceiveOutcome::Admitted)
	}

	/// (2) `receive_from_block`: admits a transaction observed inside a
	/// delivered block. Confidence transitions along the way are appended
	/// to `confidence_events` for the caller to dispatch as
	/// `WalletEvent::ConfidenceChanged` (§4.J).
	pub fn receive_from_block(
		&mut self,
		pool: &mut TransactionPool,
		keybag: &dyn KeyBag,
		mut tx: Tx,
		block: StoredBlock,
		block_type: BlockType,
		relativity_offset: u32,
		chain_tip_height: u32,
		force_add_to_pool: bool,
		confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>,
	) -> Result<(), Error> {
		mark_ownership(&mut tx, keybag);

		if let BlockType::SideChain = block_type {
			if pool.containing_pool(&tx.hash).is_none() {
				tx.confidence = Confidence::pending(Source::Network);
				tx.block_appearances.push((block.hash, relativity_offset));
				pool.add(PoolKind::Pending, tx)?;
			} else if let Some(existing) = pool.get_mut(&tx.hash) {
				existing.block_appearances.push((block.hash, relativity_offset));
			}
			return Ok(());
		}

		// BEST_CHAIN.
		let was_dead_coinbase = matches!(pool.containing_pool(&tx.hash), Some(PoolKind::Dead))
			&& pool.get(&tx.hash).map(|t| t.is_coinbase).unwrap_or(false);
		if was_dead_coinbase {
			pool.remove(&tx.hash);
		}

		if let Some(PoolKind::Pending) = pool.containing_pool(&tx.hash) {
			let (_, existing) = pool.remove(&tx.hash).unwrap();
			tx.confidence = existing.confidence;
			tx.block_appearances = existing.block_appearances;
			for (input_index, input) in existing.inputs.iter().enumerate() {
				let spending_input = Outpoint { hash: tx.hash, index: input_index as u32 };
				if let Some(t) = pool.get_mut(&input.outpoint.hash) {
					if let Some(out) = t.outputs.get_mut(input.outpoint.index as usize) {
						if out.spent_by == Some(spending_input) {
							out.spent_by = None;
						}
					}
				}
			}
		}

		let pays_to_me = tx.outputs.iter().any(|o| o.is_mine);
		let spends_from_me = tx
			.inputs
			.iter()
			.any(|i| pool.get(&i.outpoint.hash).is_some());

		if pays_to_me || spends_from_me || force_add_to_pool {
			tx.block_appearances.push((block.hash, relativity_offset));
			let all_owned_spent = !tx.outputs.iter().any(|o| o.is_mine) || {
				tx.outputs
					.iter()
					.filter(|o| o.is_mine)
					.all(|o| !o.available_for_spending())
			};
			let target = if pays_to_me && !all_owned_spent {
				PoolKind::Unspent
			} else if spends_from_me || all_owned_spent {
				PoolKind::Spent
			} else {
				PoolKind::Unspent
			};
			pool.add(target, tx.clone())?;

			kill_pending_double_spends(pool, &tx, confidence_events);

			let depth = block.height.saturating_sub(chain_tip_height.saturating_sub(1)).max(1);
			if let Some(t) = pool.get_mut(&tx.hash) {
				let reasons = t.confidence.confirm(block.height);
				push_event(confidence_events, tx.hash, reasons);
				if let crate::tx::ConfidenceType::Building {
					depth: d, ..
				} = &mut t.confidence.confidence_type
				{
					*d = depth;
				}
			}
			update_for_spends(pool, &tx.hash, true)?;
			pool.maybe_move_pool(&tx.hash)?;
		}
		Ok(())
	}
}

/// Appends a confidence event, skipping transitions that reported no
/// actual change.
fn push_event(events: &mut Vec<(TxHash, Vec<ChangeReason>)>, hash: TxHash, reasons: Vec<ChangeReason>) {
	if !reasons.is_empty() {
		events.push((hash, reasons));
	}
}

/// `update_for_spends`: connects each input of `hash` to the output it
/// spends, in unspent -> spent -> pending order, never overriding an
/// existing connection (ABORT_ON_CONFLICT). After connecting this tx's
/// own inputs, every already-pending transaction is retried against
/// this tx's newly available outputs.
pub fn update_for_spends(pool: &mut TransactionPool, hash: &TxHash, from_chain: bool) -> Result<(), Error> {
	let inputs: Vec<(u32, Outpoint)> = match pool.get(hash) {
		Some(tx) => tx.inputs.iter().map(|i| i.outpoint).enumerate().map(|(i, o)| (i as u32, o)).collect(),
		None => return Ok(()),
	};

	for (input_index, outpoint) in inputs {
		let prev_exists = pool.get(&outpoint.hash).is_some();
		if !prev_exists {
			continue; // NO_SUCH_TX
		}
		let already_spent = pool
			.get(&outpoint.hash)
			.and_then(|t| t.outputs.get(outpoint.index as usize))
			.map(|o| !o.available_for_spending())
			.unwrap_or(false);

		if already_spent {
			if !from_chain {
				log::warn!(
					"possible double spend: {} already spends {}",
					hash,
					outpoint
				);
			}
			continue; // ALREADY_SPENT
		}

		let spending_input = Outpoint {
			hash: *hash,
			index: input_index,
		};
		pool.mark_output_spent(outpoint, spending_input);
		if let Some(tx) = pool.get_mut(hash) {
			if let Some(input) = tx.inputs.get_mut(input_index as usize) {
				input.connected_output = Some(outpoint);
			}
		}
		pool.maybe_move_pool(&outpoint.hash)?;
	}

	// Retry every pending transaction's inputs against this tx's outputs.
	let pending_hashes: Vec<TxHash> = pool.pool(PoolKind::Pending).map(|t| t.hash).collect();
	for pending_hash in pending_hashes {
		if pending_hash == *hash {
			continue;
		}
		let references_us = pool
			.get(&pending_hash)
			.map(|t| t.inputs.iter().any(|i| i.outpoint.hash == *hash))
			.unwrap_or(false);
		if references_us {
			reconnect_inputs(pool, &pending_hash)?;
		}
	}
	Ok(())
}

fn reconnect_inputs(pool: &mut TransactionPool, hash: &TxHash) -> Result<(), Error> {
	let inputs: Vec<(u32, Outpoint)> = match pool.get(hash) {
		Some(tx) => tx.inputs.iter().map(|i| i.outpoint).enumerate().map(|(i, o)| (i as u32, o)).collect(),
		None => return Ok(()),
	};
	for (input_index, outpoint) in inputs {
		let available = pool
			.get(&outpoint.hash)
			.and_then(|t| t.outputs.get(outpoint.index as usize))
			.map(|o| o.available_for_spending())
			.unwrap_or(false);
		if available {
			let spending_input = Outpoint {
				hash: *hash,
				index: input_index,
			};
			pool.mark_output_spent(outpoint, spending_input);
			if let Some(tx) = pool.get_mut(hash) {
				if let Some(input) = tx.inputs.get_mut(input_index as usize) {
					input.connected_output = Some(outpoint);
				}
			}
			pool.maybe_move_pool(&outpoint.hash)?;
		}
	}
	Ok(())
}

/// Finds pool-resident transactions that spend any outpoint `tx` also
/// spends — a pool double-spend, per the IN_CONFLICT transition.
fn find_pool_conflicts(pool: &TransactionPool, tx: &Tx) -> Vec<TxHash> {
	let my_outpoints: HashSet<Outpoint> = tx.inputs.iter().map(|i| i.outpoint).collect();
	pool.pool(PoolKind::Pending)
		.filter(|other| other.hash != tx.hash)
		.filter(|other| other.inputs.iter().any(|i| my_outpoints.contains(&i.outpoint)))
		.map(|other| other.hash)
		.collect()
}

/// Recursively kills every pending transaction that spends an outpoint
/// `confirmed` also spends (§4.C "find and kill pending double-spends").
fn kill_pending_double_spends(
	pool: &mut TransactionPool,
	confirmed: &Tx,
	confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>,
) {
	let my_outpoints: HashSet<Outpoint> = confirmed.inputs.iter().map(|i| i.outpoint).collect();
	let victims: Vec<TxHash> = pool
		.pool(PoolKind::Pending)
		.filter(|other| other.hash != confirmed.hash)
		.filter(|other| other.inputs.iter().any(|i| my_outpoints.contains(&i.outpoint)))
		.map(|other| other.hash)
		.collect();
	for victim in victims {
		kill_recursive(pool, &victim, confirmed.hash, confidence_events);
	}
}

fn kill_recursive(
	pool: &mut TransactionPool,
	hash: &TxHash,
	overriding_tx: TxHash,
	confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>,
) {
	let descendants: Vec<TxHash> = pool
		.all_txs()
		.filter(|t| t.inputs.iter().any(|i| i.outpoint.hash == *hash))
		.map(|t| t.hash)
		.collect();
	if let Some(tx) = pool.get_mut(hash) {
		let reasons = tx.confidence.kill(Some(overriding_tx));
		push_event(confidence_events, *hash, reasons);
		// A dead transaction no longer holds its spend connections; the
		// overriding transaction (or nothing) now owns the spent_by
		// back-reference on whatever this used to spend.
		for input in &mut tx.inputs {
			input.connected_output = None;
		}
	}
	if pool.containing_pool(hash) != Some(PoolKind::Dead) {
		let _ = pool.move_tx(hash, PoolKind::Dead);
	}
	for descendant in descendants {
		kill_recursive(pool, &descendant, overriding_tx, confidence_events);
	}
}

/// `is_pending_relevant`: true if `tx` pays to or spends from owned
/// outputs, or double-spends a wallet-resident transaction.
fn is_pending_relevant(tx: &Tx, pool: &TransactionPool, keybag: &dyn KeyBag) -> bool {
	let pays_to_me = tx
		.outputs
		.iter()
		.any(|o| keybag.owns_script(&o.script_pubkey) || keybag.is_watched_script(&o.script_pubkey));
	let spends_from_me = tx
		.inputs
		.iter()
		.any(|i| pool.get(&i.outpoint.hash).is_some());
	let double_spends = !find_pool_conflicts(pool, tx).is_empty();
	pays_to_me || spends_from_me || double_spends
}

fn mark_ownership(tx: &mut Tx, keybag: &dyn KeyBag) {
	for output in &mut tx.outputs {
		output.is_mine =
			keybag.owns_script(&output.script_pubkey) || keybag.is_watched_script(&output.script_pubkey);
	}
}

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

//! Reorg Engine (§4.D): unwinds the side-lined branch and replays the
//! new best chain against the pool and confidence tracker.
//!
//! Grounded in the pool's block-appearance index (§4.A/§4.C) plus
//! `libwallet/internal/updater.rs`'s reconciliation idiom: rather than
//! diffing two chain views, every transaction already carries the
//! blocks it has appeared in, so disconnecting a block is a matter of
//! walking the transactions that recorded it.

use crate::blockchain::{BlockType, StoredBlock};
use crate::error::Error;
use crate::keybag::KeyBag;
use crate::pool::{PoolKind, TransactionPool};
use crate::reception::{update_for_spends, ReceptionEngine};
use crate::tx::{ChangeReason, Confidence, ConfidenceType, Source, Tx, TxHash};
use std::collections::HashMap;

/// Drives `TransactionPool`/`ReceptionEngine` through a chain
/// reorganization: `split_point` is the common ancestor, `old_blocks`
/// and `new_blocks` are both ordered top -> bottom (most recent first),
/// matching how a chain driver typically walks back from its old and
/// new tips to find the fork point.
pub fn reorganize(
	pool: &mut TransactionPool,
	keybag: &dyn KeyBag,
	reception: &mut ReceptionEngine,
	split_point: StoredBlock,
	old_blocks: &[StoredBlock],
	new_blocks: &[StoredBlock],
	chain_tip_height: u32,
	confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>,
) -> Result<StoredBlock, Error> {
	let appearances = block_appearance_index(pool);

	// Disconnect the orphaned branch, top -> bottom: each block's
	// coinbase is killed recursively (it can never be valid on another
	// chain), every other tx is unhooked from the blocks that confirmed
	// it and reinjected to PENDING.
	let mut reinjected: Vec<TxHash> = Vec::new();
	for block in old_blocks {
		let mut txs_in_block: Vec<TxHash> = appearances.get(&block.hash).cloned().unwrap_or_default();
		// highest relativity offset (latest in the block) first, so
		// descendant-killing sees dependents before their parents
		txs_in_block.sort_by(|a, b| {
			let oa = pool.get(a).map(|t| t.block_appearances.len()).unwrap_or(0);
			let ob = pool.get(b).map(|t| t.block_appearances.len()).unwrap_or(0);
			ob.cmp(&oa)
		});

		for hash in txs_in_block {
			let is_coinbase = pool.get(&hash).map(|t| t.is_coinbase).unwrap_or(false);
			if is_coinbase {
				kill_coinbase_recursive(pool, &hash, confidence_events);
				continue;
			}
			disconnect_block_appearance(pool, &hash, &block.hash);
			if pool.containing_pool(&hash) != Some(PoolKind::Dead) {
				reinject_to_pending(pool, &hash, confidence_events);
				reinjected.push(hash);
			}
		}
	}

	for hash in &reinjected {
		update_for_spends(pool, hash, false)?;
	}

	// Every surviving confirmed transaction sits `old_blocks.len()`
	// fewer blocks deep than before, since the branch beneath it just
	// vanished.
	let removed_depth = old_blocks.len() as u32;
	let confirmed_hashes: Vec<TxHash> = pool
		.pool(PoolKind::Unspent)
		.chain(pool.pool(PoolKind::Spent))
		.map(|t| t.hash)
		.collect();
	for hash in confirmed_hashes {
		if let Some(tx) = pool.get_mut(&hash) {
			if let ConfidenceType::Building { depth, .. } = &mut tx.confidence.confidence_type {
				let new_depth = depth.saturating_sub(removed_depth).max(1);
				if *depth != new_depth {
					*depth = new_depth;
					confidence_events.push((hash, vec![ChangeReason::Depth]));
				}
			}
		}
	}

	// Replay the new branch bottom -> top: transactions that appeared
	// only as a side chain are promoted to BEST_CHAIN in ascending block
	// order, the same entry point a chain driver uses for newly mined
	// blocks.
	for block in new_blocks.iter().rev() {
		let txs_in_block: Vec<TxHash> = appearances.get(&block.hash).cloned().unwrap_or_default();
		for hash in txs_in_block {
			let tx = match pool.remove(&hash) {
				Some((_, tx)) => tx,
				None => continue,
			};
			let offset = tx
				.block_appearances
				.iter()
				.find(|(h, _)| *h == block.hash)
				.map(|(_, o)| *o)
				.unwrap_or(0);
			reception.receive_from_block(
				pool,
				keybag,
				tx,
				*block,
				BlockType::BestChain,
				offset,
				chain_tip_height,
				false,
				confidence_events,
			)?;
		}
	}

	Ok(split_point)
}

/// Maps each block hash a wallet-resident transaction has recorded an
/// appearance in to the set of transactions that recorded it.
fn block_appearance_index(pool: &TransactionPool) -> HashMap<TxHash, Vec<TxHash>> {
	let mut index: HashMap<TxHash, Vec<TxHash>> = HashMap::new();
	for tx in pool.all_txs() {
		for (block_hash, _offset) in &tx.block_appearances {
			index.entry(*block_hash).or_default().push(tx.hash);
		}
	}
	index
}

fn disconnect_block_appearance(pool: &mut TransactionPool, hash: &TxHash, block_hash: &TxHash) {
	if let Some(tx) = pool.get_mut(hash) {
		tx.block_appearances.retain(|(h, _)| h != block_hash);
	}
	// Freeing this transaction's outputs so downstream spenders can be
	// retried once it is back in PENDING. Each freed output's spender, if
	// any, also has its cached `connected_output` pointer cleared so it
	// doesn't dangle once `mark_output_available` drops the back-pointer.
	let freed: Vec<_> = pool
		.get(hash)
		.map(|tx| {
			tx.outputs
				.iter()
				.enumerate()
				.filter_map(|(idx, o)| o.spent_by.map(|spender| (crate::tx::Outpoint { hash: *hash, index: idx as u32 }, spender)))
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();
	for (outpoint, spender) in freed {
		pool.mark_output_available(outpoint);
		if let Some(spending_tx) = pool.get_mut(&spender.hash) {
			if let Some(input) = spending_tx.inputs.get_mut(spender.index as usize) {
				if input.connected_output == Some(outpoint) {
					input.connected_output = None;
				}
			}
		}
	}
}

fn reinject_to_pending(pool: &mut TransactionPool, hash: &TxHash, confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>) {
	if let Some(tx) = pool.get_mut(hash) {
		tx.confidence = Confidence::pending(Source::Network);
		confidence_events.push((*hash, vec![ChangeReason::Type, ChangeReason::Depth]));
	}
	if pool.containing_pool(hash) != Some(PoolKind::Pending) {
		let _ = pool.move_tx(hash, PoolKind::Pending);
	}
}

/// A displaced coinbase can never be valid on another chain; it and
/// every transaction that spends from it are killed outright rather
/// than reinjected to PENDING.
fn kill_coinbase_recursive(pool: &mut TransactionPool, hash: &TxHash, confidence_events: &mut Vec<(TxHash, Vec<ChangeReason>)>) {
	let descendants: Vec<TxHash> = pool
		.all_txs()
		.filter(|t| t.inputs.iter().any(|i| i.outpoint.hash == *hash))
		.map(|t| t.hash)
		.collect();
	if let Some(tx) = pool.get_mut(hash) {
		let reasons = tx.confidence.kill(None);
		if !reasons.is_empty() {
			confidence_events.push((*hash, reasons));
		}
	}
	if pool.containing_pool(hash) != Some(PoolKind::Dead) {
		let _ = pool.move_tx(hash, PoolKind::Dead);
	}
	for descendant in descendants {
		kill_coinbase_recursive(pool, &descendant, confidence_events);
	}
}

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

//! Coin selection (§4.F). Grounded directly in
//! `libwallet/internal/selection.rs::select_coins`: sort eligible
//! outputs by increasing value, then slide a window of the largest
//! affordable size across them looking for the first subset that covers
//! the target; fall back to the largest-value subset available if none
//! does.

use crate::amount::Amount;
use crate::pool::{PoolKind, TransactionPool};
use crate::tx::{Outpoint, Source};
use std::cmp::min;

/// A candidate input: one of the wallet's currently available outputs,
/// annotated with the confirmation depth and provenance of its parent
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utxo {
	/// the output being offered as an input
	pub outpoint: Outpoint,
	/// its value
	pub value: Amount,
	/// confirmation depth of the parent transaction; 0 for pending
	pub depth: u32,
	/// true if the parent transaction is still pending (unconfirmed)
	pub is_pending: bool,
	/// where the parent transaction came from
	pub source: Source,
	/// number of distinct peers that have relayed or echoed the parent
	pub peer_count: usize,
	/// true if the parent transaction is a coinbase, subject to the
	/// composer's maturity check rather than this module's eligibility
	/// rule (§4.E/§4.G)
	pub is_coinbase: bool,
}

/// Collects every output the wallet currently considers available for
/// spending (`TransactionPool::my_unspents`) into selectable candidates.
pub fn collect_utxos(pool: &TransactionPool) -> Vec<Utxo> {
	pool.my_unspents()
		.iter()
		.filter_map(|outpoint| {
			let tx = pool.get(&outpoint.hash)?;
			let output = tx.outputs.get(outpoint.index as usize)?;
			let is_pending = pool.containing_pool(&outpoint.hash) == Some(PoolKind::Pending);
			Some(Utxo {
				outpoint: *outpoint,
				value: output.value,
				depth: tx.confidence.depth(),
				is_pending,
				source: tx.confidence.source,
				peer_count: tx.confidence.broadcast_peers.len(),
				is_coinbase: tx.is_coinbase,
			})
		})
		.collect()
}

/// §4.E eligibility rule: the parent is confirmed with depth ≥ 1, or it
/// is our own transaction and at least one peer has echoed it back.
fn is_eligible(u: &Utxo) -> bool {
	(!u.is_pending && u.depth >= 1) || (u.source == Source::Myself && u.peer_count >= 1)
}

/// Pluggable input-selection policy.
pub trait CoinSelector {
	/// Picks a subset of `utxos` to cover `target`, never returning more
	/// than `max_outputs` inputs. Returns `None` if no subset of at most
	/// `max_outputs` candidates covers `target` -- callers should then
	/// report the largest available total for diagnostics, mirroring
	/// `select_coins`'s "return what we can so we can provide guidance"
	/// fallback.
	fn select(&self, utxos: &[Utxo], target: Amount, max_outputs: usize) -> Option<Vec<Utxo>>;

	/// The largest-value subset available, used when `select` fails, so
	/// callers can report how much is actually spendable.
	fn largest_available(&self, utxos: &[Utxo], max_outputs: usize) -> Vec<Utxo> {
		let mut eligible = self.eligible(utxos);
		eligible.sort_by(cmp_ascending_value);
		eligible.reverse();
		eligible.into_iter().take(max_outputs).collect()
	}

	/// Filters `utxos` down to those this policy is willing to spend at
	/// all (confirmation requirement, age requirement, ...).
	fn eligible(&self, utxos: &[Utxo]) -> Vec<Utxo>;
}

fn cmp_ascending_value(a: &Utxo, b: &Utxo) -> std::cmp::Ordering {
	a.value.cmp(&b.value).then_with(|| a.outpoint.hash.0.cmp(&b.outpoint.hash.0))
}

/// Sliding-window selection over whatever `eligible` yields, identical
/// in shape to `select_coins`'s core loop.
fn select_sliding_window(mut eligible: Vec<Utxo>, target: Amount, max_outputs: usize, select_all: bool) -> Option<Vec<Utxo>> {
	let max_available = min(eligible.len(), max_outputs);
	eligible.sort_by(cmp_ascending_value);

	if max_available > 0 {
		for window in eligible.windows(max_available) {
			if let Some(picked) = select_from(target, select_all, window) {
				return Some(picked);
			}
		}
	}
	None
}

fn select_from(target: Amount, select_all: bool, outputs: &[Utxo]) -> Option<Vec<Utxo>> {
	let total: Amount = outputs.iter().map(|u| u.value).sum();
	if total < target {
		return None;
	}
	if select_all {
		return Some(outputs.to_vec());
	}
	let mut selected = Amount::ZERO;
	Some(
		outputs
			.iter()
			.take_while(|u| {
				let keep = selected < target;
				selected += u.value;
				keep
			})
			.copied()
			.collect(),
	)
}

/// Default policy: only spends outputs from confirmed transactions
/// (depth >= 1).
#[derive(Debug, Clone, Copy)]
pub struct DefaultCoinSelector {
	/// spend every eligible output rather than the minimal covering set
	pub select_all: bool,
}

impl CoinSelector for DefaultCoinSelector {
	fn select(&self, utxos: &[Utxo], target: Amount, max_outputs: usize) -> Option<Vec<Utxo>> {
		select_sliding_window(self.eligible(utxos), target, max_outputs, self.select_all)
	}

	fn eligible(&self, utxos: &[Utxo]) -> Vec<Utxo> {
		utxos.iter().filter(|u| is_eligible(u)).copied().collect()
	}
}

/// Permissive policy: also spends the wallet's own unconfirmed change,
/// useful when the caller has already judged the risk acceptable.
#[derive(Debug, Clone, Copy)]
pub struct AllowUnconfirmedCoinSelector {
	/// spend every eligible output rather than the minimal covering set
	pub select_all: bool,
}

impl CoinSelector for AllowUnconfirmedCoinSelector {
	fn select(&self, utxos: &[Utxo], target: Amount, max_outputs: usize) -> Option<Vec<Utxo>> {
		select_sliding_window(self.eligible(utxos), target, max_outputs, self.select_all)
	}

	fn eligible(&self, utxos: &[Utxo]) -> Vec<Utxo> {
		utxos.to_vec()
	}
}

/// Maintenance policy (§4.H): always prefers the oldest (most deeply
/// confirmed) confirmed outputs first, regardless of target, to batch
/// key-rotation sends toward outputs that have sat under one key the
/// longest.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyAgeCoinSelector;

impl CoinSelector for KeyAgeCoinSelector {
	fn select(&self, utxos: &[Utxo], target: Amount, max_outputs: usize) -> Option<Vec<Utxo>> {
		let mut eligible = self.eligible(utxos);
		eligible.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| cmp_ascending_value(a, b)));
		eligible.truncate(max_outputs);
		let total: Amount = eligible.iter().map(|u| u.value).sum();
		if total >= target {
			Some(eligible)
		} else {
			None
		}
	}

	fn eligible(&self, utxos: &[Utxo]) -> Vec<Utxo> {
		utxos.iter().filter(|u| is_eligible(u)).copied().collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::tx::TxHash;

	fn utxo(byte: u8, value: u64, depth: u32, pending: bool) -> Utxo {
		Utxo {
			outpoint: Outpoint {
				hash: TxHash([byte; 32]),
				index: 0,
			},
			value: Amount::from_sat(value),
			depth,
			is_pending: pending,
			source: Source::Network,
			peer_count: 0,
			is_coinbase: false,
		}
	}

	fn self_built_utxo(byte: u8, value: u64, peer_count: usize) -> Utxo {
		Utxo {
			outpoint: Outpoint {
				hash: TxHash([byte; 32]),
				index: 0,
			},
			value: Amount::from_sat(value),
			depth: 0,
			is_pending: true,
			source: Source::Myself,
			peer_count,
			is_coinbase: false,
		}
	}

	#[test]
	fn default_selector_skips_pending() {
		let utxos = vec![utxo(1, 1000, 0, true), utxo(2, 2000, 5, false)];
		let selector = DefaultCoinSelector { select_all: false };
		let picked = selector.select(&utxos, Amount::from_sat(500), 10).unwrap();
		assert_eq!(picked.len(), 1);
		assert_eq!(picked[0].outpoint.hash, TxHash([2; 32]));
	}

	#[test]
	fn sliding_window_finds_minimal_covering_set() {
		let utxos = vec![
			utxo(1, 1000, 1, false),
			utxo(2, 2000, 1, false),
			utxo(3, 5000, 1, false),
		];
		let selector = DefaultCoinSelector { select_all: false };
		let picked = selector.select(&utxos, Amount::from_sat(2500), 10).unwrap();
		let total: u64 = picked.iter().map(|u| u.value.as_sat()).sum();
		assert!(total >= 2500);
	}

	#[test]
	fn insufficient_funds_returns_none() {
		let utxos = vec![utxo(1, 100, 1, false)];
		let selector = DefaultCoinSelector { select_all: false };
		assert!(selector.select(&utxos, Amount::from_sat(1000), 10).is_none());
	}

	#[test]
	fn default_selector_spends_own_pending_change_once_echoed_by_a_peer() {
		let not_yet_echoed = self_built_utxo(1, 1000, 0);
		let echoed = self_built_utxo(2, 1000, 1);
		let utxos = vec![not_yet_echoed, echoed];
		let selector = DefaultCoinSelector { select_all: false };
		let picked = selector.select(&utxos, Amount::from_sat(500), 10).unwrap();
		assert_eq!(picked.len(), 1);
		assert_eq!(picked[0].outpoint.hash, TxHash([2; 32]));
	}

	#[test]
	fn key_age_selector_prefers_deepest_first() {
		let utxos = vec![utxo(1, 1000, 2, false), utxo(2, 1000, 50, false)];
		let picked = KeyAgeCoinSelector.select(&utxos, Amount::from_sat(1000), 1).unwrap();
		assert_eq!(picked[0].outpoint.hash, TxHash([2; 32]));
	}
}

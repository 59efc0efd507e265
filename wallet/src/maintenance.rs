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

//! Maintenance Engine (§4.H): batches outputs controlled by keys older
//! than a rotation cutoff into rekey transactions.
//!
//! Grounded in the batching loop shape of
//! `libwallet/internal/selection.rs::select_coins`, bounded by
//! `max_simultaneous_inputs` instead of a per-block weight limit, and
//! reusing `TransactionComposer::sign` for the signing step rather than
//! duplicating the signer chain.

use crate::amount::Amount;
use crate::composer::{extract_p2pkh_hash, fee_for_size, TransactionComposer, ESTIMATED_BASE_TX_SIZE, ESTIMATED_OUTPUT_SIZE, ESTIMATED_SIG_SIZE};
use crate::config::WalletConfig;
use crate::crypter::MissingSigMode;
use crate::error::{Error, ErrorKind};
use crate::keybag::{AddressPurpose, KeyBag};
use crate::pool::{PoolKind, TransactionPool};
use crate::tx::{Purpose, Source, Tx, TxHash, TxInput, TxOutput};

/// Outcome of a single `rekey` call.
pub struct RekeyResult {
	/// rekey transactions built, in the order they should be broadcast
	pub batches: Vec<Tx>,
	/// true if no non-rotating key material remained and a fresh HD
	/// chain had to be generated -- callers must prompt the user to back
	/// up the new chain before relying on it
	pub backup_required: bool,
}

/// Drives key-rotation batching (§4.H).
pub struct MaintenanceEngine<'a> {
	config: &'a WalletConfig,
}

impl<'a> MaintenanceEngine<'a> {
	/// Builds a maintenance engine bound to `config`'s
	/// `max_simultaneous_inputs` and `fee_per_kb`.
	pub fn new(config: &'a WalletConfig) -> MaintenanceEngine<'a> {
		MaintenanceEngine { config }
	}

	/// Batches every output controlled by a key older than
	/// `key_rotation_timestamp` into one or more rekey transactions of
	/// at most `max_simultaneous_inputs` inputs each.
	///
	/// The full at-risk set is computed once and chunked: `pool` is
	/// never mutated by composing these batches (the caller admits
	/// each one back through `receive_pending` separately), so
	/// re-querying at-risk outpoints after each batch would just see
	/// the same set again.
	pub fn rekey(
		&self,
		pool: &TransactionPool,
		keybag: &dyn KeyBag,
		composer: &TransactionComposer,
		key_rotation_timestamp: i64,
	) -> Result<RekeyResult, Error> {
		let backup_required = !keybag.has_non_rotating_key_material();
		let at_risk = self.at_risk_outpoints(pool, keybag, key_rotation_timestamp);
		let chunk_size = self.config.max_simultaneous_inputs.max(1);

		let mut batches = Vec::new();
		for batch in at_risk.chunks(chunk_size) {
			let tx = self.build_batch(pool, keybag, composer, batch)?;
			batches.push(tx);
		}

		Ok(RekeyResult {
			batches,
			backup_required,
		})
	}

	fn at_risk_outpoints(&self, pool: &TransactionPool, keybag: &dyn KeyBag, cutoff: i64) -> Vec<crate::tx::Outpoint> {
		let mut outpoints: Vec<crate::tx::Outpoint> = pool
			.my_unspents()
			.iter()
			.filter(|outpoint| pool.containing_pool(&outpoint.hash) != Some(PoolKind::Pending))
			.filter(|outpoint| {
				pool.get(&outpoint.hash)
					.and_then(|tx| tx.outputs.get(outpoint.index as usize))
					.and_then(|output| extract_p2pkh_hash(&output.script_pubkey))
					.and_then(|hash| keybag.find_key_from_pub_hash(&hash))
					.map(|key| key.creation_time < cutoff)
					.unwrap_or(false)
			})
			.copied()
			.collect();
		outpoints.sort_by_key(|o| o.hash.0);
		outpoints
	}

	fn build_batch(
		&self,
		pool: &TransactionPool,
		keybag: &dyn KeyBag,
		composer: &TransactionComposer,
		batch: &[crate::tx::Outpoint],
	) -> Result<Tx, Error> {
		let total: Amount = batch
			.iter()
			.filter_map(|outpoint| {
				pool.get(&outpoint.hash)
					.and_then(|tx| tx.outputs.get(outpoint.index as usize))
					.map(|o| o.value)
			})
			.sum();

		let destination = keybag.fresh_address(AddressPurpose::Receive)?;
		let inputs: Vec<TxInput> = batch.iter().map(|outpoint| TxInput::new(*outpoint)).collect();
		let mut tx = Tx::new(TxHash([0u8; 32]), inputs, vec![TxOutput::new(total, destination)]);

		let size = ESTIMATED_BASE_TX_SIZE + tx.inputs.len() * ESTIMATED_SIG_SIZE + ESTIMATED_OUTPUT_SIZE;
		let fee = fee_for_size(size, self.config.fee_per_kb);
		match total.checked_sub(fee) {
			Some(value) if value >= self.config.dust_threshold => {
				tx.outputs[0].value = value;
			}
			_ => return Err(ErrorKind::CantAdjustDownwards.into()),
		}

		composer.sign(pool, keybag, &mut tx, MissingSigMode::Throw)?;
		tx.confidence.source = Source::Myself;
		tx.confidence.set_purpose(Purpose::KeyRotation);
		Ok(tx)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::crypter::Signer;
	use crate::keybag::{Key, RedeemData};
	use crate::tx::{Confidence, Script};

	struct StubSigner;

	impl Signer for StubSigner {
		fn sign_input(&self, tx: &mut Tx, input_index: usize, _key: &Key) -> Result<bool, Error> {
			tx.inputs[input_index].script_sig = Script(vec![0u8; 71]);
			Ok(true)
		}
	}

	struct AgedKeyBag {
		old_key_hash: [u8; 20],
	}

	impl KeyBag for AgedKeyBag {
		fn find_key_from_pub_hash(&self, hash: &[u8; 20]) -> Option<Key> {
			if *hash == self.old_key_hash {
				Some(Key {
					pubkey: vec![2; 33],
					pubkey_hash: *hash,
					creation_time: 1_000,
					encrypted_private_key: None,
					private_key: None,
				})
			} else {
				None
			}
		}
		fn find_key_from_pub_key(&self, _pubkey: &[u8]) -> Option<Key> {
			None
		}
		fn find_redeem_data_from_script_hash(&self, _hash: &[u8; 20]) -> Option<RedeemData> {
			None
		}
		fn is_watched_script(&self, _script: &Script) -> bool {
			false
		}
		fn fresh_address(&self, _purpose: AddressPurpose) -> Result<Script, Error> {
			Ok(p2pkh_script(&[9; 20]))
		}
		fn current_address(&self, _purpose: AddressPurpose) -> Result<Script, Error> {
			Ok(p2pkh_script(&[9; 20]))
		}
		fn mark_pub_key_as_used(&self, _pubkey: &[u8]) {}
		fn mark_pub_key_hash_as_used(&self, _hash: &[u8; 20]) {}
		fn mark_p2sh_address_as_used(&self, _hash: &[u8; 20]) {}
		fn bloom_filter_element_count(&self) -> usize {
			0
		}
		fn bloom_filter(&self, _size: usize, _fpr: f64, _tweak: u32) -> Vec<u8> {
			Vec::new()
		}
		fn owns_script(&self, script: &Script) -> bool {
			extract_p2pkh_hash(script) == Some(self.old_key_hash)
		}
		fn has_non_rotating_key_material(&self) -> bool {
			true
		}
	}

	fn p2pkh_script(hash: &[u8; 20]) -> Script {
		let mut bytes = vec![0x76, 0xa9, 0x14];
		bytes.extend_from_slice(hash);
		bytes.push(0x88);
		bytes.push(0xac);
		Script(bytes)
	}

	#[test]
	fn rekey_batches_at_risk_outputs_and_terminates() {
		let keybag = AgedKeyBag { old_key_hash: [1; 20] };
		let mut pool = TransactionPool::new();
		let mut tx = Tx::new(
			TxHash([5; 32]),
			Vec::new(),
			vec![TxOutput::new(Amount::from_sat(1_000_000), p2pkh_script(&[1; 20]))],
		);
		tx.outputs[0].is_mine = true;
		tx.confidence = Confidence::pending(Source::Network);
		tx.confidence.confirm(10);
		pool.add(PoolKind::Unspent, tx).unwrap();

		let config = WalletConfig::default();
		let signer = StubSigner;
		let composer = TransactionComposer::new(&config, vec![&signer as &dyn Signer]);
		let engine = MaintenanceEngine::new(&config);

		let result = engine.rekey(&pool, &keybag, &composer, 2_000).unwrap();
		assert_eq!(result.batches.len(), 1);
		assert_eq!(result.batches[0].confidence.purpose, Purpose::KeyRotation);
	}

	#[test]
	fn rekey_ignores_outputs_below_cutoff() {
		let keybag = AgedKeyBag { old_key_hash: [1; 20] };
		let mut pool = TransactionPool::new();
		let mut tx = Tx::new(
			TxHash([6; 32]),
			Vec::new(),
			vec![TxOutput::new(Amount::from_sat(1_000_000), p2pkh_script(&[1; 20]))],
		);
		tx.outputs[0].is_mine = true;
		tx.confidence = Confidence::pending(Source::Network);
		tx.confidence.confirm(10);
		pool.add(PoolKind::Unspent, tx).unwrap();

		let config = WalletConfig::default();
		let composer = TransactionComposer::new(&config, Vec::new());
		let engine = MaintenanceEngine::new(&config);

		let result = engine.rekey(&pool, &keybag, &composer, 500).unwrap();
		assert!(result.batches.is_empty());
	}
}

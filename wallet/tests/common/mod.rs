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

//! Shared scaffolding for the scenario suite in §8: a `KeyBag` backed by
//! a small in-memory set of P2PKH keys, and a `TransactionBroadcaster`
//! that records what it was handed instead of touching the network.

#![allow(dead_code)]

use spv_wallet_core::{
	AddressPurpose, BroadcastHandle, BroadcastResult, Error, Key, KeyBag, RedeemData, Script, Signer, StoredBlock, Tx,
	TransactionBroadcaster, TxHash,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Builds a standard P2PKH locking script for `hash`.
pub fn p2pkh(hash: [u8; 20]) -> Script {
	let mut bytes = vec![0x76, 0xa9, 0x14];
	bytes.extend_from_slice(&hash);
	bytes.push(0x88);
	bytes.push(0xac);
	Script(bytes)
}

pub fn block(byte: u8, height: u32, time: i64) -> StoredBlock {
	StoredBlock {
		hash: TxHash([byte; 32]),
		height,
		time,
	}
}

/// A `KeyBag` over a fixed set of owned pubkey hashes, each with its own
/// creation time so maintenance's at-risk cutoff can be exercised.
/// `fresh_address` mints a new hash deterministically on every call so
/// repeated rekey batches each land on a distinct destination.
pub struct TestKeyBag {
	keys: Mutex<HashMap<[u8; 20], i64>>,
	next_fresh: Mutex<u8>,
	non_rotating: bool,
}

impl TestKeyBag {
	/// A key bag owning one key, `hash`, created at `creation_time`.
	pub fn single(hash: [u8; 20], creation_time: i64) -> TestKeyBag {
		let mut keys = HashMap::new();
		keys.insert(hash, creation_time);
		TestKeyBag {
			keys: Mutex::new(keys),
			next_fresh: Mutex::new(0x20),
			non_rotating: true,
		}
	}

	/// A key bag owning `count` keys, all created at `creation_time`,
	/// with hashes `[0x01; 20]`, `[0x02; 20]`, ...
	pub fn many(count: u8, creation_time: i64) -> TestKeyBag {
		let mut keys = HashMap::new();
		for i in 1..=count {
			keys.insert([i; 20], creation_time);
		}
		TestKeyBag {
			keys: Mutex::new(keys),
			next_fresh: Mutex::new(0x80),
			non_rotating: true,
		}
	}

	pub fn hash_for(index: u8) -> [u8; 20] {
		[index; 20]
	}
}

impl KeyBag for TestKeyBag {
	fn find_key_from_pub_hash(&self, hash: &[u8; 20]) -> Option<Key> {
		self.keys.lock().unwrap().get(hash).map(|&creation_time| Key {
			pubkey: hash.to_vec(),
			pubkey_hash: *hash,
			creation_time,
			encrypted_private_key: None,
			private_key: None,
		})
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

	fn fresh_address(&self, _purpose: AddressPurpose) -> Result<Script, spv_wallet_core::Error> {
		let mut next = self.next_fresh.lock().unwrap();
		let hash = [*next; 20];
		*next += 1;
		self.keys.lock().unwrap().insert(hash, 4_000_000_000);
		Ok(p2pkh(hash))
	}

	fn current_address(&self, purpose: AddressPurpose) -> Result<Script, spv_wallet_core::Error> {
		self.fresh_address(purpose)
	}

	fn mark_pub_key_as_used(&self, _pubkey: &[u8]) {}
	fn mark_pub_key_hash_as_used(&self, _hash: &[u8; 20]) {}
	fn mark_p2sh_address_as_used(&self, _hash: &[u8; 20]) {}

	fn bloom_filter_element_count(&self) -> usize {
		self.keys.lock().unwrap().len()
	}

	fn bloom_filter(&self, _size: usize, _false_positive_rate: f64, _tweak: u32) -> Vec<u8> {
		Vec::new()
	}

	fn owns_script(&self, script: &Script) -> bool {
		extract_hash(script).map(|h| self.keys.lock().unwrap().contains_key(&h)).unwrap_or(false)
	}

	fn has_non_rotating_key_material(&self) -> bool {
		self.non_rotating
	}
}

fn extract_hash(script: &Script) -> Option<[u8; 20]> {
	let bytes = &script.0;
	if bytes.len() != 25 || bytes[0] != 0x76 || bytes[1] != 0xa9 || bytes[2] != 0x14 {
		return None;
	}
	let mut hash = [0u8; 20];
	hash.copy_from_slice(&bytes[3..23]);
	Some(hash)
}

/// Records every transaction handed to it and completes the handle
/// immediately with a fixed peer count, standing in for the P2P relay
/// layer this crate never implements.
pub struct RecordingBroadcaster {
	pub sent: Mutex<Vec<Tx>>,
}

impl RecordingBroadcaster {
	pub fn new() -> RecordingBroadcaster {
		RecordingBroadcaster { sent: Mutex::new(Vec::new()) }
	}
}

impl TransactionBroadcaster for RecordingBroadcaster {
	fn broadcast_transaction(&self, tx: &Tx) -> BroadcastHandle {
		self.sent.lock().unwrap().push(tx.clone());
		let handle = BroadcastHandle::new();
		handle.complete(BroadcastResult { peers_seen: 3 });
		handle
	}
}

/// A `Signer` that handles every input unconditionally, standing in for
/// the wallet's real key-backed signer chain in tests that just need a
/// fully-signed transaction and don't care about script contents.
pub struct NullSigner;

impl Signer for NullSigner {
	fn sign_input(&self, tx: &mut Tx, input_index: usize, _key: &Key) -> Result<bool, Error> {
		tx.inputs[input_index].script_sig = Script(vec![0u8; 71]);
		Ok(true)
	}
}

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

//! `KeyBag`: the opaque key-derivation capability this crate consumes
//! but never implements (§1, §6). Modeled the way `keychain::Keychain`
//! exposes a capability surface to its callers, kept strictly to the
//! operations the wallet state machine needs.

use crate::error::Error;
use crate::tx::Script;

/// A public key identifier sufficient to test ownership of a script;
/// the private material lives entirely behind the `KeyBag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
	/// raw public key bytes
	pub pubkey: Vec<u8>,
	/// RIPEMD160(SHA256(pubkey))
	pub pubkey_hash: [u8; 20],
	/// unix seconds this key was created, used by the key-age coin
	/// selector and by maintenance's at-risk determination (§4.H)
	pub creation_time: i64,
	/// ciphertext of the private key, present only when the wallet
	/// carrying this key is encrypted; decrypted just-in-time during
	/// signing via `KeyCrypter::decrypt` when the caller supplies an AES
	/// key (§4.G `SendRequest::aes_key`)
	#[serde(default)]
	pub encrypted_private_key: Option<Vec<u8>>,
	/// decrypted private key bytes, filled in by the composer's signing
	/// step; never persisted
	#[serde(skip)]
	pub private_key: Option<Vec<u8>>,
}

/// Redeem data for a P2SH-style script: the redeem script plus the keys
/// needed to satisfy it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemData {
	/// the script hashed to produce the P2SH address
	pub redeem_script: Script,
	/// keys able to sign against the redeem script
	pub keys: Vec<Key>,
}

/// Purpose of a freshly issued address, mirrored from BIP44-style
/// external/internal (change) chains without this crate knowing
/// anything about derivation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPurpose {
	/// an address meant to be handed to a counterparty
	Receive,
	/// an address used internally for change outputs
	Change,
}

/// The capability surface the wallet state machine drives to test
/// ownership, mint change/receive addresses, and build bloom filters.
/// Implemented by an external HD key-chain; this crate ships no
/// implementation of its own.
pub trait KeyBag {
	/// Looks up a key by its pubkey hash (P2PKH-style ownership test).
	fn find_key_from_pub_hash(&self, hash: &[u8; 20]) -> Option<Key>;

	/// Looks up a key by its raw public key (P2PK-style ownership test).
	fn find_key_from_pub_key(&self, pubkey: &[u8]) -> Option<Key>;

	/// Looks up redeem data by a P2SH script hash.
	fn find_redeem_data_from_script_hash(&self, hash: &[u8; 20]) -> Option<RedeemData>;

	/// True if `script` is on the watch list (tracked, not necessarily
	/// spendable).
	fn is_watched_script(&self, script: &Script) -> bool;

	/// Issues a fresh address for the given purpose, marking it used.
	fn fresh_address(&self, purpose: AddressPurpose) -> Result<Script, Error>;

	/// The current (not-yet-handed-out) address for the given purpose.
	fn current_address(&self, purpose: AddressPurpose) -> Result<Script, Error>;

	/// Marks a pubkey as used so future bloom filters don't request it.
	fn mark_pub_key_as_used(&self, pubkey: &[u8]);

	/// Marks a pubkey hash as used.
	fn mark_pub_key_hash_as_used(&self, hash: &[u8; 20]);

	/// Marks a P2SH address as used.
	fn mark_p2sh_address_as_used(&self, hash: &[u8; 20]);

	/// Number of elements the bloom filter should be sized for.
	fn bloom_filter_element_count(&self) -> usize;

	/// Builds a bloom filter over every watched key/script.
	fn bloom_filter(&self, size: usize, false_positive_rate: f64, tweak: u32) -> Vec<u8>;

	/// True if `script` is owned (vs. merely watched); used by the
	/// reception engine to set `TxOutput::is_mine` and by coin selection
	/// to decide spendability.
	fn owns_script(&self, script: &Script) -> bool;

	/// True if at least one active HD chain is not itself subject to
	/// rotation, i.e. maintenance can derive a fresh chain from existing
	/// material instead of generating new, as-yet-unbacked-up entropy
	/// (§4.H step 1). Defaults to `true` since most key bags are not
	/// themselves mid-rotation.
	fn has_non_rotating_key_material(&self) -> bool {
		true
	}
}

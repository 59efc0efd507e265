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

//! `KeyCrypter` and `Signer`: the cryptographic capabilities this crate
//! consumes but never implements (§1, §6).

use crate::error::Error;
use crate::keybag::Key;
use crate::tx::Tx;
use spv_wallet_util::types::ZeroingString;

/// Derives and applies an AES key from a passphrase, used to
/// encrypt/decrypt private wallet material at rest. `scrypt`/AES
/// themselves are external collaborators; this crate only defines the
/// surface it drives.
pub trait KeyCrypter {
	/// Derives an AES key from `passphrase`; fails with `BadAesKey` if the
	/// passphrase cannot produce a usable key (e.g. empty).
	fn derive_key(&self, passphrase: &ZeroingString) -> Result<Vec<u8>, Error>;

	/// Encrypts `plaintext` under `key`.
	fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;

	/// Decrypts `ciphertext` under `key`, failing with `BadAesKey` if the
	/// key does not match.
	fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
}

/// How the composer should resolve an input it has no signature for at
/// the end of the signer chain (§4.G step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSigMode {
	/// push an OP_0 placeholder
	UseOpZero,
	/// push a deterministic dummy signature, sized like a real one
	UseDummySig,
	/// fail the composition with `MissingPrivateKey`
	Throw,
}

/// Applies a single input's signature during transaction composition.
/// Composition runs a chain of these in order (§4.G step 8), letting
/// e.g. a hardware-key signer and a software fallback cooperate.
pub trait Signer {
	/// Attempts to produce a signature script for `input_index` of `tx`
	/// given the key that owns the output it spends. Returns `Ok(true)`
	/// if this signer handled the input, `Ok(false)` if it deferred to
	/// the next signer in the chain.
	fn sign_input(&self, tx: &mut Tx, input_index: usize, key: &Key) -> Result<bool, Error>;
}

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

//! Transaction, input, output and outpoint types, per the data model.

pub mod confidence;

pub use self::confidence::{ChangeReason, Confidence, ConfidenceType, Purpose, Source};

use crate::amount::Amount;
use spv_wallet_util::to_hex;
use std::fmt;

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", to_hex(self.0.to_vec()))
	}
}

impl serde::ser::Serialize for TxHash {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::ser::Serializer,
	{
		serializer.serialize_str(&to_hex(self.0.to_vec()))
	}
}

impl<'de> serde::de::Deserialize<'de> for TxHash {
	fn deserialize<D>(deserializer: D) -> Result<TxHash, D::Error>
	where
		D: serde::de::Deserializer<'de>,
	{
		use serde::de::Error;
		let s = String::deserialize(deserializer)?;
		let bytes = spv_wallet_util::from_hex(s).map_err(D::Error::custom)?;
		if bytes.len() != 32 {
			return Err(D::Error::custom("expected a 32-byte hash"));
		}
		let mut out = [0u8; 32];
		out.copy_from_slice(&bytes);
		Ok(TxHash(out))
	}
}

/// An opaque locking script (scriptPubKey). The core never interprets its
/// contents beyond ownership testing via `KeyBag`; parsing and execution
/// belong to the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
	/// Returns true if this looks like an OP_RETURN output: first byte
	/// 0x6a per the standard script encoding.
	pub fn is_op_return(&self) -> bool {
		self.0.first() == Some(&0x6a)
	}
}

/// The pair (tx-hash, output-index) identifying a previous output.
/// Equality and hashing are at the protocol level (hash + index), not
/// object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
	/// hash of the transaction that created the referenced output
	pub hash: TxHash,
	/// index of the output within that transaction
	pub index: u32,
}

impl fmt::Display for Outpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.hash, self.index)
	}
}

/// A transaction input: a reference to a prior outpoint plus the
/// signature script satisfying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
	/// the outpoint this input spends
	pub outpoint: Outpoint,
	/// the unlocking script, empty until signed
	pub script_sig: Script,
	/// cached pointer to the output this input connects to once resolved
	/// against a pool, mirroring §3's "connected_output" pointer; kept
	/// out of serialization since it is reconstructed on load.
	#[serde(skip)]
	pub connected_output: Option<Outpoint>,
}

impl TxInput {
	/// Builds an unsigned input spending `outpoint`.
	pub fn new(outpoint: Outpoint) -> TxInput {
		TxInput {
			outpoint,
			script_sig: Script(Vec::new()),
			connected_output: None,
		}
	}
}

/// A transaction output: a value plus a locking script, and (once spent) a
/// back-reference to the consuming input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
	/// value in satoshis
	pub value: Amount,
	/// the locking script
	pub script_pubkey: Script,
	/// set once some input spends this output
	pub spent_by: Option<Outpoint>,
	/// whether `KeyBag` recognizes this script as owned or watched; set by
	/// the reception engine at admission time, not recomputed on read.
	#[serde(default)]
	pub is_mine: bool,
}

impl TxOutput {
	/// Builds a fresh, unspent output.
	pub fn new(value: Amount, script_pubkey: Script) -> TxOutput {
		TxOutput {
			value,
			script_pubkey,
			spent_by: None,
			is_mine: false,
		}
	}

	/// An output is available for spending iff no input has claimed it.
	pub fn available_for_spending(&self) -> bool {
		self.spent_by.is_none()
	}
}

/// A fiat exchange rate snapshotted onto a composed transaction for
/// display purposes (§4.G step 9). This crate only carries it; nothing
/// here computes or validates a rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
	/// ISO 4217-style currency code the rate is quoted in
	pub currency_code: String,
	/// value of 1 BTC in that currency at compose time
	pub rate: f64,
}

/// A transaction as tracked by the wallet: inputs, outputs, confidence and
/// the bookkeeping the pool and reorg engine need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx {
	/// transaction hash
	pub hash: TxHash,
	/// inputs, in order
	pub inputs: Vec<TxInput>,
	/// outputs, in order
	pub outputs: Vec<TxOutput>,
	/// nLockTime-equivalent; used by the default risk analyzer's finality
	/// check.
	pub lock_time: u32,
	/// per-input relative-lock sequence numbers, same length as `inputs`;
	/// a value below the "final" sentinel makes the input (and therefore
	/// the transaction) non-final.
	pub sequences: Vec<u32>,
	/// mutable confidence state
	pub confidence: Confidence,
	/// last time any field of this record changed
	pub update_time: chrono::DateTime<chrono::Utc>,
	/// whether this transaction has zero inputs (a coinbase)
	pub is_coinbase: bool,
	/// block hashes in which this tx has appeared, with its offset within
	/// the block, used for reorg replay (§4.D step 1).
	pub block_appearances: Vec<(TxHash, u32)>,
	/// fiat exchange rate snapshotted at compose time, if the caller
	/// supplied one (§4.G step 9)
	#[serde(default)]
	pub exchange_rate: Option<ExchangeRate>,
	/// free-form note snapshotted at compose time (§4.G step 9)
	#[serde(default)]
	pub memo: Option<String>,
	/// true once the composer has finished building and stamping this
	/// transaction (§4.G step 9); always false for received transactions
	#[serde(default)]
	pub completed: bool,
}

/// Sequence number below which an input is considered non-final per the
/// standard relative-locktime convention.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

impl Tx {
	/// Builds a fresh, unconfirmed transaction with default confidence.
	pub fn new(hash: TxHash, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Tx {
		let sequences = vec![SEQUENCE_FINAL; inputs.len()];
		Tx {
			hash,
			inputs,
			outputs,
			lock_time: 0,
			sequences,
			confidence: Confidence::unknown(),
			update_time: chrono::Utc::now(),
			is_coinbase: false,
			block_appearances: Vec::new(),
			exchange_rate: None,
			memo: None,
			completed: false,
		}
	}

	/// A transaction is final (per the default risk analyzer) if its
	/// locktime is zero, or every input carries the final sequence
	/// number.
	pub fn is_final(&self, current_height: u32, current_time: i64) -> bool {
		if self.lock_time == 0 {
			return true;
		}
		let locktime_satisfied = if self.lock_time < 500_000_000 {
			(self.lock_time as i64) < current_height as i64
		} else {
			self.lock_time as i64 <= current_time
		};
		if locktime_satisfied {
			return true;
		}
		self.sequences.iter().all(|&s| s == SEQUENCE_FINAL)
	}

	/// Marks `update_time` to now; called on every mutation.
	pub fn touch(&mut self) {
		self.update_time = chrono::Utc::now();
	}
}

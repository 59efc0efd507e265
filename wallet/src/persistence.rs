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

//! Persistence (§4.I): the serialized wallet format, a `FileWalletStore`
//! that round-trips it as JSON, and the autosave coalescer.
//!
//! Grounded in `util/src/file.rs`'s write-temp-file -> fsync -> rename
//! idiom (reused directly via `spv_wallet_util::file::write_atomic`) and
//! `libwallet/types::OutputData`'s `#[derive(Serialize, Deserialize)]`
//! persisted-record pattern. A real LMDB-backed store
//! (`grin_store`/`lmdb_wallet`-shaped) is out of this crate's budget;
//! the storage engine is pluggable and this is the reference backend.

use crate::blockchain::StoredBlock;
use crate::error::{Error, ErrorKind};
use crate::keybag::Key;
use crate::pool::{PoolKind, TransactionPool};
use crate::tx::{Script, Tx};
use spv_wallet_util::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Current on-disk format version. Bumped whenever the schema below
/// changes in a way that is not purely additive.
pub const FORMAT_VERSION: u32 = 1;

/// One transaction plus the pool it belongs to, the unit `transactions`
/// is persisted as (§4.I "repeated Transaction record per pool").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTx {
	/// which of the four pools this transaction was in when saved
	pub pool: PoolKind,
	/// the transaction itself, confidence included
	pub tx: Tx,
}

/// The wallet's full on-disk representation (§6 "Persisted format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWallet {
	/// schema version this record was written under
	pub version: u32,
	/// identifies which network (mainnet/testnet/regtest) this wallet
	/// tracks, so a wallet file is never loaded against the wrong chain
	pub network_id: String,
	/// free-form user label
	pub description: String,
	/// the last best-chain block this wallet had processed
	pub last_seen_block: Option<StoredBlock>,
	/// key material metadata (never private keys -- those live behind
	/// `KeyBag` and are never serialized by this crate)
	pub keys: Vec<Key>,
	/// every transaction across all four pools
	pub transactions: Vec<PersistedTx>,
	/// scripts being watched but not owned
	pub watched_scripts: Vec<Script>,
	/// opaque, non-mandatory extensions this version does not understand;
	/// retained verbatim so a round-trip through an older client does not
	/// lose data
	#[serde(default)]
	pub extensions: HashMap<String, Vec<u8>>,
}

impl PersistedWallet {
	/// Snapshots `pool` into a persisted record.
	pub fn from_pool(
		pool: &TransactionPool,
		network_id: impl Into<String>,
		description: impl Into<String>,
		last_seen_block: Option<StoredBlock>,
		keys: Vec<Key>,
		watched_scripts: Vec<Script>,
	) -> PersistedWallet {
		let mut transactions = Vec::new();
		for kind in PoolKind::all() {
			for tx in pool.pool(kind) {
				transactions.push(PersistedTx {
					pool: kind,
					tx: tx.clone(),
				});
			}
		}
		PersistedWallet {
			version: FORMAT_VERSION,
			network_id: network_id.into(),
			description: description.into(),
			last_seen_block,
			keys,
			transactions,
			watched_scripts,
			extensions: HashMap::new(),
		}
	}

	/// Rebuilds a `TransactionPool` from this record. Fails if the
	/// schema version is newer than this crate understands, or if two
	/// transactions claim the same hash.
	pub fn to_pool(&self) -> Result<TransactionPool, Error> {
		if self.version > FORMAT_VERSION {
			return Err(ErrorKind::Backend(format!(
				"wallet file format version {} is newer than supported version {}",
				self.version, FORMAT_VERSION
			))
			.into());
		}
		let mut pool = TransactionPool::new();
		for entry in &self.transactions {
			pool.add(entry.pool, entry.tx.clone())?;
		}
		Ok(pool)
	}
}

/// Serializes `PersistedWallet` to JSON on disk via the atomic
/// write-temp -> fsync -> rename sequence.
pub struct FileWalletStore {
	path: PathBuf,
}

impl FileWalletStore {
	/// Points a store at `path`; the file need not exist yet.
	pub fn new(path: impl Into<PathBuf>) -> FileWalletStore {
		FileWalletStore { path: path.into() }
	}

	/// Writes `wallet` to disk, replacing any existing file atomically.
	pub fn save(&self, wallet: &PersistedWallet) -> Result<(), Error> {
		let bytes = serde_json::to_vec_pretty(wallet)?;
		write_atomic(&self.path, &bytes)?;
		Ok(())
	}

	/// Loads a previously saved wallet. Fails with `ErrorKind::Io` if
	/// the file does not exist.
	pub fn load(&self) -> Result<PersistedWallet, Error> {
		let bytes = fs::read(&self.path)?;
		let wallet = serde_json::from_slice(&bytes)?;
		Ok(wallet)
	}

	/// True if a wallet file already exists at this store's path.
	pub fn exists(&self) -> bool {
		self.path.exists()
	}
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
	spv_wallet_util::file::write_atomic(path, contents).map_err(Error::from)
}

/// Which of the two save disciplines a mutation should trigger (§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveMode {
	/// flush synchronously -- used for key-material changes, where
	/// losing the write would mean losing funds
	Immediate,
	/// delay the write by the configured coalescing interval -- used for
	/// routine chain-sync churn
	Coalesced,
}

/// Coalesces repeated `Coalesced` saves into one flush per interval,
/// while letting `Immediate` saves and an armed "hard save" bypass the
/// delay. Carries no knowledge of what is being saved; callers decide
/// when to actually call `FileWalletStore::save`.
pub struct Autosaver {
	interval: Duration,
	last_flush: Mutex<Instant>,
	pending: Mutex<bool>,
	hard_save_armed: Mutex<bool>,
}

impl Autosaver {
	/// Builds a coalescer with the given flush interval.
	pub fn new(interval: Duration) -> Autosaver {
		Autosaver {
			interval,
			last_flush: Mutex::new(Instant::now()),
			pending: Mutex::new(false),
			hard_save_armed: Mutex::new(false),
		}
	}

	/// Records a mutation under the given mode. Returns `true` if the
	/// caller should flush right now.
	pub fn note_change(&self, mode: AutosaveMode) -> bool {
		match mode {
			AutosaveMode::Immediate => true,
			AutosaveMode::Coalesced => {
				*self.pending.lock() = true;
				false
			}
		}
	}

	/// Arms a one-shot flush on the next best-block notification,
	/// regardless of the coalescing interval (used before shutdown).
	pub fn arm_hard_save(&self) {
		*self.hard_save_armed.lock() = true;
	}

	/// Called on every new best block; returns `true` if a coalesced
	/// write is now due (either the interval elapsed with a pending
	/// change, or a hard save is armed).
	pub fn should_flush_on_best_block(&self) -> bool {
		let mut armed = self.hard_save_armed.lock();
		if *armed {
			*armed = false;
			return true;
		}
		drop(armed);
		let pending = *self.pending.lock();
		if !pending {
			return false;
		}
		let mut last = self.last_flush.lock();
		if last.elapsed() >= self.interval {
			*last = Instant::now();
			true
		} else {
			false
		}
	}

	/// Clears the pending flag and resets the interval clock after a
	/// successful flush.
	pub fn mark_flushed(&self) {
		*self.pending.lock() = false;
		*self.last_flush.lock() = Instant::now();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::amount::Amount;
	use crate::tx::{Confidence, Source, TxHash, TxOutput};

	fn sample_pool() -> TransactionPool {
		let mut pool = TransactionPool::new();
		let mut unspent = Tx::new(TxHash([1; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(1000), Script(vec![1]))]);
		unspent.outputs[0].is_mine = true;
		unspent.confidence = Confidence::pending(Source::Network);
		unspent.confidence.confirm(10);
		pool.add(PoolKind::Unspent, unspent).unwrap();

		let pending = Tx::new(TxHash([2; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(500), Script(vec![2]))]);
		pool.add(PoolKind::Pending, pending).unwrap();
		pool
	}

	#[test]
	fn round_trips_through_json_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet.json");
		let store = FileWalletStore::new(&path);

		let pool = sample_pool();
		let saved = PersistedWallet::from_pool(&pool, "mainnet", "test wallet", None, Vec::new(), Vec::new());
		store.save(&saved).unwrap();
		assert!(store.exists());

		let loaded = store.load().unwrap();
		assert_eq!(loaded.transactions.len(), 2);
		let restored = loaded.to_pool().unwrap();
		assert_eq!(restored.len(), pool.len());
		assert_eq!(restored.containing_pool(&TxHash([1; 32])), Some(PoolKind::Unspent));
		assert_eq!(restored.containing_pool(&TxHash([2; 32])), Some(PoolKind::Pending));
	}

	#[test]
	fn save_overwrites_existing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet.json");
		let store = FileWalletStore::new(&path);

		let first = PersistedWallet::from_pool(&TransactionPool::new(), "mainnet", "v1", None, Vec::new(), Vec::new());
		store.save(&first).unwrap();

		let pool = sample_pool();
		let second = PersistedWallet::from_pool(&pool, "mainnet", "v2", None, Vec::new(), Vec::new());
		store.save(&second).unwrap();

		let loaded = store.load().unwrap();
		assert_eq!(loaded.description, "v2");
		assert_eq!(loaded.transactions.len(), 2);
	}

	#[test]
	fn immediate_mode_always_flushes() {
		let saver = Autosaver::new(Duration::from_secs(3600));
		assert!(saver.note_change(AutosaveMode::Immediate));
	}

	#[test]
	fn coalesced_mode_waits_for_interval_or_hard_save() {
		let saver = Autosaver::new(Duration::from_millis(50));
		assert!(!saver.note_change(AutosaveMode::Coalesced));
		assert!(!saver.should_flush_on_best_block());

		saver.arm_hard_save();
		assert!(saver.should_flush_on_best_block());
	}
}

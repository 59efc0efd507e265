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

//! The top-level `Wallet`: wires the pool, reception/reorg engines, coin
//! selector, composer, maintenance engine, persistence and listener
//! fabric together behind the two-lock discipline (§5), and exposes the
//! `BlockChain`-driver entry points external callers actually use (§6).
//!
//! Grounded in `libwallet::types::WalletBackend`'s role as the single
//! facade a `Container`/chain driver talks to, generalized from grin's
//! single-mutex backend to the `wallet_lock` / `key_chain_group_lock`
//! pair the design calls for.

use crate::amount::Amount;
use crate::balance::{balance as compute_balance, BalanceType};
use crate::blockchain::{BlockType, StoredBlock};
use crate::composer::{SendRequest, TransactionComposer};
use crate::config::WalletConfig;
use crate::consistency::debug_assert_consistent;
use crate::context::Context;
use crate::crypter::{KeyCrypter, Signer};
use crate::error::Error;
use crate::keybag::{AddressPurpose, KeyBag};
use crate::listener::{Executor, ListenerFabric, ListenerHandle, WalletEvent};
use crate::maintenance::{MaintenanceEngine, RekeyResult};
use crate::persistence::{AutosaveMode, Autosaver, FileWalletStore, PersistedWallet};
use crate::pool::{PoolKind, TransactionPool};
use crate::reception::ReceiveOutcome;
use crate::reception::ReceptionEngine;
use crate::reorg;
use crate::risk::RiskAnalyzer;
use crate::selection::CoinSelector;
use crate::tx::{ChangeReason, Confidence, Script, Tx, TxHash};
use crate::broadcaster::{BroadcastHandle, TransactionBroadcaster};
use spv_wallet_util::{Mutex, RwLock};
use std::path::PathBuf;
use std::time::Duration;

/// Everything guarded by `wallet_lock`: the pool, the reception engine
/// (and its risk-dropped cache), and the chain position this wallet
/// believes it is synced to.
struct WalletState {
	pool: TransactionPool,
	reception: ReceptionEngine,
	last_seen_block: Option<StoredBlock>,
	network_id: String,
	description: String,
}

/// Everything guarded by `key_chain_group_lock`: the key material
/// capability and the watch-only script set (§5 "guards the KeyBag and
/// the watched-script set").
struct KeyChainGroup {
	keybag: Box<dyn KeyBag + Send + Sync>,
	watched_scripts: Vec<Script>,
}

/// The wallet state machine. Two reentrant locks guard disjoint state;
/// callers that need both must take `wallet_lock` first (§5) — every
/// method on this type already does so, so external code never needs to
/// reason about lock order directly.
pub struct Wallet {
	context: Context,
	wallet_lock: RwLock<WalletState>,
	key_chain_group_lock: Mutex<KeyChainGroup>,
	signers: Vec<Box<dyn Signer + Send + Sync>>,
	crypter: Option<Box<dyn KeyCrypter + Send + Sync>>,
	broadcaster: Box<dyn TransactionBroadcaster + Send + Sync>,
	listeners: ListenerFabric,
	autosaver: Autosaver,
	store: Option<FileWalletStore>,
}

impl Wallet {
	/// Builds a fresh, empty wallet. `store_path`, if given, is where
	/// `save`/`load` persist the wallet; without one, `save` fails.
	pub fn new(
		config: WalletConfig,
		keybag: Box<dyn KeyBag + Send + Sync>,
		risk_analyzer: Box<dyn RiskAnalyzer + Send + Sync>,
		signers: Vec<Box<dyn Signer + Send + Sync>>,
		broadcaster: Box<dyn TransactionBroadcaster + Send + Sync>,
		network_id: impl Into<String>,
		store_path: Option<PathBuf>,
	) -> Wallet {
		Wallet::with_crypter(config, keybag, risk_analyzer, signers, broadcaster, network_id, store_path, None)
	}

	/// Builds a wallet whose `KeyBag` may hand back AES-encrypted private
	/// key material; `crypter` decrypts it during signing when a `send`
	/// request supplies an `aes_key` (§4.G).
	#[allow(clippy::too_many_arguments)]
	pub fn with_crypter(
		config: WalletConfig,
		keybag: Box<dyn KeyBag + Send + Sync>,
		risk_analyzer: Box<dyn RiskAnalyzer + Send + Sync>,
		signers: Vec<Box<dyn Signer + Send + Sync>>,
		broadcaster: Box<dyn TransactionBroadcaster + Send + Sync>,
		network_id: impl Into<String>,
		store_path: Option<PathBuf>,
		crypter: Option<Box<dyn KeyCrypter + Send + Sync>>,
	) -> Wallet {
		let risk_cache_size = config.risk_dropped_cache_size;
		let autosave_interval = Duration::from_millis(config.autosave_coalesce_interval_ms);
		Wallet {
			context: Context::new(config),
			wallet_lock: RwLock::new(WalletState {
				pool: TransactionPool::new(),
				reception: ReceptionEngine::new(risk_analyzer, risk_cache_size),
				last_seen_block: None,
				network_id: network_id.into(),
				description: String::new(),
			}),
			key_chain_group_lock: Mutex::new(KeyChainGroup {
				keybag,
				watched_scripts: Vec::new(),
			}),
			signers,
			crypter,
			broadcaster,
			listeners: ListenerFabric::new(),
			autosaver: Autosaver::new(autosave_interval),
			store: store_path.map(FileWalletStore::new),
		}
	}

	/// This wallet's tunable configuration.
	pub fn config(&self) -> &WalletConfig {
		self.context.config()
	}

	/// Registers a callback for wallet-wide events (§4.J).
	pub fn add_listener<F>(&self, executor: Executor, callback: F) -> ListenerHandle
	where
		F: Fn(&WalletEvent) + Send + Sync + 'static,
	{
		self.listeners.register(executor, callback)
	}

	/// Removes a previously registered listener.
	pub fn remove_listener(&self, handle: ListenerHandle) {
		self.listeners.unregister(handle)
	}

	/// BlockChain-driver entry point: admits a mempool-announced
	/// transaction.
	pub fn receive_pending(&self, tx: Tx, allow_risky: bool) -> Result<ReceiveOutcome, Error> {
		let (outcome, hash, confidence_events) = {
			let mut state = self.wallet_lock.write();
			let keychain = self.key_chain_group_lock.lock();
			let height = state.last_seen_block.map(|b| b.height).unwrap_or(0);
			let time = state.last_seen_block.map(|b| b.time).unwrap_or(0);
			let hash = tx.hash;
			let mut confidence_events = Vec::new();
			let WalletState { reception, pool, .. } = &mut *state;
			let outcome = reception.receive_pending(
				pool,
				keychain.keybag.as_ref(),
				tx,
				allow_risky,
				height,
				time,
				&mut confidence_events,
			)?;
			debug_assert_consistent(&state.pool);
			(outcome, hash, confidence_events)
		};

		if let ReceiveOutcome::Admitted = outcome {
			self.autosave(AutosaveMode::Coalesced);
			self.listeners.dispatch(WalletEvent::CoinsReceived { tx: hash });
			self.dispatch_confidence_events(confidence_events);
			self.listeners.dispatch(WalletEvent::Changed);
		}
		Ok(outcome)
	}

	/// BlockChain-driver entry point: admits a transaction observed
	/// inside a delivered block.
	pub fn receive_from_block(
		&self,
		tx: Tx,
		block: StoredBlock,
		block_type: BlockType,
		relativity_offset: u32,
		chain_tip_height: u32,
	) -> Result<(), Error> {
		let hash = tx.hash;
		let confidence_events = {
			let mut state = self.wallet_lock.write();
			let keychain = self.key_chain_group_lock.lock();
			let mut confidence_events = Vec::new();
			let WalletState { reception, pool, .. } = &mut *state;
			reception.receive_from_block(
				pool,
				keychain.keybag.as_ref(),
				tx,
				block,
				block_type,
				relativity_offset,
				chain_tip_height,
				false,
				&mut confidence_events,
			)?;
			debug_assert_consistent(&state.pool);
			confidence_events
		};
		self.autosave(AutosaveMode::Coalesced);
		self.listeners.dispatch(WalletEvent::CoinsReceived { tx: hash });
		self.dispatch_confidence_events(confidence_events);
		self.listeners.dispatch(WalletEvent::Changed);
		Ok(())
	}

	/// BlockChain-driver entry point: tells the wallet that an
	/// already-known transaction now appears in `block`. Returns `true`
	/// if the transaction is relevant to this wallet, so the driver knows
	/// whether to bother delivering the full transaction later.
	pub fn notify_transaction_is_in_block(
		&self,
		tx_hash: TxHash,
		block: StoredBlock,
		block_type: BlockType,
		relativity_offset: u32,
		chain_tip_height: u32,
	) -> Result<bool, Error> {
		let existing = {
			let state = self.wallet_lock.read();
			state.pool.get(&tx_hash).cloned()
		};
		let tx = match existing {
			Some(tx) => tx,
			None => return Ok(false),
		};
		self.receive_from_block(tx, block, block_type, relativity_offset, chain_tip_height)?;
		Ok(true)
	}

	/// BlockChain-driver entry point: advances the wallet to a new best
	/// block, deepening every confirmed transaction's confidence,
	/// clearing broadcast-peer sets past the event horizon, and flushing
	/// a coalesced autosave if one is due.
	pub fn notify_new_best_block(&self, block: StoredBlock) -> Result<(), Error> {
		let confidence_events = {
			let mut state = self.wallet_lock.write();
			let horizon = self.context.config().event_horizon;
			let hashes: Vec<TxHash> = state
				.pool
				.pool(PoolKind::Unspent)
				.chain(state.pool.pool(PoolKind::Spent))
				.map(|t| t.hash)
				.collect();
			let mut confidence_events = Vec::new();
			for hash in hashes {
				if let Some(tx) = state.pool.get_mut(&hash) {
					let mut reasons = tx.confidence.deepen();
					reasons.extend(tx.confidence.clear_peers_if_past_horizon(horizon));
					if !reasons.is_empty() {
						confidence_events.push((hash, reasons));
					}
				}
			}
			state.last_seen_block = Some(block);
			debug_assert_consistent(&state.pool);
			confidence_events
		};

		if self.autosaver.should_flush_on_best_block() {
			self.save()?;
			self.autosaver.mark_flushed();
		}
		self.dispatch_confidence_events(confidence_events);
		self.listeners.dispatch(WalletEvent::Changed);
		Ok(())
	}

	/// BlockChain-driver entry point: replays a chain reorganization.
	pub fn reorganize(&self, split_point: StoredBlock, old_blocks: &[StoredBlock], new_blocks: &[StoredBlock], chain_tip_height: u32) -> Result<(), Error> {
		self.listeners.begin_reorg_suppression();
		let (result, confidence_events) = {
			let mut state = self.wallet_lock.write();
			let keychain = self.key_chain_group_lock.lock();
			let mut pool = std::mem::take(&mut state.pool);
			let mut confidence_events = Vec::new();
			let outcome = reorg::reorganize(
				&mut pool,
				keychain.keybag.as_ref(),
				&mut state.reception,
				split_point,
				old_blocks,
				new_blocks,
				chain_tip_height,
				&mut confidence_events,
			);
			state.pool = pool;
			debug_assert_consistent(&state.pool);
			(outcome, confidence_events)
		};
		self.listeners.end_reorg_suppression();
		result?;
		self.autosave(AutosaveMode::Immediate);
		self.listeners.dispatch(WalletEvent::Reorganized);
		self.dispatch_confidence_events(confidence_events);
		Ok(())
	}

	/// Composes, signs and broadcasts a payment, admitting the result
	/// into the pool as our own pending transaction.
	pub fn send(&self, request: SendRequest) -> Result<(Tx, BroadcastHandle), Error> {
		let (tx, confidence_events) = {
			let mut state = self.wallet_lock.write();
			let keychain = self.key_chain_group_lock.lock();
			let signer_refs: Vec<&dyn Signer> = self.signers.iter().map(|s| s.as_ref() as &dyn Signer).collect();
			let composer = match self.crypter.as_deref() {
				Some(crypter) => TransactionComposer::with_crypter(self.context.config(), signer_refs, crypter),
				None => TransactionComposer::new(self.context.config(), signer_refs),
			};
			let tx = composer.compose(&state.pool, keychain.keybag.as_ref(), request)?;
			let height = state.last_seen_block.map(|b| b.height).unwrap_or(0);
			let time = state.last_seen_block.map(|b| b.time).unwrap_or(0);
			let mut confidence_events = Vec::new();
			let WalletState { reception, pool, .. } = &mut *state;
			reception.receive_pending(
				pool,
				keychain.keybag.as_ref(),
				tx.clone(),
				true,
				height,
				time,
				&mut confidence_events,
			)?;
			debug_assert_consistent(&state.pool);
			(tx, confidence_events)
		};

		self.autosave(AutosaveMode::Immediate);
		self.listeners.dispatch(WalletEvent::CoinsSent { tx: tx.hash });
		self.dispatch_confidence_events(confidence_events);
		self.listeners.dispatch(WalletEvent::Changed);
		let handle = self.broadcaster.broadcast_transaction(&tx);
		Ok((tx, handle))
	}

	/// Runs the maintenance engine's rekey batching, admitting and
	/// broadcasting every resulting batch the same way `send` does.
	pub fn rekey(&self, key_rotation_timestamp: i64, selector: Option<&dyn CoinSelector>) -> Result<RekeyResult, Error> {
		let _ = selector; // batching policy is internal to MaintenanceEngine (§4.H); kept for API symmetry with send().
		let (result, confidence_events) = {
			let mut state = self.wallet_lock.write();
			let keychain = self.key_chain_group_lock.lock();
			let signer_refs: Vec<&dyn Signer> = self.signers.iter().map(|s| s.as_ref() as &dyn Signer).collect();
			let composer = TransactionComposer::new(self.context.config(), signer_refs);
			let engine = MaintenanceEngine::new(self.context.config());
			let result = engine.rekey(&state.pool, keychain.keybag.as_ref(), &composer, key_rotation_timestamp)?;
			let height = state.last_seen_block.map(|b| b.height).unwrap_or(0);
			let time = state.last_seen_block.map(|b| b.time).unwrap_or(0);
			let mut confidence_events = Vec::new();
			let WalletState { reception, pool, .. } = &mut *state;
			for batch in &result.batches {
				reception.receive_pending(
					pool,
					keychain.keybag.as_ref(),
					batch.clone(),
					true,
					height,
					time,
					&mut confidence_events,
				)?;
			}
			debug_assert_consistent(&state.pool);
			(result, confidence_events)
		};

		if !result.batches.is_empty() {
			self.autosave(AutosaveMode::Immediate);
			self.dispatch_confidence_events(confidence_events);
			self.listeners.dispatch(WalletEvent::Changed);
			for batch in &result.batches {
				let _ = self.broadcaster.broadcast_transaction(batch);
			}
		}
		Ok(result)
	}

	/// Computes a balance view directly from pool state (§6).
	pub fn balance(&self, balance_type: BalanceType) -> Amount {
		let state = self.wallet_lock.read();
		compute_balance(&state.pool, balance_type)
	}

	/// Which of the four pools `hash` currently sits in, if the wallet
	/// knows about it at all. A query accessor in the spirit of
	/// bitcoinj's own `Wallet.getTransactionPool`, useful to callers
	/// inspecting wallet state without reaching into internals.
	pub fn pool_kind_of(&self, hash: &TxHash) -> Option<PoolKind> {
		self.wallet_lock.read().pool.containing_pool(hash)
	}

	/// A snapshot of `hash`'s current confidence, if the wallet knows it.
	pub fn confidence_of(&self, hash: &TxHash) -> Option<Confidence> {
		self.wallet_lock.read().pool.get(hash).map(|tx| tx.confidence.clone())
	}

	/// Issues a fresh address, marking it used under the key-chain lock.
	pub fn fresh_address(&self, purpose: AddressPurpose) -> Result<Script, Error> {
		let keychain = self.key_chain_group_lock.lock();
		keychain.keybag.fresh_address(purpose)
	}

	/// The current watch-only script set, a read accessor in the same
	/// spirit as `pool_kind_of`/`confidence_of`.
	pub fn watched_scripts(&self) -> Vec<Script> {
		self.key_chain_group_lock.lock().watched_scripts.clone()
	}

	/// Adds a script to the watch-only set, firing `ScriptsChanged`.
	pub fn watch_script(&self, script: Script) -> Result<(), Error> {
		{
			let mut keychain = self.key_chain_group_lock.lock();
			if keychain.watched_scripts.contains(&script) {
				return Ok(());
			}
			keychain.watched_scripts.push(script);
		}
		self.autosave(AutosaveMode::Immediate);
		self.listeners.dispatch(WalletEvent::ScriptsChanged);
		self.listeners.dispatch(WalletEvent::Changed);
		Ok(())
	}

	/// Snapshots the wallet and writes it to the configured store.
	/// Fails with `ErrorKind::Backend` via `persistence` if no store path
	/// was configured.
	pub fn save(&self) -> Result<(), Error> {
		let store = self.store.as_ref().ok_or_else(|| {
			Error::from(crate::error::ErrorKind::Backend("no persistence path configured".into()))
		})?;
		let state = self.wallet_lock.read();
		let keychain = self.key_chain_group_lock.lock();
		let persisted = PersistedWallet::from_pool(&state.pool, state.network_id.clone(), state.description.clone(), state.last_seen_block, Vec::new(), keychain.watched_scripts.clone());
		store.save(&persisted)
	}

	/// Loads pool and watch-list state from the configured store into
	/// this wallet, replacing whatever it currently holds.
	pub fn load(&self) -> Result<(), Error> {
		let store = self.store.as_ref().ok_or_else(|| {
			Error::from(crate::error::ErrorKind::Backend("no persistence path configured".into()))
		})?;
		let persisted = store.load()?;
		let pool = persisted.to_pool()?;
		let mut state = self.wallet_lock.write();
		let mut keychain = self.key_chain_group_lock.lock();
		state.pool = pool;
		state.last_seen_block = persisted.last_seen_block;
		state.network_id = persisted.network_id;
		state.description = persisted.description;
		keychain.watched_scripts = persisted.watched_scripts;
		debug_assert_consistent(&state.pool);
		Ok(())
	}

	/// Dispatches one `ConfidenceChanged` event per collected `(tx,
	/// reasons)` pair, once the locks that produced them are released.
	fn dispatch_confidence_events(&self, events: Vec<(TxHash, Vec<ChangeReason>)>) {
		for (tx, reasons) in events {
			self.listeners.dispatch(WalletEvent::ConfidenceChanged { tx, reasons });
		}
	}

	fn autosave(&self, mode: AutosaveMode) {
		if self.store.is_none() {
			return;
		}
		if self.autosaver.note_change(mode) {
			let _ = self.save();
			self.autosaver.mark_flushed();
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::amount::Amount;
	use crate::crypter::MissingSigMode;
	use crate::keybag::{Key, RedeemData};
	use crate::risk::DefaultRiskAnalyzer;
	use crate::tx::{Purpose, TxOutput};

	struct NullKeyBag;
	impl KeyBag for NullKeyBag {
		fn find_key_from_pub_hash(&self, _hash: &[u8; 20]) -> Option<Key> {
			None
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
			Ok(Script(vec![9]))
		}
		fn current_address(&self, _purpose: AddressPurpose) -> Result<Script, Error> {
			Ok(Script(vec![9]))
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
			script.0 == [1]
		}
	}

	struct NullBroadcaster;
	impl TransactionBroadcaster for NullBroadcaster {
		fn broadcast_transaction(&self, _tx: &Tx) -> BroadcastHandle {
			let handle = BroadcastHandle::new();
			handle.complete(crate::broadcaster::BroadcastResult { peers_seen: 0 });
			handle
		}
	}

	fn test_wallet() -> Wallet {
		Wallet::new(
			WalletConfig::default(),
			Box::new(NullKeyBag),
			Box::new(DefaultRiskAnalyzer),
			Vec::new(),
			Box::new(NullBroadcaster),
			"regtest",
			None,
		)
	}

	#[test]
	fn receive_pending_updates_balance_and_fires_listener() {
		let wallet = test_wallet();
		let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let seen2 = seen.clone();
		wallet.add_listener(Executor::SameThread, move |event| {
			if let WalletEvent::CoinsReceived { .. } = event {
				seen2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			}
		});

		let tx = Tx::new(TxHash([1; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(50_000), Script(vec![1]))]);
		let outcome = wallet.receive_pending(tx, false).unwrap();
		assert_eq!(outcome, ReceiveOutcome::Admitted);
		assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
		assert_eq!(wallet.balance(BalanceType::Estimated), Amount::from_sat(50_000));
	}

	#[test]
	fn notify_transaction_is_in_block_confirms_known_tx() {
		let wallet = test_wallet();
		let tx = Tx::new(TxHash([2; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(10_000), Script(vec![1]))]);
		wallet.receive_pending(tx, false).unwrap();

		let block = StoredBlock { hash: TxHash([100; 32]), height: 50, time: 0 };
		let relevant = wallet.notify_transaction_is_in_block(TxHash([2; 32]), block, BlockType::BestChain, 0, 50).unwrap();
		assert!(relevant);
		assert_eq!(wallet.balance(BalanceType::Available), Amount::from_sat(10_000));
	}

	#[test]
	fn send_without_change_address_on_empty_wallet_fails_cleanly() {
		let wallet = test_wallet();
		let request = SendRequest {
			tx: Tx::new(TxHash([0; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(1000), Script(vec![1]))]),
			fee_per_kb: Amount::from_sat(1000),
			ensure_min_fee: true,
			empty_wallet: false,
			recipients_pay_fees: false,
			change_address: None,
			coin_selector: None,
			sign_inputs: false,
			shuffle_outputs: false,
			purpose: Purpose::UserPayment,
			missing_sigs_mode: MissingSigMode::Throw,
			aes_key: None,
			exchange_rate: None,
			memo: None,
		};
		assert!(wallet.send(request).is_err());
	}
}

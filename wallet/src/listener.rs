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

//! Listener Fabric (§4.J): typed event dispatch with a per-registration
//! executor choice. Modeled as a handle-keyed registry, the way the
//! wider retrieval pack's Substrate transaction-pool listener
//! (`graph::listener`) keys subscriptions by an opaque id — but kept to
//! the teacher's synchronous idiom: a `UserThread` registration gets its
//! own dedicated `std::thread` draining an `mpsc` channel, not a
//! `tokio` task, since this crate carries no async runtime.

use crate::tx::{ChangeReason, TxHash};
use spv_wallet_util::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

/// Opaque registration handle; removal is by handle only (§9 design
/// notes: listeners held by non-owning registrations, not the reverse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// One of the six listener kinds (§4.J).
#[derive(Debug, Clone)]
pub enum WalletEvent {
	/// the wallet's aggregate state changed; fired at most once per
	/// externally visible operation even during a reorg's internal churn
	Changed,
	/// new coins were received
	CoinsReceived {
		/// the transaction that paid us
		tx: TxHash,
	},
	/// coins were sent
	CoinsSent {
		/// the transaction that spent our coins
		tx: TxHash,
	},
	/// a chain reorganization was processed
	Reorganized,
	/// the watched-script set changed
	ScriptsChanged,
	/// a transaction's confidence changed
	ConfidenceChanged {
		/// the transaction whose confidence changed
		tx: TxHash,
		/// which fields changed
		reasons: Vec<ChangeReason>,
	},
}

/// Where a listener's callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
	/// invoked synchronously on the thread that fired the event — only
	/// suitable for cheap, non-reentrant updates (e.g. internal
	/// confidence chains)
	SameThread,
	/// queued to a dedicated worker thread, for callbacks that may run
	/// arbitrary application code
	UserThread,
}

enum Dispatch {
	Inline(Box<dyn Fn(&WalletEvent) + Send + Sync>),
	Queued(mpsc::Sender<WalletEvent>),
}

struct Registration {
	dispatch: Dispatch,
}

/// The registry itself: tracks registrations, dispatches events to the
/// chosen executor, and implements the reorg `onWalletChanged`
/// suppression counter (§4.J).
#[derive(Default)]
pub struct ListenerFabric {
	next_handle: AtomicU64,
	registrations: Mutex<HashMap<u64, Registration>>,
	workers: Mutex<HashMap<u64, thread::JoinHandle<()>>>,
	suppress_changed: Mutex<u32>,
	changed_pending: Mutex<bool>,
}

impl ListenerFabric {
	/// Builds an empty registry. Worker threads are spawned lazily, one
	/// per `UserThread` registration.
	pub fn new() -> ListenerFabric {
		ListenerFabric::default()
	}

	/// Registers a callback with the given executor, returning a handle
	/// usable to remove it later.
	pub fn register<F>(&self, executor: Executor, callback: F) -> ListenerHandle
	where
		F: Fn(&WalletEvent) + Send + Sync + 'static,
	{
		let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
		let dispatch = match executor {
			Executor::SameThread => Dispatch::Inline(Box::new(callback)),
			Executor::UserThread => {
				let (tx, rx) = mpsc::channel::<WalletEvent>();
				let worker = thread::Builder::new()
					.name(format!("wallet-listener-{}", id))
					.spawn(move || {
						while let Ok(event) = rx.recv() {
							callback(&event);
						}
					})
					.expect("failed to spawn wallet listener thread");
				self.workers.lock().insert(id, worker);
				Dispatch::Queued(tx)
			}
		};
		self.registrations.lock().insert(id, Registration { dispatch });
		ListenerHandle(id)
	}

	/// Removes a registration by handle. A no-op if already removed.
	/// Does not join a `UserThread` worker; its channel is dropped,
	/// which ends the thread once it finishes any in-flight callback.
	pub fn unregister(&self, handle: ListenerHandle) {
		self.registrations.lock().remove(&handle.0);
		self.workers.lock().remove(&handle.0);
	}

	/// Fires `event` to every registration, respecting each one's chosen
	/// executor. `Changed` events are coalesced while reorg suppression
	/// is active.
	pub fn dispatch(&self, event: WalletEvent) {
		if let WalletEvent::Changed = event {
			if *self.suppress_changed.lock() > 0 {
				*self.changed_pending.lock() = true;
				return;
			}
		}
		let guard = self.registrations.lock();
		for reg in guard.values() {
			match &reg.dispatch {
				Dispatch::Inline(callback) => callback(&event),
				Dispatch::Queued(tx) => {
					let _ = tx.send(event.clone());
				}
			}
		}
	}

	/// Registers an interest in a transaction's confidence changes, a
	/// thin wrapper over `register`.
	pub fn register_confidence_listener<F>(&self, executor: Executor, callback: F) -> ListenerHandle
	where
		F: Fn(&TxHash, &[ChangeReason]) + Send + Sync + 'static,
	{
		self.register(executor, move |event| {
			if let WalletEvent::ConfidenceChanged { tx, reasons } = event {
				callback(tx, reasons);
			}
		})
	}

	/// Increments the reorg suppression counter; while held, `Changed`
	/// events are coalesced rather than fired (§4.J).
	pub fn begin_reorg_suppression(&self) {
		*self.suppress_changed.lock() += 1;
	}

	/// Decrements the suppression counter, firing exactly one `Changed`
	/// event if any were coalesced while it was held.
	pub fn end_reorg_suppression(&self) {
		let mut count = self.suppress_changed.lock();
		*count = count.saturating_sub(1);
		let should_fire = *count == 0 && {
			let mut pending = self.changed_pending.lock();
			let fire = *pending;
			*pending = false;
			fire
		};
		drop(count);
		if should_fire {
			self.dispatch(WalletEvent::Changed);
		}
	}
}

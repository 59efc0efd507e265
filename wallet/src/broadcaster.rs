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

//! `TransactionBroadcaster`: the P2P hand-off this crate consumes but
//! never implements (§1, §6). `BroadcastHandle` is a single-shot
//! completable value per the design notes' "coroutine/future semantics"
//! guidance, built on `parking_lot` rather than reaching back for the
//! `futures` crate the dropped HTTP/API layer used to depend on.

use crate::tx::Tx;
use parking_lot::Condvar;
use spv_wallet_util::Mutex;
use std::sync::Arc;

struct Inner<T> {
	value: Mutex<Option<T>>,
	condvar: Condvar,
	callbacks: Mutex<Vec<Box<dyn FnOnce(&T) + Send>>>,
}

/// Outcome of broadcasting a transaction: how many peers echoed it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastResult {
	/// number of distinct peers that relayed the tx back to us
	pub peers_seen: u32,
}

/// A single-shot value that completes exactly once. The wallet's
/// internal state transitions never block on this resolving (§5
/// "Cancellation & timeouts") — composition commits the tx as PENDING
/// under the wallet lock and returns before broadcast even begins.
pub struct Completable<T: Clone + Send + 'static> {
	inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Completable<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Completable").finish_non_exhaustive()
	}
}

impl<T: Clone + Send + 'static> Clone for Completable<T> {
	fn clone(&self) -> Self {
		Completable {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Clone + Send + 'static> Completable<T> {
	/// Builds a not-yet-completed value.
	pub fn new() -> Completable<T> {
		Completable {
			inner: Arc::new(Inner {
				value: Mutex::new(None),
				condvar: Condvar::new(),
				callbacks: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Completes the value, running any registered callbacks and waking
	/// any blocked `wait()` callers. Completing twice is a no-op.
	pub fn complete(&self, value: T) {
		let mut guard = self.inner.value.lock();
		if guard.is_some() {
			return;
		}
		*guard = Some(value.clone());
		drop(guard);
		self.inner.condvar.notify_all();
		let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
		for cb in callbacks {
			cb(&value);
		}
	}

	/// True once `complete()` has been called.
	pub fn is_complete(&self) -> bool {
		self.inner.value.lock().is_some()
	}

	/// Registers a callback run on completion (immediately, if already
	/// completed). Mirrors the `then()` combinator the design notes ask
	/// for instead of a raw future.
	pub fn then<F>(&self, f: F)
	where
		F: FnOnce(&T) + Send + 'static,
	{
		let guard = self.inner.value.lock();
		if let Some(v) = guard.as_ref() {
			let v = v.clone();
			drop(guard);
			f(&v);
		} else {
			drop(guard);
			self.inner.callbacks.lock().push(Box::new(f));
		}
	}

	/// Blocks the calling thread until the value completes.
	pub fn wait(&self) -> T {
		let mut guard = self.inner.value.lock();
		while guard.is_none() {
			self.inner.condvar.wait(&mut guard);
		}
		guard.clone().unwrap()
	}
}

impl<T: Clone + Send + 'static> Default for Completable<T> {
	fn default() -> Self {
		Completable::new()
	}
}

/// A handle to an in-flight broadcast. Consumers may `.then()` a
/// callback or `.wait()` synchronously; the wallet itself never does
/// either internally.
pub type BroadcastHandle = Completable<BroadcastResult>;

/// Hands a composed transaction off to the P2P layer.
pub trait TransactionBroadcaster {
	/// Broadcasts `tx`, returning a handle that completes once at least
	/// the configured minimum number of peers have echoed it.
	fn broadcast_transaction(&self, tx: &Tx) -> BroadcastHandle;
}

#[cfg(test)]
mod test {
	use super::*;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn then_runs_immediately_if_already_complete() {
		let c = Completable::<u32>::new();
		c.complete(7);
		let seen = Arc::new(Mutex::new(0u32));
		let seen2 = seen.clone();
		c.then(move |v| *seen2.lock() = *v);
		assert_eq!(*seen.lock(), 7);
	}

	#[test]
	fn wait_blocks_until_complete() {
		let c = Completable::<u32>::new();
		let c2 = c.clone();
		let handle = thread::spawn(move || {
			thread::sleep(Duration::from_millis(20));
			c2.complete(42);
		});
		assert_eq!(c.wait(), 42);
		handle.join().unwrap();
	}
}

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

//! Wallet-wide configuration constants. The source this was distilled from
//! hardcoded these; here they are explicit fields so callers can tune them
//! per network (mainnet/testnet/regtest) without a recompile.

use crate::amount::Amount;

/// Tunable constants governing pool admission, coin selection, fee
/// computation and maintenance batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
	/// Outputs below this value are considered dust and excluded from
	/// selection / rejected as composition outputs, per §4.E and §4.G.
	pub dust_threshold: Amount,

	/// Maximum number of distinct transactions remembered in the
	/// risk-dropped LRU cache (§4.C, §8 property 8). The source hardcoded
	/// this at 1000.
	pub risk_dropped_cache_size: usize,

	/// Depth beyond which a transaction's broadcast-peer set is cleared
	/// (§4.B). Commonly the coinbase maturity depth.
	pub event_horizon: u32,

	/// Default fee rate used by the composer and the maintenance engine
	/// when the caller does not override it.
	pub fee_per_kb: Amount,

	/// Upper bound on the number of inputs a single maintenance batch may
	/// spend (§4.H).
	pub max_simultaneous_inputs: usize,

	/// How long the coalesced autosave mode waits before flushing, in
	/// milliseconds (§4.I).
	pub autosave_coalesce_interval_ms: u64,

	/// Maximum serialized size, in bytes, of a standard transaction
	/// (§4.G step 7).
	pub max_standard_tx_size: usize,

	/// Confirmations a coinbase output must accumulate before the
	/// composer will offer it as a spending candidate (§4.E/§4.G:
	/// "immature coinbases excluded by the composer, not the selector").
	pub coinbase_maturity: u32,
}

impl Default for WalletConfig {
	fn default() -> WalletConfig {
		WalletConfig {
			dust_threshold: Amount::from_sat(546),
			risk_dropped_cache_size: 1000,
			event_horizon: 100,
			fee_per_kb: Amount::from_sat(1000),
			max_simultaneous_inputs: 400,
			autosave_coalesce_interval_ms: 10_000,
			max_standard_tx_size: 100_000,
			coinbase_maturity: 100,
		}
	}
}

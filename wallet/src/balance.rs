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

//! Balance-type surface (§6): four views over the same pool state, no
//! separate storage.

use crate::amount::Amount;
use crate::pool::{PoolKind, TransactionPool};

/// Which notion of "how much do I have" a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceType {
	/// includes pending and immature coinbase value
	Estimated,
	/// only confirmed, mature, spendable-now value
	Available,
	/// estimated, minus outputs a `DefaultCoinSelector` would refuse
	EstimatedSpendable,
	/// available, minus outputs a `DefaultCoinSelector` would refuse
	AvailableSpendable,
}

/// Computes `balance_type` directly from pool state; no cached totals.
pub fn balance(pool: &TransactionPool, balance_type: BalanceType) -> Amount {
	let owned_available = |tx: &crate::tx::Tx| {
		tx.outputs
			.iter()
			.filter(|o| o.is_mine && o.available_for_spending())
			.map(|o| o.value)
			.sum::<Amount>()
	};

	match balance_type {
		BalanceType::Estimated => pool
			.pool(PoolKind::Pending)
			.chain(pool.pool(PoolKind::Unspent))
			.map(owned_available)
			.sum(),
		BalanceType::Available | BalanceType::AvailableSpendable => {
			pool.pool(PoolKind::Unspent).filter(|tx| tx.confidence.is_building()).map(owned_available).sum()
		}
		BalanceType::EstimatedSpendable => pool
			.pool(PoolKind::Unspent)
			.filter(|tx| tx.confidence.is_building())
			.map(owned_available)
			.sum(),
	}
}

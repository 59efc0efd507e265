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

//! Risk Analyzer (§4.E): decides whether an inbound pending transaction
//! should be admitted. Rejection only filters pending admission — it
//! never applies to chain-confirmed transactions.

use crate::tx::Tx;

/// Verdict returned by a `RiskAnalyzer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskVerdict {
	/// safe to admit
	Ok,
	/// not final per nLockTime/nSequence; risky
	NonFinal,
}

/// Pluggable risk policy for pending-transaction admission.
pub trait RiskAnalyzer {
	/// Analyzes `tx` against the current chain tip.
	fn analyze(&self, tx: &Tx, current_height: u32, current_time: i64) -> RiskVerdict;
}

/// Default policy: a non-final transaction (per nLockTime/nSequence) is
/// risky; anything else is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRiskAnalyzer;

impl RiskAnalyzer for DefaultRiskAnalyzer {
	fn analyze(&self, tx: &Tx, current_height: u32, current_time: i64) -> RiskVerdict {
		if tx.is_final(current_height, current_time) {
			RiskVerdict::Ok
		} else {
			RiskVerdict::NonFinal
		}
	}
}

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

//! Key-rotation / maintenance scenario (S7): every at-risk output gets
//! swept into rekey batches, batching terminates, and outputs younger
//! than the cutoff are left alone.

mod common;

use common::{block, p2pkh, NullSigner, RecordingBroadcaster, TestKeyBag};
use spv_wallet_core::{Amount, BlockType, DefaultRiskAnalyzer, Tx, TxHash, TxOutput, Wallet, WalletConfig};

fn wallet_with_outputs(count: u8, creation_time: i64, max_simultaneous_inputs: usize) -> Wallet {
	let mut config = WalletConfig::default();
	config.max_simultaneous_inputs = max_simultaneous_inputs;
	let wallet = Wallet::new(
		config,
		Box::new(TestKeyBag::many(count, creation_time)),
		Box::new(DefaultRiskAnalyzer),
		vec![Box::new(NullSigner)],
		Box::new(RecordingBroadcaster::new()),
		"regtest",
		None,
	);
	for i in 1..=count {
		let funding = Tx::new(
			TxHash([i; 32]),
			Vec::new(),
			vec![TxOutput::new(Amount::from_sat(1_000_000), p2pkh(TestKeyBag::hash_for(i)))],
		);
		wallet.receive_from_block(funding, block(10 + i, 10, 0), BlockType::BestChain, 0, 10).unwrap();
	}
	wallet
}

/// S7: a handful of at-risk outputs, all older than the cutoff, spread
/// across more than one batch when `max_simultaneous_inputs` is small
/// enough to force it. `rekey` must terminate (the bug this guards
/// against was an infinite loop recomputing an unchanging at-risk set).
#[test]
fn rekey_batches_every_at_risk_output_and_terminates() {
	let wallet = wallet_with_outputs(5, 1_000, 2);

	let result = wallet.rekey(2_000, None).unwrap();

	let total_inputs: usize = result.batches.iter().map(|tx| tx.inputs.len()).sum();
	assert_eq!(total_inputs, 5);
	// five at-risk outputs, two per batch, ceil(5/2) = 3 batches
	assert_eq!(result.batches.len(), 3);
	for batch in &result.batches {
		assert!(batch.inputs.len() <= 2);
	}
}

/// S7: outputs created after the cutoff are never swept.
#[test]
fn rekey_leaves_outputs_younger_than_cutoff_alone() {
	let wallet = wallet_with_outputs(3, 5_000, 10);

	let result = wallet.rekey(1_000, None).unwrap();

	assert!(result.batches.is_empty());
}

/// S7: `backup_required` reflects the key bag's non-rotating material,
/// independent of whether there was anything at risk to rekey this call.
#[test]
fn rekey_reports_backup_required_independent_of_batches() {
	let wallet = wallet_with_outputs(1, 5_000, 10);

	let result = wallet.rekey(1_000, None).unwrap();

	assert!(result.batches.is_empty());
	// TestKeyBag always reports it already holds non-rotating material.
	assert!(!result.backup_required);
}

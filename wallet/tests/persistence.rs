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

//! Persistence round-trip scenario (S9): a wallet with one transaction
//! in each of the four pools plus a watched script survives a
//! save/reload cycle with pool membership and confidence intact.

mod common;

use common::{block, p2pkh, RecordingBroadcaster, TestKeyBag};
use spv_wallet_core::{
	Amount, BlockType, DefaultRiskAnalyzer, Outpoint, PoolKind, Tx, TxHash, TxInput, TxOutput, Wallet, WalletConfig,
};

const KEY: [u8; 20] = [1; 20];
const WATCHED: [u8; 20] = [9; 20];

fn wallet_at(path: &std::path::Path) -> Wallet {
	Wallet::new(
		WalletConfig::default(),
		Box::new(TestKeyBag::single(KEY, 0)),
		Box::new(DefaultRiskAnalyzer),
		Vec::new(),
		Box::new(RecordingBroadcaster::new()),
		"regtest",
		Some(path.to_path_buf()),
	)
}

#[test]
fn save_then_load_preserves_pool_membership_and_confidence() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("wallet.json");

	let wallet = wallet_at(&path);

	// PENDING: a freshly received, unconfirmed tx.
	let pending_tx = Tx::new(TxHash([1; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(1_000_000), p2pkh(KEY))]);
	wallet.receive_pending(pending_tx.clone(), false).unwrap();

	// UNSPENT: a confirmed tx whose output is untouched.
	let unspent_tx = Tx::new(TxHash([2; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(2_000_000), p2pkh(KEY))]);
	wallet.receive_from_block(unspent_tx.clone(), block(20, 20, 0), BlockType::BestChain, 0, 20).unwrap();

	// SPENT: a confirmed tx whose output is claimed by a pending spend.
	let spent_source = Tx::new(TxHash([3; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(3_000_000), p2pkh(KEY))]);
	wallet.receive_from_block(spent_source.clone(), block(21, 21, 0), BlockType::BestChain, 0, 21).unwrap();
	let mut spender = Tx::new(
		TxHash([4; 32]),
		vec![TxInput::new(Outpoint { hash: spent_source.hash, index: 0 })],
		vec![TxOutput::new(Amount::from_sat(2_900_000), p2pkh(KEY))],
	);
	spender.touch();
	wallet.receive_pending(spender.clone(), false).unwrap();

	// DEAD: a pending spend displaced by a conflicting confirmation.
	let dead_source = Tx::new(TxHash([5; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(4_000_000), p2pkh(KEY))]);
	wallet.receive_from_block(dead_source.clone(), block(22, 22, 0), BlockType::BestChain, 0, 22).unwrap();
	let dead_outpoint = Outpoint { hash: dead_source.hash, index: 0 };
	let mut dead_tx = Tx::new(TxHash([6; 32]), vec![TxInput::new(dead_outpoint)], vec![TxOutput::new(Amount::from_sat(3_900_000), p2pkh(KEY))]);
	dead_tx.touch();
	wallet.receive_pending(dead_tx.clone(), false).unwrap();
	let overriding_tx = Tx::new(TxHash([7; 32]), vec![TxInput::new(dead_outpoint)], vec![TxOutput::new(Amount::from_sat(3_800_000), p2pkh(KEY))]);
	wallet.receive_from_block(overriding_tx.clone(), block(23, 23, 0), BlockType::BestChain, 0, 23).unwrap();

	wallet.watch_script(p2pkh(WATCHED)).unwrap();

	assert_eq!(wallet.pool_kind_of(&pending_tx.hash), Some(PoolKind::Pending));
	assert_eq!(wallet.pool_kind_of(&unspent_tx.hash), Some(PoolKind::Unspent));
	assert_eq!(wallet.pool_kind_of(&spent_source.hash), Some(PoolKind::Spent));
	assert_eq!(wallet.pool_kind_of(&dead_tx.hash), Some(PoolKind::Dead));

	wallet.save().unwrap();

	let reloaded = wallet_at(&path);
	reloaded.load().unwrap();

	for hash in [pending_tx.hash, unspent_tx.hash, spent_source.hash, spender.hash, dead_source.hash, dead_tx.hash, overriding_tx.hash] {
		assert_eq!(wallet.pool_kind_of(&hash), reloaded.pool_kind_of(&hash), "pool mismatch for {:?}", hash);
		assert_eq!(wallet.confidence_of(&hash), reloaded.confidence_of(&hash), "confidence mismatch for {:?}", hash);
	}

	assert_eq!(reloaded.watched_scripts(), vec![p2pkh(WATCHED)]);
}

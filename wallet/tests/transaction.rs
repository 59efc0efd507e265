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

//! Reception, confirmation and reorg scenarios against the `Wallet`
//! facade (S1-S4).

mod common;

use common::{block, p2pkh, RecordingBroadcaster, TestKeyBag};
use spv_wallet_core::{
	Amount, BalanceType, BlockType, DefaultRiskAnalyzer, Outpoint, PoolKind, Tx, TxHash, TxInput, TxOutput, Wallet,
	WalletConfig,
};

const KEY: [u8; 20] = [1; 20];

fn test_wallet() -> Wallet {
	Wallet::new(
		WalletConfig::default(),
		Box::new(TestKeyBag::single(KEY, 0)),
		Box::new(DefaultRiskAnalyzer),
		Vec::new(),
		Box::new(RecordingBroadcaster::new()),
		"regtest",
		None,
	)
}

fn paying_tx(byte: u8, value: u64) -> Tx {
	Tx::new(TxHash([byte; 32]), Vec::new(), vec![TxOutput::new(Amount::from_sat(value), p2pkh(KEY))])
}

/// S1: pending admission is visible only in ESTIMATED until confirmed,
/// then moves to UNSPENT with AVAILABLE matching.
#[test]
fn simple_receive_then_confirm() {
	let wallet = test_wallet();
	let t1 = paying_tx(1, 100_000_000);

	wallet.receive_pending(t1.clone(), false).unwrap();
	assert_eq!(wallet.balance(BalanceType::Estimated), Amount::from_sat(100_000_000));
	assert_eq!(wallet.balance(BalanceType::Available), Amount::ZERO);
	assert_eq!(wallet.pool_kind_of(&t1.hash), Some(PoolKind::Pending));

	let b100 = block(100, 100, 0);
	let relevant = wallet.notify_transaction_is_in_block(t1.hash, b100, BlockType::BestChain, 0, 100).unwrap();
	assert!(relevant);

	assert_eq!(wallet.pool_kind_of(&t1.hash), Some(PoolKind::Unspent));
	assert_eq!(wallet.confidence_of(&t1.hash).unwrap().depth(), 1);
	assert_eq!(wallet.balance(BalanceType::Available), Amount::from_sat(100_000_000));
}

/// S2: a pending spend of a confirmed output is displaced by a
/// conflicting confirmed transaction; the displaced spend dies and the
/// original output is recorded as spent by the winner.
#[test]
fn double_spend_is_killed_by_confirmation() {
	let wallet = test_wallet();
	let t1 = paying_tx(1, 100_000_000);
	wallet.receive_pending(t1.clone(), false).unwrap();
	wallet.notify_transaction_is_in_block(t1.hash, block(10, 10, 0), BlockType::BestChain, 0, 10).unwrap();

	let outpoint = Outpoint { hash: t1.hash, index: 0 };
	let mut t2 = Tx::new(TxHash([2; 32]), vec![TxInput::new(outpoint)], vec![TxOutput::new(Amount::from_sat(99_000_000), p2pkh(KEY))]);
	t2.touch();
	wallet.receive_pending(t2.clone(), false).unwrap();
	assert_eq!(wallet.pool_kind_of(&t2.hash), Some(PoolKind::Pending));
	assert_eq!(wallet.pool_kind_of(&t1.hash), Some(PoolKind::Spent));

	// A different transaction spending the same outpoint confirms first.
	let t2_prime = Tx::new(TxHash([3; 32]), vec![TxInput::new(outpoint)], vec![TxOutput::new(Amount::from_sat(98_000_000), p2pkh(KEY))]);
	wallet.receive_from_block(t2_prime.clone(), block(11, 11, 0), BlockType::BestChain, 0, 11).unwrap();

	assert_eq!(wallet.pool_kind_of(&t2.hash), Some(PoolKind::Dead));
	assert!(wallet.confidence_of(&t2.hash).unwrap().is_dead());
	assert_eq!(wallet.pool_kind_of(&t1.hash), Some(PoolKind::Spent));
	assert_eq!(wallet.pool_kind_of(&t2_prime.hash), Some(PoolKind::Unspent));
}

/// S3: reorganizing away the block that confirmed a transaction puts it
/// back in PENDING with depth cleared.
#[test]
fn reorg_restores_confirmed_tx_to_pending() {
	let wallet = test_wallet();
	let t1 = paying_tx(1, 100_000_000);
	wallet.receive_pending(t1.clone(), false).unwrap();

	let confirming_block = block(50, 100, 0);
	wallet.notify_transaction_is_in_block(t1.hash, confirming_block, BlockType::BestChain, 0, 100).unwrap();
	wallet.notify_new_best_block(block(51, 101, 0)).unwrap();
	wallet.notify_new_best_block(block(52, 102, 0)).unwrap();
	assert_eq!(wallet.confidence_of(&t1.hash).unwrap().depth(), 3);

	let split = block(49, 99, 0);
	wallet.reorganize(split, &[confirming_block], &[], 99).unwrap();

	assert_eq!(wallet.pool_kind_of(&t1.hash), Some(PoolKind::Pending));
	assert!(wallet.confidence_of(&t1.hash).unwrap().is_pending_like());
	assert_eq!(wallet.balance(BalanceType::Estimated), Amount::from_sat(100_000_000));
	assert_eq!(wallet.balance(BalanceType::Available), Amount::ZERO);
}

/// S4: a reorg that strips a coinbase's block kills the coinbase and
/// recursively kills anything already spending from it.
#[test]
fn reorg_kills_coinbase_and_its_pending_descendant() {
	let wallet = test_wallet();
	let mut cb = paying_tx(9, 5_000_000_000);
	cb.is_coinbase = true;
	let cb_block = block(60, 50, 0);
	// chain_tip_height=1 against block height 50 yields depth=50, per
	// the confirm-depth formula in receive_from_block.
	wallet.receive_from_block(cb.clone(), cb_block, BlockType::BestChain, 0, 1).unwrap();
	assert_eq!(wallet.confidence_of(&cb.hash).unwrap().depth(), 50);

	let t3 = Tx::new(TxHash([4; 32]), vec![TxInput::new(Outpoint { hash: cb.hash, index: 0 })], vec![TxOutput::new(Amount::from_sat(4_999_000_000), p2pkh([7; 20]))]);
	wallet.receive_pending(t3.clone(), false).unwrap();

	wallet.reorganize(block(59, 49, 0), &[cb_block], &[], 49).unwrap();

	assert_eq!(wallet.pool_kind_of(&cb.hash), Some(PoolKind::Dead));
	assert_eq!(wallet.pool_kind_of(&t3.hash), Some(PoolKind::Dead));
}

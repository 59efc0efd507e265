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

//! Core state machine for an SPV Bitcoin wallet.
//!
//! This crate tracks relevant transactions as they arrive from the
//! peer-to-peer network, maintains per-transaction confidence under
//! chain reorganizations, selects outputs for spending and crafts
//! signed transactions that obey network policy. The HD key hierarchy,
//! cryptographic primitives, P2P networking and block validation are
//! external collaborators, consumed here only through the `KeyBag`,
//! `Signer`, `TransactionBroadcaster` and `BlockChain`-driver interfaces
//! (see `wallet`, `keybag`, `crypter`, `broadcaster`, `blockchain`).

#[macro_use]
extern crate serde_derive;

pub mod amount;
pub mod balance;
pub mod blockchain;
pub mod broadcaster;
pub mod composer;
pub mod config;
pub mod consistency;
pub mod context;
pub mod crypter;
pub mod error;
pub mod keybag;
pub mod listener;
pub mod maintenance;
pub mod persistence;
pub mod pool;
pub mod reception;
pub mod reorg;
pub mod risk;
pub mod selection;
pub mod tx;
pub mod wallet;

pub use crate::amount::Amount;
pub use crate::balance::{balance, BalanceType};
pub use crate::blockchain::{BlockType, StoredBlock};
pub use crate::broadcaster::{BroadcastHandle, BroadcastResult, TransactionBroadcaster};
pub use crate::composer::{SendRequest, TransactionComposer};
pub use crate::config::WalletConfig;
pub use crate::context::Context;
pub use crate::crypter::{KeyCrypter, MissingSigMode, Signer};
pub use crate::error::{Error, ErrorKind};
pub use crate::keybag::{AddressPurpose, Key, KeyBag, RedeemData};
pub use crate::listener::{Executor, ListenerFabric, ListenerHandle, WalletEvent};
pub use crate::maintenance::{MaintenanceEngine, RekeyResult};
pub use crate::persistence::{AutosaveMode, Autosaver, FileWalletStore, PersistedWallet};
pub use crate::pool::{PoolKind, TransactionPool};
pub use crate::reception::{ReceiveOutcome, ReceptionEngine};
pub use crate::risk::{DefaultRiskAnalyzer, RiskAnalyzer, RiskVerdict};
pub use crate::selection::{AllowUnconfirmedCoinSelector, CoinSelector, DefaultCoinSelector, KeyAgeCoinSelector, Utxo};
pub use crate::tx::{ChangeReason, Confidence, ConfidenceType, ExchangeRate, Outpoint, Purpose, Script, Source, Tx, TxHash, TxInput, TxOutput};
pub use crate::wallet::Wallet;

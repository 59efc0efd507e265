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

//! The chain driver's view of a block, and the entry points it calls
//! into the wallet (§6). Header validation, PoW and Merkle proofs are
//! out of scope — `StoredBlock` carries only what the reception/reorg
//! engines need.

use crate::tx::TxHash;

/// A block header, as known to the wallet: just enough to anchor
/// confidence depth and reorg bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
	/// block hash
	pub hash: TxHash,
	/// height in the best chain at the time this block was delivered
	pub height: u32,
	/// block timestamp, unix seconds
	pub time: i64,
}

/// Where a delivered block sits relative to the wallet's notion of the
/// best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
	/// part of the chain the wallet currently considers best
	BestChain,
	/// part of a chain the wallet has not (yet) adopted
	SideChain,
}

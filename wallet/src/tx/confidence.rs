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

//! Per-transaction confidence, collapsed to a tagged enum per the design
//! notes rather than a class hierarchy with a separate `ConfidenceType`
//! discriminant bolted on.

use crate::tx::TxHash;
use std::collections::BTreeSet;

/// Where a transaction was first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
	/// provenance unknown (e.g. loaded from an older wallet file)
	Unknown,
	/// built and signed by this wallet
	Myself,
	/// received from the P2P network
	Network,
}

/// Why a transaction was created, surfaced to listeners and persisted so
/// maintenance batches can be told apart from user payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
	/// unspecified
	Unknown,
	/// an ordinary user-initiated payment
	UserPayment,
	/// emitted by the maintenance engine's key-rotation batching
	KeyRotation,
}

/// The field that changed in a confidence event, consumed by the listener
/// fabric to decide which `confidence-changed` subscribers care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
	/// the `Confidence` variant itself changed (e.g. PENDING -> BUILDING)
	Type,
	/// the depth counter changed
	Depth,
	/// the broadcast-peers set changed
	SeenPeers,
	/// the purpose tag changed
	Purpose,
}

/// Confidence state, per §3. `BUILDING` carries its own depth and
/// first-seen height; `DEAD` carries the optional overriding transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfidenceType {
	/// never observed
	Unknown,
	/// seen but not yet in a best-chain block
	Pending,
	/// a double-spend race is in progress in the pool
	InConflict,
	/// confirmed on the best chain
	Building {
		/// confirmations, counting the including block as depth 1
		depth: u32,
		/// height of the block this tx first appeared in
		appeared_at_height: u32,
	},
	/// displaced by a double spend, or a descendant of one
	Dead {
		/// the transaction that overrode this one, if known
		overriding_tx: Option<TxHash>,
	},
}

/// The mutable confidence a `Tx` carries: its type, provenance, purpose
/// and the set of peers that relayed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confidence {
	/// confidence variant (§3)
	pub confidence_type: ConfidenceType,
	/// where this tx came from
	pub source: Source,
	/// peers that relayed or echoed this transaction
	pub broadcast_peers: BTreeSet<String>,
	/// why the transaction exists
	pub purpose: Purpose,
}

impl Confidence {
	/// A freshly constructed, never-seen confidence.
	pub fn unknown() -> Confidence {
		Confidence {
			confidence_type: ConfidenceType::Unknown,
			source: Source::Unknown,
			broadcast_peers: BTreeSet::new(),
			purpose: Purpose::Unknown,
		}
	}

	/// Confidence for a transaction freshly admitted from the mempool.
	pub fn pending(source: Source) -> Confidence {
		Confidence {
			confidence_type: ConfidenceType::Pending,
			source,
			broadcast_peers: BTreeSet::new(),
			purpose: Purpose::Unknown,
		}
	}

	/// Transitions this confidence to `BUILDING{depth=1, appeared_at_height}`,
	/// per the PENDING -> best-chain-block-contains-T transition in §4.B.
	/// Returns the set of change reasons produced.
	pub fn confirm(&mut self, appeared_at_height: u32) -> Vec<ChangeReason> {
		self.confidence_type = ConfidenceType::Building {
			depth: 1,
			appeared_at_height,
		};
		vec![ChangeReason::Type, ChangeReason::Depth]
	}

	/// Advances the depth counter by one on receipt of a new best block,
	/// per the BUILDING -> BUILDING{depth+1} transition.
	pub fn deepen(&mut self) -> Vec<ChangeReason> {
		if let ConfidenceType::Building { depth, .. } = &mut self.confidence_type {
			*depth += 1;
			vec![ChangeReason::Depth]
		} else {
			Vec::new()
		}
	}

	/// Reverts a BUILDING confidence back to PENDING with depth cleared,
	/// per the reorg-removes-containing-block transition.
	pub fn revert_to_pending(&mut self) -> Vec<ChangeReason> {
		self.confidence_type = ConfidenceType::Pending;
		vec![ChangeReason::Type, ChangeReason::Depth]
	}

	/// Marks this transaction DEAD, optionally recording the tx that
	/// overrode it.
	pub fn kill(&mut self, overriding_tx: Option<TxHash>) -> Vec<ChangeReason> {
		self.confidence_type = ConfidenceType::Dead { overriding_tx };
		vec![ChangeReason::Type]
	}

	/// Marks this transaction IN_CONFLICT, per the pool-double-spend
	/// transition.
	pub fn mark_in_conflict(&mut self) -> Vec<ChangeReason> {
		self.confidence_type = ConfidenceType::InConflict;
		vec![ChangeReason::Type]
	}

	/// Records a relaying peer, returning `SeenPeers` iff the set actually
	/// grew.
	pub fn add_broadcast_peer(&mut self, peer: impl Into<String>) -> Vec<ChangeReason> {
		if self.broadcast_peers.insert(peer.into()) {
			vec![ChangeReason::SeenPeers]
		} else {
			Vec::new()
		}
	}

	/// Clears the broadcast-peer set once depth exceeds the configured
	/// event horizon (§4.B).
	pub fn clear_peers_if_past_horizon(&mut self, event_horizon: u32) -> Vec<ChangeReason> {
		if let ConfidenceType::Building { depth, .. } = self.confidence_type {
			if depth > event_horizon && !self.broadcast_peers.is_empty() {
				self.broadcast_peers.clear();
				return vec![ChangeReason::SeenPeers];
			}
		}
		Vec::new()
	}

	/// Sets the purpose tag, returning a change reason iff it actually
	/// changed.
	pub fn set_purpose(&mut self, purpose: Purpose) -> Vec<ChangeReason> {
		if self.purpose != purpose {
			self.purpose = purpose;
			vec![ChangeReason::Purpose]
		} else {
			Vec::new()
		}
	}

	/// Current confirmation depth, or 0 if not BUILDING.
	pub fn depth(&self) -> u32 {
		match self.confidence_type {
			ConfidenceType::Building { depth, .. } => depth,
			_ => 0,
		}
	}

	/// True for PENDING or IN_CONFLICT — the two pool-membership-PENDING
	/// confidences per §3 invariant 4.
	pub fn is_pending_like(&self) -> bool {
		matches!(
			self.confidence_type,
			ConfidenceType::Pending | ConfidenceType::InConflict
		)
	}

	/// True for BUILDING.
	pub fn is_building(&self) -> bool {
		matches!(self.confidence_type, ConfidenceType::Building { .. })
	}

	/// True for DEAD.
	pub fn is_dead(&self) -> bool {
		matches!(self.confidence_type, ConfidenceType::Dead { .. })
	}
}

// Manual (de)serialization: `ConfidenceType` has unit and struct variants
// that don't need a tagged internal representation for our purposes, but
// we keep the wire shape stable and independent of enum variant ordering,
// the way `BlockIdentifier` hex-encodes rather than deriving.
impl serde::ser::Serialize for Confidence {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::ser::Serializer,
	{
		use serde::ser::SerializeStruct;
		let (type_tag, depth, appeared_at_height, overriding_tx): (
			&str,
			u32,
			u32,
			Option<TxHash>,
		) = match &self.confidence_type {
			ConfidenceType::Unknown => ("unknown", 0, 0, None),
			ConfidenceType::Pending => ("pending", 0, 0, None),
			ConfidenceType::InConflict => ("in_conflict", 0, 0, None),
			ConfidenceType::Building {
				depth,
				appeared_at_height,
			} => ("building", *depth, *appeared_at_height, None),
			ConfidenceType::Dead { overriding_tx } => ("dead", 0, 0, overriding_tx.clone()),
		};
		let mut s = serializer.serialize_struct("Confidence", 6)?;
		s.serialize_field("type", type_tag)?;
		s.serialize_field("depth", &depth)?;
		s.serialize_field("appeared_at_height", &appeared_at_height)?;
		s.serialize_field("overriding_tx", &overriding_tx)?;
		s.serialize_field("source", &self.source)?;
		s.serialize_field("broadcast_peers", &self.broadcast_peers)?;
		s.serialize_field("purpose", &self.purpose)?;
		s.end()
	}
}

impl<'de> serde::de::Deserialize<'de> for Confidence {
	fn deserialize<D>(deserializer: D) -> Result<Confidence, D::Error>
	where
		D: serde::de::Deserializer<'de>,
	{
		#[derive(Deserialize)]
		struct Raw {
			#[serde(rename = "type")]
			type_tag: String,
			depth: u32,
			appeared_at_height: u32,
			overriding_tx: Option<TxHash>,
			source: Source,
			broadcast_peers: BTreeSet<String>,
			purpose: Purpose,
		}
		use serde::de::Error;
		let raw = Raw::deserialize(deserializer)?;
		let confidence_type = match raw.type_tag.as_str() {
			"unknown" => ConfidenceType::Unknown,
			"pending" => ConfidenceType::Pending,
			"in_conflict" => ConfidenceType::InConflict,
			"building" => ConfidenceType::Building {
				depth: raw.depth,
				appeared_at_height: raw.appeared_at_height,
			},
			"dead" => ConfidenceType::Dead {
				overriding_tx: raw.overriding_tx,
			},
			other => return Err(D::Error::custom(format!("unknown confidence type {}", other))),
		};
		Ok(Confidence {
			confidence_type,
			source: raw.source,
			broadcast_peers: raw.broadcast_peers,
			purpose: raw.purpose,
		})
	}
}

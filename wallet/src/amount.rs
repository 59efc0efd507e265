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

//! Satoshi amounts.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A value in satoshis (1/100_000_000 of a bitcoin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(pub u64);

impl Amount {
	/// The zero amount.
	pub const ZERO: Amount = Amount(0);

	/// Builds an `Amount` from a satoshi count.
	pub fn from_sat(sat: u64) -> Amount {
		Amount(sat)
	}

	/// Returns the underlying satoshi count.
	pub fn as_sat(&self) -> u64 {
		self.0
	}

	/// Checked subtraction, returning `None` on underflow.
	pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
		self.0.checked_sub(other.0).map(Amount)
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{:08}", self.0 / 100_000_000, self.0 % 100_000_000)
	}
}

impl Add for Amount {
	type Output = Amount;
	fn add(self, other: Amount) -> Amount {
		Amount(self.0 + other.0)
	}
}

impl AddAssign for Amount {
	fn add_assign(&mut self, other: Amount) {
		self.0 += other.0;
	}
}

impl Sub for Amount {
	type Output = Amount;
	fn sub(self, other: Amount) -> Amount {
		Amount(self.0 - other.0)
	}
}

impl SubAssign for Amount {
	fn sub_assign(&mut self, other: Amount) {
		self.0 -= other.0;
	}
}

impl Sum for Amount {
	fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
		Amount(iter.map(|a| a.0).sum())
	}
}

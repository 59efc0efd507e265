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

//! Error types for the wallet core.

use failure::{Backtrace, Context, Fail};
use std::env;
use std::fmt::{self, Display};
use std::io;

/// Error definition
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Wallet errors, covering composition failures, invariant violations and
/// key/IO failures encountered while driving the pool.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Not enough funds to satisfy a send request.
	#[fail(
		display = "Not enough funds. Required: {}, Available: {}",
		needed, available
	)]
	InsufficientMoney {
		/// satoshis available to the selector
		available: u64,
		/// satoshis required including fee
		needed: u64,
	},

	/// One or more outputs fall below the dust threshold.
	#[fail(display = "Output value is below the dust threshold")]
	Dust,

	/// More than one OP_RETURN output was requested.
	#[fail(display = "A transaction may carry at most one OP_RETURN output")]
	MultipleOpReturn,

	/// Recipient-pays-fees could not find a valid fee assignment.
	#[fail(display = "Cannot adjust outputs downwards to cover the fee")]
	CantAdjustDownwards,

	/// Serialized transaction size exceeds the standard transaction limit.
	#[fail(display = "Transaction size {} exceeds the maximum of {}", actual, max)]
	ExceededMaxTxSize {
		/// measured serialized size
		actual: usize,
		/// protocol maximum for standard transactions
		max: usize,
	},

	/// The composer was reused on a request already marked completed.
	#[fail(display = "Send request has already been completed")]
	AlreadyCompleted,

	/// A pool invariant did not hold after a mutating operation.
	#[fail(display = "Invariant violation: {}", _0)]
	InvariantViolation(String),

	/// Signing required a private key the `KeyBag` did not have.
	#[fail(display = "Missing private key for signing")]
	MissingPrivateKey,

	/// The wallet is encrypted and no passphrase was supplied.
	#[fail(display = "Encrypted wallet requires a password")]
	EncryptedWalletRequiresPassword,

	/// The passphrase derived an AES key that failed to decrypt the payload.
	#[fail(display = "Bad AES key")]
	BadAesKey,

	/// Underlying I/O error, most often from persistence.
	#[fail(display = "I/O error: {}", _0)]
	Io(String),

	/// A chain-delivered transaction failed verification.
	#[fail(display = "Verification failed: {}", _0)]
	VerificationFailed(String),

	/// Generic backend/store error, analogous to `grin_wallet`'s `Backend`.
	#[fail(display = "Wallet store error: {}", _0)]
	Backend(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let show_bt = match env::var("RUST_BACKTRACE") {
			Ok(r) => r == "1",
			Err(_) => false,
		};
		let backtrace = match self.backtrace() {
			Some(b) => format!("{}", b),
			None => String::from("Unknown"),
		};
		let mut output = format!("{}", self.inner);
		if show_bt {
			output.push_str(&format!("\n Backtrace: {}", backtrace));
		}
		Display::fmt(&output, f)
	}
}

impl Error {
	/// Returns a clone of the underlying kind, so callers can match on it
	/// without consuming the error.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}

	/// Returns the proximate cause, if any.
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	/// Returns the captured backtrace, if any.
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<io::Error> for Error {
	fn from(error: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Io(error.to_string())),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(error: serde_json::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Backend(error.to_string())),
		}
	}
}

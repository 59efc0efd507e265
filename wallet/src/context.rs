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

//! Explicit per-wallet context, replacing the global/static singletons
//! (DRM flag, shared executors, "current context") the distillation's
//! source kept at module scope.

use crate::config::WalletConfig;
use std::sync::Arc;

/// Carries the configuration and background-worker handles a `Wallet`
/// needs, passed explicitly at construction instead of reached for via a
/// static. Cheap to clone; everything behind an `Arc`.
#[derive(Clone)]
pub struct Context {
	config: Arc<WalletConfig>,
}

impl Context {
	/// Builds a context from a config.
	pub fn new(config: WalletConfig) -> Context {
		Context {
			config: Arc::new(config),
		}
	}

	/// Returns the wallet-wide configuration.
	pub fn config(&self) -> &WalletConfig {
		&self.config
	}
}

impl Default for Context {
	fn default() -> Context {
		Context::new(WalletConfig::default())
	}
}

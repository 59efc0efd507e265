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

use spv_wallet_util::file;
use std::fs;
use std::path::Path;

#[test]
fn write_atomic_creates_file_with_contents() {
	let root = Path::new("./target/tmp_write_atomic");
	fs::create_dir_all(root).unwrap();
	let target = root.join("wallet.json");
	file::write_atomic(&target, b"{\"version\":1}").unwrap();
	assert_eq!(fs::read(&target).unwrap(), b"{\"version\":1}");
	// No leftover temp file.
	assert!(!target.with_extension("tmp").exists());
	fs::remove_dir_all(root).unwrap();
}

#[test]
fn write_atomic_overwrites_existing_file() {
	let root = Path::new("./target/tmp_write_atomic_overwrite");
	fs::create_dir_all(root).unwrap();
	let target = root.join("wallet.json");
	file::write_atomic(&target, b"old").unwrap();
	file::write_atomic(&target, b"new").unwrap();
	assert_eq!(fs::read(&target).unwrap(), b"new");
	fs::remove_dir_all(root).unwrap();
}

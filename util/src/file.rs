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
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Writes `contents` to `path` durably: write to a sibling temp file, fsync
/// it, then rename over the destination. Avoids leaving a half-written file
/// behind if the process is killed mid-write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
	let tmp_path = path.with_extension("tmp");
	{
		let mut tmp_file = File::create(&tmp_path)?;
		tmp_file.write_all(contents)?;
		tmp_file.sync_all()?;
	}
	fs::rename(&tmp_path, path)?;
	if let Some(dir) = path.parent() {
		// fsync the directory entry so the rename itself is durable.
		if let Ok(dir_file) = File::open(dir) {
			let _ = dir_file.sync_all();
		}
	}
	Ok(())
}

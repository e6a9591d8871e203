// Copyright 2024 Google LLC
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

//! Incremental ZIP reader/writer used as the storage layer for APK editing.
//!
//! Unlike a conventional ZIP library, [ZipArchive] edits an existing archive
//! in place: entries that were not touched keep their exact bytes, and new
//! entries are appended after the last existing payload. The central
//! directory and End Of Central Directory record are only re-emitted when the
//! archive is saved, which is also where the APK Signing Block is spliced in
//! by the signing layer.

mod archive;
pub mod records;
pub mod stream;

pub use archive::{normalize_name, Compression, EntryReader, ZipArchive};
pub use stream::{Backing, FileBacking, MemoryBacking};

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

//! # STITCH API
//!
//! This crate exposes the public surface through which other projects edit
//! and re-sign APK files in place.
//!
//! An [Apk] handle owns its backing stream. Entries can be listed, read,
//! added and removed; closing a writable handle re-signs the archive with
//! both the v1 (JAR) and v2 (APK Signing Block) schemes so the result stays
//! installable.
//!
//! ```no_run
//! use stitch_api::{Apk, Compression, Result};
//!
//! fn add_marker(path: &str) -> Result<()> {
//!     let mut apk = Apk::open(path)?;
//!     apk.add_file("assets/marker.txt", &b"edited"[..], Compression::Deflate(6))?;
//!     apk.close()
//! }
//! ```
//!
//! Until [Apk::set_certificate] installs an identity, a bundled debug
//! certificate signs the output, which is enough for local installs.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use stitch_sign::{sign_and_save_archive, v1_signing};
use stitch_zip::{normalize_name, ZipArchive};

pub use stitch_common::{Result, StitchError};
pub use stitch_sign::crypto_keys::Keys;
pub use stitch_zip::records::DosDateTime;
pub use stitch_zip::{Backing, Compression, EntryReader, FileBacking, MemoryBacking};

/// An open APK. See the crate documentation for the lifecycle.
pub struct Apk<S: Backing> {
    // None once the handle has been closed
    archive: Option<ZipArchive<S>>,
    keys: Keys,
    // Entry digests recovered from the archive's v1 manifest at open time.
    // Mutated entries are evicted so the next signing pass rehashes them.
    existing_hashes: BTreeMap<String, String>,
}

impl Apk<FileBacking> {
    /// Opens an APK file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_backing(FileBacking::open(path)?)
    }

    /// Opens an APK file for reading only. Mutations and signing are
    /// unavailable; closing releases the file without saving.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_backing(FileBacking::open_read_only(path)?)
    }
}

impl<S: Backing> Apk<S> {
    /// Opens an APK over any backing stream.
    pub fn from_backing(backing: S) -> Result<Self> {
        let mut archive = ZipArchive::open(backing)?;
        let existing_hashes = if archive.is_writable() {
            v1_signing::collect_existing_hashes(&mut archive)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            archive: Some(archive),
            keys: Keys::debug_signing_keys()?,
            existing_hashes,
        })
    }

    fn archive(&self) -> Result<&ZipArchive<S>> {
        self.archive.as_ref().ok_or(StitchError::Disposed)
    }

    fn archive_mut(&mut self) -> Result<&mut ZipArchive<S>> {
        self.archive.as_mut().ok_or(StitchError::Disposed)
    }

    /// Replaces the signing identity with one parsed from combined PEM text
    /// (a `CERTIFICATE` section plus a PKCS#8 `PRIVATE KEY` section).
    pub fn set_certificate(&mut self, pem_text: &str) -> Result<()> {
        self.archive()?;
        self.keys = Keys::from_combined_pem_string(pem_text)?;
        Ok(())
    }

    /// Entry names, in lexicographic order.
    pub fn entries(&self) -> Result<Vec<String>> {
        Ok(self.archive()?.entry_names().map(str::to_owned).collect())
    }

    /// Whether an entry with this name exists.
    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.archive()?.contains_file(name))
    }

    /// The stored CRC-32 of the entry's uncompressed bytes.
    pub fn crc32(&self, name: &str) -> Result<u32> {
        self.archive()?.crc32(name)
    }

    /// Opens a reader over the entry's decompressed bytes. The reader
    /// borrows the handle; no other operation can run until it is dropped.
    pub fn open_reader(&mut self, name: &str) -> Result<EntryReader<'_, S>> {
        self.archive_mut()?.open_reader(name)
    }

    /// Reads an entry fully into memory.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        self.archive_mut()?.read_file(name)
    }

    /// Adds or replaces an entry, streaming `source` into the archive.
    pub fn add_file<R: Read>(
        &mut self,
        name: &str,
        source: R,
        compression: Compression,
    ) -> Result<()> {
        self.archive_mut()?.add_file(name, source, compression)?;
        self.existing_hashes.remove(&normalize_name(name));
        Ok(())
    }

    /// Removes an entry, returning whether it was present.
    pub fn remove_file(&mut self, name: &str) -> Result<bool> {
        let removed = self.archive_mut()?.remove_file(name)?;
        self.existing_hashes.remove(&normalize_name(name));
        Ok(removed)
    }

    /// Overrides the timestamp stamped onto entries added from now on, for
    /// reproducible output.
    pub fn set_timestamp(&mut self, timestamp: DosDateTime) -> Result<()> {
        self.archive_mut()?.set_timestamp(timestamp);
        Ok(())
    }

    /// Saves and releases the handle.
    ///
    /// On a writable stream this runs v1 signing (inserting the `META-INF/`
    /// signature entries), then v2 signing (splicing the APK Signing Block
    /// before the central directory), and finally writes the central
    /// directory and trailer. On a read-only stream it only releases the
    /// stream. The handle is disposed either way, even when saving fails.
    pub fn close(&mut self) -> Result<()> {
        let mut archive = self.archive.take().ok_or(StitchError::Disposed)?;
        if archive.is_writable() {
            sign_and_save_archive(&mut archive, &self.keys, &self.existing_hashes)?;
        }
        Ok(())
    }
}

impl<S: Backing> Drop for Apk<S> {
    /// Dropping an unclosed writable handle still saves, but any failure is
    /// lost. Call [Apk::close] to observe save errors.
    fn drop(&mut self) {
        let _ = self.close();
    }
}

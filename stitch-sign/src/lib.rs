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

use std::collections::BTreeMap;

use deku::DekuContainerWrite;
use stitch_common::Result;
use stitch_zip::{Backing, ZipArchive};

use crypto_keys::Keys;
use signing_block::compute_signing_block;

mod crypto;
pub mod crypto_keys;
mod hasher;
mod signed_data_block;
mod signing_block;
mod signing_types;
pub mod v1_signing;

pub use crypto_keys::PrivateKey;

// APK Signature Scheme v2 based on https://source.android.com/docs/security/features/apksigning/v2
/// Signs an open archive and writes it out.
///
/// The v1 (JAR) signature entries are inserted into the archive first, then
/// the APK Signing Block is spliced between the last entry and the central
/// directory, and finally the central directory and trailer are emitted.
/// `existing_hashes` carries per-entry digests recovered from a previous v1
/// manifest so untouched entries are not rehashed.
pub fn sign_and_save_archive<S: Backing>(
    archive: &mut ZipArchive<S>,
    keys: &Keys,
    existing_hashes: &BTreeMap<String, String>,
) -> Result<()> {
    v1_signing::add_v1_signature_files(archive, keys, existing_hashes)?;

    let central_directory = archive.central_directory_bytes()?;
    // The trailer covered by the digests points its central-directory offset
    // at the signing block's own start, which is what verifiers reconstruct.
    // Its size does not depend on the block, so no dry-run serialisation is
    // needed before hashing.
    let digest_trailer =
        archive.end_record(central_directory.len(), archive.post_files_offset())?;
    let top_level_hash = hasher::compute_top_level_hash(
        archive,
        &central_directory,
        &digest_trailer.to_bytes(),
    )?;
    let signing_block = compute_signing_block(top_level_hash, keys)?;
    archive.save(&signing_block.to_bytes()?, &central_directory)
}

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

use std::io::Read;

use sha2::{Digest, Sha256};
use stitch_common::Result;
use stitch_zip::{Backing, ZipArchive};

pub type Sha256Hash = [u8; 32];

pub const BYTES_IN_1MB: u32 = 1024 * 1024;
pub const FIRST_LEVEL_CHUNK_MAGIC: &[u8] = &[0xa5];
pub const SECOND_LEVEL_CHUNK_MAGIC: &[u8] = &[0x5a];

/// Computes the digest the v2 scheme signs: each protected region is split
/// into 1 MiB chunks, every chunk hashed with a `0xa5` prefix and its length,
/// and the chunk hashes combined under a `0x5a` prefix and count.
///
/// The three regions, in order: the entry region (byte 0 up to the signing
/// block's position), the central directory as it will be written, and the
/// trailer with its central-directory offset pointing at the signing block.
pub fn compute_top_level_hash<S: Backing>(
    archive: &mut ZipArchive<S>,
    central_directory: &[u8],
    trailer: &[u8],
) -> Result<Sha256Hash> {
    let mut first_level_hashes = Vec::new();
    hash_entry_region(archive, &mut first_level_hashes)?;
    first_level_hashes.extend(hash_chunk(central_directory));
    first_level_hashes.extend(hash_chunk(trailer));

    let mut hasher = Sha256::new();
    hasher.update(SECOND_LEVEL_CHUNK_MAGIC);
    hasher.update((first_level_hashes.len() as u32).to_le_bytes());
    for hash in &first_level_hashes {
        hasher.update(hash);
    }
    let second_level_hash: Sha256Hash = hasher.finalize_reset().into();

    Ok(second_level_hash)
}

// The entry region is streamed from the backing store rather than held in
// memory; APKs routinely outgrow what we want to buffer.
fn hash_entry_region<S: Backing>(
    archive: &mut ZipArchive<S>,
    first_level_hashes: &mut Vec<Sha256Hash>,
) -> Result<()> {
    let mut remaining = archive.post_files_offset();
    let mut reader = archive.content_reader()?;
    let mut buffer = vec![0u8; BYTES_IN_1MB as usize];
    let mut hasher = Sha256::new();

    while remaining > 0 {
        let chunk_size = remaining.min(BYTES_IN_1MB as u64) as usize;
        reader.read_exact(&mut buffer[..chunk_size])?;
        hasher.update(FIRST_LEVEL_CHUNK_MAGIC);
        hasher.update((chunk_size as u32).to_le_bytes());
        hasher.update(&buffer[..chunk_size]);
        first_level_hashes.push(hasher.finalize_reset().into());
        remaining -= chunk_size as u64;
    }
    Ok(())
}

pub fn hash_chunk(chunk: &[u8]) -> Vec<Sha256Hash> {
    let mut hasher = Sha256::new();
    let mut chunk_hashes = vec![];
    let mut pos = 0;

    while pos < chunk.len() {
        // Each chunk is 1MB OR whatever's left in the buffer
        let end = (pos + BYTES_IN_1MB as usize).min(chunk.len());
        let chunk_size = end - pos;
        hasher.update(FIRST_LEVEL_CHUNK_MAGIC);
        hasher.update((chunk_size as u32).to_le_bytes());
        hasher.update(&chunk[pos..end]);
        chunk_hashes.push(hasher.finalize_reset().into());
        pos = end;
    }

    chunk_hashes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_buffer_is_one_chunk() {
        let data = b"just a few bytes";
        let hashes = hash_chunk(data);
        assert_eq!(hashes.len(), 1);

        let mut expected = Sha256::new();
        expected.update([0xa5]);
        expected.update((data.len() as u32).to_le_bytes());
        expected.update(data);
        assert_eq!(hashes[0], <Sha256Hash>::from(expected.finalize()));
    }

    #[test]
    fn chunking_splits_at_one_mebibyte() {
        let data = vec![7u8; BYTES_IN_1MB as usize + 1];
        let hashes = hash_chunk(&data);
        assert_eq!(hashes.len(), 2);

        let mut tail = Sha256::new();
        tail.update([0xa5]);
        tail.update(1u32.to_le_bytes());
        tail.update([7u8]);
        assert_eq!(hashes[1], <Sha256Hash>::from(tail.finalize()));
    }

    #[test]
    fn empty_buffer_has_no_chunks() {
        assert!(hash_chunk(&[]).is_empty());
    }
}

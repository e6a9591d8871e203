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

use crate::{
    crypto::get_signature_for_signed_data,
    crypto_keys::Keys,
    hasher::Sha256Hash,
    signing_types::{ApkSigningBlock, SignatureSchemeV2Block, SignedData},
};
use stitch_common::Result;

pub fn compute_signing_block(top_level_hash: Sha256Hash, keys: &Keys) -> Result<ApkSigningBlock> {
    // Construct the data block that we're going to sign
    // NOTE: The signature does NOT include the length prefix
    let signed_data = SignedData::new(top_level_hash, keys);
    let signature = get_signature_for_signed_data(&signed_data, keys)?;
    // Create the scheme block and wrap it in the APK Signing Block that goes
    // straight into the archive
    let scheme_block = SignatureSchemeV2Block::new(signed_data, signature, keys)?;
    ApkSigningBlock::new(scheme_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signed_data_block::APK_SIGNING_BLOCK_MAGIC;

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn read_u64(bytes: &[u8], at: usize) -> u64 {
        u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
    }

    #[test]
    fn block_layout_is_self_consistent() {
        use deku::DekuContainerWrite;

        let keys = Keys::debug_signing_keys().unwrap();
        let block = compute_signing_block([0x42; 32], &keys).unwrap();
        let bytes = block.to_bytes().unwrap();

        // Trailing magic
        assert_eq!(&bytes[bytes.len() - 16..], APK_SIGNING_BLOCK_MAGIC);

        // Both size fields exclude the leading size field itself.
        let leading_size = read_u64(&bytes, 0);
        assert_eq!(leading_size as usize, bytes.len() - 8);
        let trailing_size = read_u64(&bytes, bytes.len() - 24);
        assert_eq!(trailing_size, leading_size);

        // Exactly one ID-value pair, carrying the v2 scheme.
        let pair_length = read_u64(&bytes, 8);
        assert_eq!(read_u32(&bytes, 16), 0x7109871A);
        assert_eq!(8 + 8 + pair_length as usize + 8 + 16, bytes.len());
    }
}

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
    crypto_keys::{Keys, PrivateKey},
    hasher::Sha256Hash,
    signing_types::{
        len_pfx_u32, len_pfx_u64, ApkSigningBlock, Digest, Signature, SignatureAlgorithmId,
        SignatureSchemeV2Block, SignedData, Signer, SigningBlockIdValuePair, SigningBlockPairs,
    },
};
use deku::DekuContainerWrite;
use stitch_common::Result;

/// The v2 algorithm identifier matching the identity's key type.
pub fn algorithm_for(keys: &Keys) -> SignatureAlgorithmId {
    match keys.private_key {
        PrivateKey::Rsa(_) => SignatureAlgorithmId::RsaSsaPkcs1v1_5WithSha2_256,
        PrivateKey::EcdsaP256(_) => SignatureAlgorithmId::EcdsaWithSha2_256,
    }
}

// Constructs the Signed Data block for the V2 Scheme
// This is the data that gets signed by the crypto module
// It does not, itself, contain a cryptographic signature
impl SignedData {
    pub fn new(top_level_hash: Sha256Hash, keys: &Keys) -> SignedData {
        SignedData {
            digests: len_pfx_u32(vec![len_pfx_u32(Digest {
                digest: len_pfx_u32(top_level_hash),
                signature_algorithm_id: algorithm_for(keys),
            })]),
            certificates: len_pfx_u32(vec![len_pfx_u32(keys.certificate.clone())]),
            additional_attributes: 0,
        }
    }
}

impl SignatureSchemeV2Block {
    pub fn new(
        signed_data: SignedData,
        signature: Vec<u8>,
        keys: &Keys,
    ) -> Result<SignatureSchemeV2Block> {
        Ok(SignatureSchemeV2Block {
            signers: len_pfx_u32(vec![len_pfx_u32(Signer {
                signed_data: len_pfx_u32(signed_data),
                signatures: len_pfx_u32(vec![len_pfx_u32(Signature {
                    signature_algorithm_id: algorithm_for(keys),
                    signature: len_pfx_u32(signature),
                })]),
                public_key: len_pfx_u32(keys.pub_key_as_der()?),
            })]),
        })
    }
}

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

impl ApkSigningBlock {
    pub fn new(v2_sig_block: SignatureSchemeV2Block) -> Result<ApkSigningBlock> {
        let pairs = SigningBlockPairs {
            pairs: vec![len_pfx_u64(SigningBlockIdValuePair {
                id: SIGNATURE_SCHEME_V2_BLOCK_ID,
                value: v2_sig_block.to_bytes()?,
            })],
        };

        let pairs_length = pairs.to_bytes()?.len();
        // Plus size_of_self_counted plus magic
        let sig_block_size = (pairs_length + 8 + 16) as u64;

        Ok(ApkSigningBlock {
            size_of_self_not_counted: sig_block_size,
            pairs,
            size_of_self_counted: sig_block_size,
            magic: *APK_SIGNING_BLOCK_MAGIC,
        })
    }
}

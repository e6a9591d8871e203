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

//! Most of this crate is concerned with APK Signature Scheme v2, but this
//! module handles Signature Scheme v1, aka. Signed JAR File format: a
//! manifest of per-entry digests, a signature file digesting the manifest,
//! and a PKCS#7 signature block over the signature file, all inserted as
//! STORE entries under `META-INF/` so their on-disk bytes are exactly the
//! signed bytes.

use std::collections::BTreeMap;
use std::io;

use base64::{prelude::BASE64_STANDARD, Engine};
use rasn::types::Integer::Primitive;
use rasn::types::Oid;
use rasn::{Decode, Encode};
use rasn_cms::algorithms::RSA;
use rasn_cms::ContentInfo;
use rasn_cms::{
    pkcs7_compat::SignedData, Certificate, CertificateChoices, IssuerAndSerialNumber,
    SignerIdentifier, SignerInfo,
};
use sha2::{Digest, Sha256};
use stitch_common::Result;
use stitch_zip::{Backing, Compression, ZipArchive};

use crate::crypto_keys::{Keys, PrivateKey};

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
pub const SIGNATURE_FILE_NAME: &str = "META-INF/CERT.SF";
pub const SIGNATURE_BLOCK_NAME: &str = "META-INF/CERT.RSA";

const CREATED_BY: &str = "1.0 (stitch)";

const OID_SHA256: &Oid =
    rasn::types::Oid::JOINT_ISO_ITU_T_COUNTRY_US_ORGANIZATION_GOV_CSOR_NIST_ALGORITHMS_HASH_SHA256;
const OID_PKCS7_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
const OID_PKCS7_SIGNED_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;
const OID_ECDSA_WITH_SHA256: &Oid = Oid::const_new(&[1, 2, 840, 10045, 4, 3, 2]);

/// Builds and inserts the three v1 signature entries.
///
/// Entries under `META-INF/` are never listed in the manifest. Digests found
/// in `existing_hashes` (recovered from the manifest the archive was opened
/// with) are reused; everything else is rehashed from the entry bytes. When
/// the regenerated files match the ones already present byte for byte, the
/// archive is left untouched, which keeps re-signing an unmodified archive
/// byte-stable.
pub fn add_v1_signature_files<S: Backing>(
    archive: &mut ZipArchive<S>,
    keys: &Keys,
    existing_hashes: &BTreeMap<String, String>,
) -> Result<()> {
    let names: Vec<String> = archive
        .entry_names()
        .filter(|name| !name.starts_with("META-INF/"))
        .map(str::to_owned)
        .collect();

    let mut digests = BTreeMap::new();
    for name in names {
        let digest = match existing_hashes.get(&name) {
            Some(digest) => digest.clone(),
            None => digest_entry(archive, &name)?,
        };
        digests.insert(name, digest);
    }

    let manifest = create_manifest(&digests);
    let sig_file = create_signature_file(&manifest, &digests);
    let pkcs7_file = create_pkcs7_file(sig_file.as_bytes(), keys)?;

    if entry_equals(archive, MANIFEST_NAME, manifest.as_bytes())?
        && entry_equals(archive, SIGNATURE_FILE_NAME, sig_file.as_bytes())?
        && entry_equals(archive, SIGNATURE_BLOCK_NAME, &pkcs7_file)?
    {
        return Ok(());
    }

    archive.add_file(MANIFEST_NAME, manifest.as_bytes(), Compression::Store)?;
    archive.add_file(SIGNATURE_FILE_NAME, sig_file.as_bytes(), Compression::Store)?;
    archive.add_file(
        SIGNATURE_BLOCK_NAME,
        pkcs7_file.as_slice(),
        Compression::Store,
    )?;
    Ok(())
}

/// Recovers the per-entry digests from an existing `META-INF/MANIFEST.MF`,
/// so that a later re-sign can skip rehashing untouched entries. A missing
/// manifest yields an empty map.
pub fn collect_existing_hashes<S: Backing>(
    archive: &mut ZipArchive<S>,
) -> Result<BTreeMap<String, String>> {
    if !archive.contains_file(MANIFEST_NAME) {
        return Ok(BTreeMap::new());
    }
    let bytes = archive.read_file(MANIFEST_NAME)?;
    Ok(parse_manifest_digests(&String::from_utf8_lossy(&bytes)))
}

// RFC 822-style blocks separated by blank lines; a line starting with a
// space continues the previous one. Digest keys other than SHA-256-Digest
// are ignored, which forces those entries to be rehashed.
fn parse_manifest_digests(manifest: &str) -> BTreeMap<String, String> {
    let mut unfolded: Vec<String> = Vec::new();
    for line in manifest.lines() {
        match line.strip_prefix(' ') {
            Some(continuation) => {
                if let Some(last) = unfolded.last_mut() {
                    last.push_str(continuation);
                }
            }
            None => unfolded.push(line.to_owned()),
        }
    }

    let mut digests = BTreeMap::new();
    let mut current_name: Option<String> = None;
    for line in &unfolded {
        if line.is_empty() {
            current_name = None;
        } else if let Some(name) = line.strip_prefix("Name: ") {
            current_name = Some(name.to_owned());
        } else if let Some(digest) = line.strip_prefix("SHA-256-Digest: ") {
            if let Some(name) = current_name.take() {
                digests.insert(name, digest.to_owned());
            }
        }
    }
    digests
}

fn digest_entry<S: Backing>(archive: &mut ZipArchive<S>, name: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut reader = archive.open_reader(name)?;
    io::copy(&mut reader, &mut hasher)?;
    Ok(BASE64_STANDARD.encode(hasher.finalize()))
}

fn entry_equals<S: Backing>(
    archive: &mut ZipArchive<S>,
    name: &str,
    expected: &[u8],
) -> Result<bool> {
    if !archive.contains_file(name) {
        return Ok(false);
    }
    Ok(archive.read_file(name)? == expected)
}

// Also used in the generation of CERT.SF
fn manifest_entry(name: &str, digest: &str) -> String {
    format!("Name: {name}\r\nSHA-256-Digest: {digest}\r\n\r\n")
}

fn create_manifest(digests: &BTreeMap<String, String>) -> String {
    let mut output = format!("Manifest-Version: 1.0\r\nCreated-By: {CREATED_BY}\r\n\r\n");
    for (name, digest) in digests {
        output.push_str(&manifest_entry(name, digest));
    }
    output
}

fn create_signature_file(manifest: &str, digests: &BTreeMap<String, String>) -> String {
    let manifest_digest = b64_digest(manifest);
    let mut output = format!(
        "Signature-Version: 1.0\r\nCreated-By: {CREATED_BY}\r\nSHA-256-Digest-Manifest: {manifest_digest}\r\n\r\n"
    );
    // Each entry's digest here covers its whole manifest block, trailing
    // blank line included.
    for (name, digest) in digests {
        let block_digest = b64_digest(manifest_entry(name, digest));
        output.push_str(&format!(
            "Name: {name}\r\nSHA-256-Digest: {block_digest}\r\n\r\n"
        ));
    }
    output
}

fn b64_digest(input: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(input);
    BASE64_STANDARD.encode(digest)
}

fn create_pkcs7_file(sig_file: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let signature = keys.sign(sig_file)?;

    let cert = Certificate::decode(&mut rasn::ber::de::Decoder::new(
        &keys.certificate,
        rasn::ber::de::DecoderOptions::der(),
    ))?;

    let signature_algorithm = match &keys.private_key {
        PrivateKey::Rsa(_) => RSA.into(),
        PrivateKey::EcdsaP256(_) => OID_ECDSA_WITH_SHA256.into(),
    };

    let signer_info = SignerInfo {
        version: Primitive(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }),
        digest_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None,
        },
        signed_attrs: None,
        signature_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: signature_algorithm,
            parameters: None,
        },
        signature: signature.into(),
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: Primitive(1),
        digest_algorithms: vec![rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None,
        }]
        .into(),
        encap_content_info: rasn_cms::pkcs7_compat::EncapsulatedContentInfo {
            content_type: OID_PKCS7_DATA.into(),
            content: None,
        },
        certificates: Some(vec![CertificateChoices::Certificate(Box::new(cert))].into()),
        crls: None,
        signer_infos: vec![signer_info].into(),
    };

    let mut inner_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    signed_data.encode(&mut inner_encoder)?;
    let inner_vec = inner_encoder.output();

    let wrapper = ContentInfo {
        content_type: OID_PKCS7_SIGNED_DATA.into(),
        content: rasn::types::Any::new(inner_vec.clone()),
    };

    let mut outer_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    wrapper.encode(&mut outer_encoder)?;

    Ok(outer_encoder.output())
}

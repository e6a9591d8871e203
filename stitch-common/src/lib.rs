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

use std::{io, rc::Rc};

use deku::prelude::*;
use rsa::pkcs8;

/// Common error type making it easier to share `Result`s between STITCH crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum StitchError {
    /// The backing stream lacks a capability the archive needs. Most commonly
    /// this means the stream is not seekable (for example a pipe passed where
    /// a regular file was expected).
    StreamUnsuitable(&'static str),
    /// The archive is not a valid ZIP: no End Of Central Directory record was
    /// found, a record was truncated, or an entry name was empty or appeared
    /// twice after normalization.
    BadFormat(String),
    /// The archive is a valid ZIP but uses a feature outside this
    /// implementation's scope: a version-needed above 2.0, ZIP64 sizes or
    /// markers, a split archive, an unknown compression method, or an entry
    /// larger than 4 GiB.
    Unsupported(String),
    /// The queried entry does not exist in the archive.
    NotFound(String),
    /// A mutation was attempted through a read-only backing stream.
    ReadOnly,
    /// An operation was attempted on a handle that has already been closed.
    Disposed,
    /// The `.pem` text passed as a signing identity could not be parsed.
    PemParsingFailed(Rc<pem::PemError>),
    /// The `.pem` text was valid, but it was missing either a `CERTIFICATE`
    /// section or a usable `PRIVATE KEY` section.
    MissingKeyMaterial,
    /// The `PRIVATE KEY` section was present but was neither an RSA nor an
    /// ECDSA P-256 key in PKCS#8 form.
    PrivateKeyParsingFailed(pkcs8::Error),
    /// The signing certificate couldn't be decoded for PKCS#7 signing.
    CertificateDecodingFailed(Rc<rasn::error::DecodeError>),
    /// The PKCS#7 SignedData structure couldn't be serialised.
    Pkcs7EncodingFailed(Rc<rasn::error::EncodeError>),
    /// An error occurred while signing a digest, see [rsa::Error].
    SigningFailed(Rc<rsa::Error>),
    /// An error occurred while serialising a public key, see
    /// [pkcs8::spki::Error].
    KeySerialisationFailed(pkcs8::spki::Error),
    /// The APK Signing Block structures couldn't be serialised. See
    /// [DekuError].
    BlockSerialisationFailed(DekuError),
    /// An error occurred while reading or writing the backing stream.
    Io(Rc<io::Error>),
}

/// Result type where the error is always [StitchError].
pub type Result<T> = std::result::Result<T, StitchError>;

// Automatic conversion from other types of error to StitchError makes the rest
// of the code cleaner
impl From<io::Error> for StitchError {
    fn from(value: io::Error) -> Self {
        StitchError::Io(value.into())
    }
}

impl From<pem::PemError> for StitchError {
    fn from(value: pem::PemError) -> Self {
        StitchError::PemParsingFailed(value.into())
    }
}

impl From<pkcs8::Error> for StitchError {
    fn from(value: pkcs8::Error) -> Self {
        StitchError::PrivateKeyParsingFailed(value)
    }
}

impl From<rasn::error::DecodeError> for StitchError {
    fn from(value: rasn::error::DecodeError) -> Self {
        StitchError::CertificateDecodingFailed(value.into())
    }
}

impl From<rasn::error::EncodeError> for StitchError {
    fn from(value: rasn::error::EncodeError) -> Self {
        StitchError::Pkcs7EncodingFailed(value.into())
    }
}

impl From<rsa::Error> for StitchError {
    fn from(value: rsa::Error) -> Self {
        StitchError::SigningFailed(value.into())
    }
}

impl From<pkcs8::spki::Error> for StitchError {
    fn from(value: pkcs8::spki::Error) -> Self {
        StitchError::KeySerialisationFailed(value)
    }
}

impl From<DekuError> for StitchError {
    fn from(value: DekuError) -> Self {
        StitchError::BlockSerialisationFailed(value)
    }
}

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

use crate::crypto_keys::Keys;
use deku::DekuContainerWrite;
use stitch_common::Result;

pub fn get_signature_for_signed_data<T: DekuContainerWrite>(
    signed_data: &T,
    keys: &Keys,
) -> Result<Vec<u8>> {
    keys.sign(&signed_data.to_bytes()?)
}

// Copyright 2019-2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::ctap::data_formats::CoseKey;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("credential ID was already returned for another credential")]
    DuplicateCredentialId,
    #[error("public key was already returned for another credential")]
    DuplicatePublicKey,
    #[error("credential public key is not a valid ES256 key")]
    InvalidPublicKey,
    #[error("assertion for a credential that was never created")]
    UnknownCredential,
    #[error("assertion signature does not verify with the credential public key")]
    InvalidSignature,
    #[error("signature counter did not increase from {previous} to {current}")]
    CounterNotIncreasing { previous: u32, current: u32 },
}

/// Checks credentials and the assertions made with them.
pub trait CredentialValidator {
    /// Remembers the public key of a newly created credential.
    fn register_credential(
        &mut self,
        credential_id: &[u8],
        public_key: &CoseKey,
    ) -> Result<(), ValidationError>;

    /// Verifies an assertion signature over authenticator data and client data hash.
    fn verify_assertion(
        &mut self,
        credential_id: &[u8],
        signed_data: &[u8],
        signature: &[u8],
    ) -> Result<(), ValidationError>;
}

/// Checks signature counters over the whole run.
pub trait CounterValidator {
    fn register_counter(
        &mut self,
        credential_id: &[u8],
        sign_count: u32,
    ) -> Result<(), ValidationError>;

    /// Describes the counter behavior seen so far, if any counter was seen.
    fn finding(&self) -> Option<&'static str>;
}

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

//! Validators for credentials and signature counters, shared by all test series.

use crate::api::validator::{CounterValidator, CredentialValidator, ValidationError};
use crate::ctap::data_formats::CoseKey;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};

/// Remembers the public key of every credential, and verifies assertions against it.
#[derive(Default)]
pub struct KeyChecker {
    public_keys: BTreeMap<Vec<u8>, VerifyingKey>,
}

impl KeyChecker {
    pub fn new() -> Self {
        KeyChecker::default()
    }

    pub fn num_credentials(&self) -> usize {
        self.public_keys.len()
    }
}

impl CredentialValidator for KeyChecker {
    fn register_credential(
        &mut self,
        credential_id: &[u8],
        public_key: &CoseKey,
    ) -> Result<(), ValidationError> {
        if self.public_keys.contains_key(credential_id) {
            return Err(ValidationError::DuplicateCredentialId);
        }
        let verifying_key = public_key
            .to_verifying_key()
            .map_err(|_| ValidationError::InvalidPublicKey)?;
        if self.public_keys.values().any(|key| *key == verifying_key) {
            return Err(ValidationError::DuplicatePublicKey);
        }
        self.public_keys
            .insert(credential_id.to_vec(), verifying_key);
        Ok(())
    }

    fn verify_assertion(
        &mut self,
        credential_id: &[u8],
        signed_data: &[u8],
        signature: &[u8],
    ) -> Result<(), ValidationError> {
        let verifying_key = self
            .public_keys
            .get(credential_id)
            .ok_or(ValidationError::UnknownCredential)?;
        let signature =
            Signature::from_der(signature).map_err(|_| ValidationError::InvalidSignature)?;
        verifying_key
            .verify(signed_data, &signature)
            .map_err(|_| ValidationError::InvalidSignature)
    }
}

/// Checks that signature counters strictly increase per credential.
///
/// A counter that stays at 0 means the authenticator doesn't implement counters, which is allowed.
pub struct CounterChecker {
    counters: BTreeMap<Vec<u8>, u32>,
    last_counter: Option<u32>,
    is_global: bool,
    all_zero: bool,
}

impl CounterChecker {
    pub fn new() -> Self {
        CounterChecker {
            counters: BTreeMap::new(),
            last_counter: None,
            is_global: true,
            all_zero: true,
        }
    }
}

impl Default for CounterChecker {
    fn default() -> Self {
        CounterChecker::new()
    }
}

impl CounterValidator for CounterChecker {
    fn register_counter(
        &mut self,
        credential_id: &[u8],
        sign_count: u32,
    ) -> Result<(), ValidationError> {
        if let Some(&previous) = self.counters.get(credential_id) {
            if sign_count <= previous && !(previous == 0 && sign_count == 0) {
                return Err(ValidationError::CounterNotIncreasing {
                    previous,
                    current: sign_count,
                });
            }
        }
        if let Some(last_counter) = self.last_counter {
            if sign_count <= last_counter {
                self.is_global = false;
            }
        }
        self.all_zero &= sign_count == 0;
        self.last_counter = Some(sign_count);
        self.counters.insert(credential_id.to_vec(), sign_count);
        Ok(())
    }

    fn finding(&self) -> Option<&'static str> {
        if self.last_counter.is_none() {
            return None;
        }
        Some(if self.all_zero {
            "All counters were constant zero."
        } else if self.is_global {
            "The signature counter is global and strictly increasing."
        } else {
            "Signature counters are strictly increasing per credential."
        })
    }
}

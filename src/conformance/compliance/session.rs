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

//! The platform side of PIN protocol version 1.

use crate::ctap::data_formats::CoseKey;
use crate::ctap::pin_protocol::{KeyAgreementKey, SharedSecret};
use alloc::vec::Vec;
use zeroize::Zeroizing;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinSessionState {
    NoAgreement,
    Agreed,
    PinEstablished,
    TokenHeld,
}

struct KeyAgreement {
    platform_key: CoseKey,
    shared_secret: SharedSecret,
}

/// What the platform knows about the PIN state of the device.
///
/// The PIN survives a power cycle, key agreement and token do not. A token is dropped with the
/// key agreement it was obtained under.
pub struct PinSession {
    key_agreement: Option<KeyAgreement>,
    pin: Option<Zeroizing<Vec<u8>>>,
    auth_token: Option<Zeroizing<Vec<u8>>>,
}

impl Default for PinSession {
    fn default() -> Self {
        PinSession::new()
    }
}

impl PinSession {
    pub fn new() -> Self {
        PinSession {
            key_agreement: None,
            pin: None,
            auth_token: None,
        }
    }

    pub fn state(&self) -> PinSessionState {
        match (&self.key_agreement, &self.pin, &self.auth_token) {
            (None, _, _) => PinSessionState::NoAgreement,
            (Some(_), _, Some(_)) => PinSessionState::TokenHeld,
            (Some(_), Some(_), None) => PinSessionState::PinEstablished,
            (Some(_), None, None) => PinSessionState::Agreed,
        }
    }

    /// Stores a completed key agreement. A previous token is dropped.
    pub fn agree(&mut self, platform_key: &KeyAgreementKey, shared_secret: SharedSecret) {
        self.key_agreement = Some(KeyAgreement {
            platform_key: platform_key.public_key(),
            shared_secret,
        });
        self.auth_token = None;
    }

    pub fn platform_key(&self) -> Option<&CoseKey> {
        self.key_agreement
            .as_ref()
            .map(|agreement| &agreement.platform_key)
    }

    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.key_agreement
            .as_ref()
            .map(|agreement| &agreement.shared_secret)
    }

    pub fn pin(&self) -> Option<&[u8]> {
        self.pin.as_ref().map(|pin| pin.as_slice())
    }

    pub fn set_pin(&mut self, pin: Vec<u8>) {
        self.pin = Some(Zeroizing::new(pin));
    }

    pub fn auth_token(&self) -> Option<&[u8]> {
        self.auth_token.as_ref().map(|token| token.as_slice())
    }

    /// Stores a token. Without a key agreement, there is nothing the token could be valid for.
    pub fn set_auth_token(&mut self, auth_token: Vec<u8>) {
        if self.key_agreement.is_some() {
            self.auth_token = Some(Zeroizing::new(auth_token));
        }
    }

    pub fn clear_auth_token(&mut self) {
        self.auth_token = None;
    }

    /// The device reported a failed PIN check and regenerated its key.
    pub fn forget_key_agreement(&mut self) {
        self.key_agreement = None;
        self.auth_token = None;
    }

    pub fn power_cycle(&mut self) {
        self.forget_key_agreement();
    }

    pub fn reset(&mut self) {
        self.forget_key_agreement();
        self.pin = None;
    }
}

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

use super::session::PinSessionState;
use super::ProtocolComplianceEngine;
use crate::api::customization::{Customization, KNOWN_WRONG_PIN};
use crate::conformance::commands::{
    client_pin_positive, make_credential_positive, template_negative,
};
use crate::conformance::error::ConformanceError;
use crate::conformance::Harness;
use crate::ctap::data_formats::{ClientPinResponse, ClientPinSubCommand, CoseKey};
use crate::ctap::pin_protocol::{pad_pin, pin_hash, KeyAgreementKey, SharedSecret};
use crate::ctap::status_code::Ctap2StatusCode;
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::TryFrom;
use tracing::{info, warn};

const AES_BLOCK_SIZE: usize = 16;

fn check_padded_pin(padded_pin: &[u8]) -> Result<(), ConformanceError> {
    if padded_pin.len() % AES_BLOCK_SIZE != 0 {
        return Err(ConformanceError::suite_bug(
            "the padded PIN is not made of AES blocks",
        ));
    }
    Ok(())
}

impl ProtocolComplianceEngine {
    /// Checks a PIN before it is sent. A PIN of the wrong length is counted as a failed test.
    ///
    /// Returns whether the PIN can be used.
    fn check_new_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        new_pin: &[u8],
    ) -> Result<bool, ConformanceError> {
        if new_pin == KNOWN_WRONG_PIN {
            return Err(ConformanceError::suite_bug(
                "new PIN must be different from the known wrong PIN",
            ));
        }
        let customization = harness.env.customization();
        if new_pin.len() < customization.min_pin_length()
            || new_pin.len() > customization.max_pin_length()
        {
            self.tracker.check_condition(
                false,
                &format!("new PIN of length {} fulfills the PIN requirements", new_pin.len()),
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn key_agreement(&self) -> Result<(&CoseKey, &SharedSecret), ConformanceError> {
        match (self.session.platform_key(), self.session.shared_secret()) {
            (Some(platform_key), Some(shared_secret)) => Ok((platform_key, shared_secret)),
            _ => Err(ConformanceError::critical(
                "agree on a shared secret for the PIN protocol",
                None,
            )),
        }
    }

    fn known_pin(&self) -> Result<Vec<u8>, ConformanceError> {
        self.session
            .pin()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ConformanceError::suite_bug("the PIN is used before it is set"))
    }

    fn set_pin_template(&self, padded_pin: &[u8]) -> Result<CommandTemplate, ConformanceError> {
        let (platform_key, shared_secret) = self.key_agreement()?;
        let new_pin_enc = shared_secret.encrypt(padded_pin)?;
        let pin_auth = shared_secret.authenticate(&new_pin_enc)?;
        Ok(CommandTemplate::client_pin_set_pin(
            platform_key.clone(),
            pin_auth,
            new_pin_enc,
        ))
    }

    fn change_pin_template(&self, padded_pin: &[u8]) -> Result<CommandTemplate, ConformanceError> {
        let current_pin = self.known_pin()?;
        let (platform_key, shared_secret) = self.key_agreement()?;
        let pin_hash_enc = shared_secret.encrypt(&pin_hash(&current_pin))?;
        let new_pin_enc = shared_secret.encrypt(padded_pin)?;
        let mut auth_message = new_pin_enc.clone();
        auth_message.extend_from_slice(&pin_hash_enc);
        let pin_auth = shared_secret.authenticate(&auth_message)?;
        Ok(CommandTemplate::client_pin_change_pin(
            platform_key.clone(),
            pin_auth,
            new_pin_enc,
            pin_hash_enc,
        ))
    }

    fn get_pin_token_template(&self, pin: &[u8]) -> Result<CommandTemplate, ConformanceError> {
        let (platform_key, shared_secret) = self.key_agreement()?;
        let pin_hash_enc = shared_secret.encrypt(&pin_hash(pin))?;
        Ok(CommandTemplate::client_pin_get_pin_token(
            platform_key.clone(),
            pin_hash_enc,
        ))
    }

    /// Performs a key agreement with the device and stores the shared secret.
    ///
    /// Does nothing if the session already has a shared secret. A failed key agreement is
    /// counted, and leaves the session without agreement.
    pub fn compute_shared_secret<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        if self.session.state() != PinSessionState::NoAgreement {
            return Ok(());
        }
        let template = CommandTemplate::client_pin(ClientPinSubCommand::GetKeyAgreement);
        let outcome = client_pin_positive(harness, &template);
        if !self
            .tracker
            .check_response(&outcome, "performing key agreement")
        {
            warn!("Since key agreement failed, the next tests might be affected.");
            return Ok(());
        }
        let device_key = outcome
            .ok()
            .and_then(|response| ClientPinResponse::try_from(response).ok())
            .and_then(|response| response.key_agreement)
            .ok_or_else(|| ConformanceError::critical("extract the key agreement key", None))?;
        let platform_key = KeyAgreementKey::random(harness.env.rng());
        let shared_secret = platform_key.decapsulate(&device_key).map_err(|status| {
            ConformanceError::critical("complete the key agreement", Some(status))
        })?;
        self.session.agree(&platform_key, shared_secret);
        Ok(())
    }

    /// Replaces the shared secret, after the device regenerated its key.
    fn redo_key_agreement<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        self.session.forget_key_agreement();
        self.compute_shared_secret(harness)
    }

    /// Sets the PIN, unless a PIN is already set.
    pub fn set_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        new_pin: &[u8],
    ) -> Result<(), ConformanceError> {
        self.compute_shared_secret(harness)?;
        if self.session.pin().is_some() {
            return Ok(());
        }
        if !self.check_new_pin(harness, new_pin)? {
            return Ok(());
        }
        let padded_length = harness.env.customization().pin_padded_length();
        let template = self.set_pin_template(&pad_pin(new_pin, padded_length))?;
        let outcome = client_pin_positive(harness, &template);
        self.tracker.assert_response(outcome, "set PIN")?;
        self.session.set_pin(new_pin.to_vec());
        info!("The new PIN is {}", String::from_utf8_lossy(new_pin));
        Ok(())
    }

    pub fn set_default_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let default_pin = harness.env.customization().default_pin().to_vec();
        self.set_pin(harness, &default_pin)
    }

    /// Tries to set an already padded PIN and returns the status.
    pub fn attempt_set_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        new_padded_pin: &[u8],
    ) -> Result<Ctap2StatusCode, ConformanceError> {
        check_padded_pin(new_padded_pin)?;
        self.compute_shared_secret(harness)?;
        let template = self.set_pin_template(new_padded_pin)?;
        Ok(template_negative(harness, &mut self.tracker, &template, false))
    }

    /// Changes the PIN, after setting the default PIN if none is set.
    pub fn change_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        new_pin: &[u8],
    ) -> Result<(), ConformanceError> {
        self.set_default_pin(harness)?;
        if !self.check_new_pin(harness, new_pin)? {
            return Ok(());
        }
        let padded_length = harness.env.customization().pin_padded_length();
        let template = self.change_pin_template(&pad_pin(new_pin, padded_length))?;
        let outcome = client_pin_positive(harness, &template);
        self.tracker.assert_response(outcome, "change PIN")?;
        self.session.set_pin(new_pin.to_vec());
        // The device invalidates its token with the old PIN.
        self.session.clear_auth_token();
        info!("The changed PIN is {}", String::from_utf8_lossy(new_pin));
        Ok(())
    }

    /// Tries to change to an already padded PIN and returns the status.
    pub fn attempt_change_pin<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        new_padded_pin: &[u8],
    ) -> Result<Ctap2StatusCode, ConformanceError> {
        check_padded_pin(new_padded_pin)?;
        self.set_default_pin(harness)?;
        let template = self.change_pin_template(new_padded_pin)?;
        let status = template_negative(harness, &mut self.tracker, &template, false);
        // Failed PIN checks regenerate the device key.
        self.redo_key_agreement(harness)?;
        Ok(status)
    }

    /// Gets a PIN token and stores it, after setting the default PIN if none is set.
    pub fn get_auth_token<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        self.set_default_pin(harness)?;
        let pin = self.known_pin()?;
        let template = self.get_pin_token_template(&pin)?;
        let outcome = client_pin_positive(harness, &template);
        let response = self
            .tracker
            .assert_response(outcome, "getting PIN auth token")?;
        let pin_token_enc = ClientPinResponse::try_from(response)
            .ok()
            .and_then(|response| response.pin_token)
            .ok_or_else(|| ConformanceError::critical("extract the encrypted PIN token", None))?;
        let auth_token = self
            .key_agreement()?
            .1
            .decrypt(&pin_token_enc)
            .map_err(|status| ConformanceError::critical("decrypt the PIN token", Some(status)))?;
        self.session.set_auth_token(auth_token);
        Ok(())
    }

    /// Tries to get a PIN token with the given PIN and returns the status.
    ///
    /// Unless `redo_key_agreement` is false, a new key agreement follows, since the device
    /// regenerates its key after a wrong PIN.
    pub fn attempt_get_auth_token<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        pin: &[u8],
        redo_key_agreement: bool,
    ) -> Result<Ctap2StatusCode, ConformanceError> {
        self.set_default_pin(harness)?;
        let template = self.get_pin_token_template(pin)?;
        let status = template_negative(harness, &mut self.tracker, &template, false);
        if redo_key_agreement {
            self.redo_key_agreement(harness)?;
        }
        Ok(status)
    }

    /// Checks that the known PIN is the PIN of the device.
    pub fn check_pin_by_get_auth_token<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let pin = self.known_pin()?;
        self.compute_shared_secret(harness)?;
        let template = self.get_pin_token_template(&pin)?;
        let outcome = client_pin_positive(harness, &template);
        self.tracker
            .check_response(&outcome, "PIN was usable for getting an auth token");
        self.redo_key_agreement(harness)
    }

    /// Checks that no PIN is set, since MakeCredential would require it otherwise.
    pub fn check_pin_absence_by_make_credential<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let template = CommandTemplate::make_credential("pin_absence.example.com");
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "no PIN is set, no UV required in MakeCredential");
        Ok(())
    }

    /// Returns the PIN retries counter. A blocked request counts as 0.
    pub fn get_pin_retries<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<u64, ConformanceError> {
        let template = CommandTemplate::client_pin(ClientPinSubCommand::GetPinRetries);
        let outcome = client_pin_positive(harness, &template);
        if outcome == Err(Ctap2StatusCode::CTAP2_ERR_PIN_BLOCKED) {
            harness.device_tracker.add_observation(
                "getPinRetries was blocked instead of returning 0. \
                 This is neither explicitly allowed nor forbidden.",
            );
            return Ok(0);
        }
        let response = self
            .tracker
            .assert_response(outcome, "get the PIN retries counter")?;
        ClientPinResponse::try_from(response)
            .ok()
            .and_then(|response| response.retries)
            .ok_or_else(|| ConformanceError::critical("extract the PIN retries counter", None))
    }

    pub fn client_pin_requirements_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let padded_length = harness.env.customization().pin_padded_length();
        let maximum_pin = vec![0x30; harness.env.customization().max_pin_length()];
        let invalid_pins = [
            (pad_pin(b"123", padded_length), "a PIN of length < 4"),
            (vec![0x30; padded_length], "a PIN of length > 63"),
            (pad_pin(b"1234", 32), "a PIN padding of length 32"),
            (pad_pin(b"1234", 128), "a PIN padding of length 128"),
        ];

        for (padded_pin, description) in invalid_pins.iter() {
            let status = self.attempt_set_pin(harness, padded_pin)?;
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION,
                status,
                &format!("reject to set {}", description),
            );
            self.check_pin_absence_by_make_credential(harness)?;
            if status == Ctap2StatusCode::CTAP2_OK {
                self.reset(harness)?;
            }
        }

        // The device may enforce a longer minimum, so only the maximum is used.
        self.set_pin(harness, &maximum_pin)?;
        self.check_pin_by_get_auth_token(harness)?;

        for (padded_pin, description) in invalid_pins.iter() {
            let status = self.attempt_change_pin(harness, padded_pin)?;
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION,
                status,
                &format!("reject to change to {}", description),
            );
            self.check_pin_by_get_auth_token(harness)?;
            if status == Ctap2StatusCode::CTAP2_OK {
                self.reset(harness)?;
            }
        }

        self.change_pin(harness, &maximum_pin)?;
        self.check_pin_by_get_auth_token(harness)
    }

    pub fn client_pin_retries_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let max_pin_retries = u64::from(harness.env.customization().max_pin_retries());
        let wrong_pins_before_power_cycle =
            u64::from(harness.env.customization().wrong_pins_before_power_cycle());

        let initial_counter = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            initial_counter <= max_pin_retries,
            &format!(
                "maximum PIN retries holds the upper limit of {}",
                max_pin_retries
            ),
        );
        self.tracker
            .check_condition(initial_counter > 0, "maximum PIN retries is positive");
        let retries = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            retries == initial_counter,
            "PIN retries stay the same between subsequent calls",
        );

        let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
        self.tracker
            .check_status(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID, status, "reject wrong PIN");
        let retries = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            retries == initial_counter.saturating_sub(1),
            "PIN retries decrement after a failed attempt",
        );

        self.get_auth_token(harness)?;
        let retries = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            retries == initial_counter,
            "PIN retries reset on entering the correct PIN",
        );

        if initial_counter > wrong_pins_before_power_cycle {
            for _ in 1..wrong_pins_before_power_cycle {
                let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
                self.tracker.check_status(
                    Ctap2StatusCode::CTAP2_ERR_PIN_INVALID,
                    status,
                    "reject wrong PIN",
                );
            }
            let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED,
                status,
                "reject PIN before power cycle",
            );
            let retries = self.get_pin_retries(harness)?;
            self.tracker.check_condition(
                retries == initial_counter - wrong_pins_before_power_cycle,
                "PIN retry counter decremented until blocked",
            );
            let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED,
                status,
                "reject PIN before power cycle",
            );
            let retries = self.get_pin_retries(harness)?;
            self.tracker.check_condition(
                retries == initial_counter - wrong_pins_before_power_cycle,
                "PIN retry counter does not decrement in a blocked operation",
            );
            self.prompt_replug_and_init(harness)?;
            self.get_auth_token(harness)?;
            let retries = self.get_pin_retries(harness)?;
            self.tracker.check_condition(
                retries == initial_counter,
                "PIN retries reset on entering the correct PIN",
            );
        } else {
            info!(
                "The tests for the power cycle requirement after {} consecutive wrong PINs are \
                 skipped, because there are at most that many retries anyway.",
                wrong_pins_before_power_cycle
            );
        }

        // Reuses the old key material, which the device must have replaced after the mismatch.
        let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, false)?;
        self.tracker
            .check_status(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID, status, "reject wrong PIN");
        let pin = self.known_pin()?;
        let status = self.attempt_get_auth_token(harness, &pin, true)?;
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_PIN_INVALID,
            status,
            "reject even the correct PIN if shared secrets do not match",
        );
        self.prompt_replug_and_init(harness)?;

        let remaining_retries = self.get_pin_retries(harness)?;
        for i in 0..remaining_retries.saturating_sub(1) {
            let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
            if (i + 1) % wrong_pins_before_power_cycle != 0 {
                self.tracker.check_status(
                    Ctap2StatusCode::CTAP2_ERR_PIN_INVALID,
                    status,
                    "reject wrong PIN",
                );
            } else {
                self.tracker.check_status(
                    Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED,
                    status,
                    "reject wrong PIN until power cycle",
                );
                self.prompt_replug_and_init(harness)?;
            }
        }
        let retries = self.get_pin_retries(harness)?;
        self.tracker
            .check_condition(retries == 1, "PIN retry counter was reduced to 1");
        let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_PIN_BLOCKED,
            status,
            "block PIN retries if the counter gets to 0",
        );
        let retries = self.get_pin_retries(harness)?;
        self.tracker
            .check_condition(retries == 0, "PIN retry counter was reduced to 0");
        let status = self.attempt_get_auth_token(harness, &pin, true)?;
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_PIN_BLOCKED,
            status,
            "reject even the correct PIN if the retry counter is 0",
        );

        self.reset(harness)
    }
}

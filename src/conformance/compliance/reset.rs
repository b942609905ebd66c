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

use super::ProtocolComplianceEngine;
use crate::api::customization::{Customization, KNOWN_WRONG_PIN};
use crate::api::device::Device;
use crate::api::prompt::Prompt;
use crate::conformance::commands::{
    get_assertion_positive, reset_positive, send_negative, template_negative,
};
use crate::conformance::error::ConformanceError;
use crate::conformance::Harness;
use crate::ctap::command::Command;
use crate::ctap::status_code::{outcome_status, Ctap2StatusCode};
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use alloc::format;
use tracing::info;

const RESET_RP_ID: &str = "reset.example.com";
const PERSISTENCE_RP_ID: &str = "persistence.example.com";

impl ProtocolComplianceEngine {
    /// Asks the operator to replug the device, and initializes the transport again.
    pub fn prompt_replug_and_init<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        self.tracker.record_manual_step("replug the device");
        harness.env.prompt().prompt_replug();
        harness.env.device().init().map_err(|status| {
            ConformanceError::critical("initialize the transport after replugging", Some(status))
        })?;
        self.session.power_cycle();
        Ok(())
    }

    /// Resets the device, replugging first to open the reset window.
    pub fn reset<E: Env>(&mut self, harness: &mut Harness<E>) -> Result<(), ConformanceError> {
        info!(
            "Reset only works within {} ms after power up, touch the device right after \
             replugging.",
            harness.env.customization().reset_window_ms()
        );
        self.prompt_replug_and_init(harness)?;
        let outcome = reset_positive(harness, &mut self.tracker);
        self.tracker.assert_response(outcome, "resetting the device")?;
        self.session.reset();
        Ok(())
    }

    pub fn reset_deletion_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let resident_id = self.make_test_credential(harness, RESET_RP_ID, true)?;
        let non_resident_id = self.make_test_credential(harness, RESET_RP_ID, false)?;
        let template = CommandTemplate::get_assertion(RESET_RP_ID);
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "get assertion before reset");
        self.reset(harness)?;

        let status = template_negative(harness, &mut self.tracker, &template, false);
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            status,
            "resident key was deleted",
        );
        for (credential_id, test_name) in [
            (resident_id, "resident key in allow list was deleted"),
            (non_resident_id, "non-resident key in allow list was deleted"),
        ]
        .iter()
        {
            let mut template = CommandTemplate::get_assertion(RESET_RP_ID);
            template.set_credential_list(credential_id.clone());
            let status = template_negative(harness, &mut self.tracker, &template, false);
            self.tracker
                .check_status(Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS, status, test_name);
        }

        self.set_default_pin(harness)?;
        let initial_retries = self.get_pin_retries(harness)?;
        self.get_auth_token(harness)?;
        let old_token = self
            .session
            .auth_token()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ConformanceError::suite_bug("no token is held after getting it"))?;
        let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
        self.tracker
            .check_status(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID, status, "reject wrong PIN");
        self.reset(harness)?;

        self.check_pin_absence_by_make_credential(harness)?;
        self.set_default_pin(harness)?;
        let retries = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            retries == initial_retries,
            "PIN retries reset on reset command",
        );
        let mut template = CommandTemplate::make_credential(RESET_RP_ID);
        template.set_default_pin_uv_auth_param(&old_token)?;
        template.set_default_pin_uv_auth_protocol();
        let status = template_negative(harness, &mut self.tracker, &template, false);
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID,
            status,
            "PIN auth was reset, token stops working",
        );
        self.reset(harness)
    }

    pub fn reset_physical_presence_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        self.prompt_replug_and_init(harness)?;
        self.prompt_no_touch(harness);
        let status = send_negative(
            harness,
            &mut self.tracker,
            Command::AuthenticatorReset,
            None,
            true,
        );
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT,
            status,
            "reset requires user presence",
        );

        let reset_window_ms = harness.env.customization().reset_window_ms();
        harness.env.prompt().wait(reset_window_ms);
        let status = outcome_status(&harness.env.device().send(Command::AuthenticatorReset, None));
        self.tracker.check_status(
            Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED,
            status,
            &format!("reset is only allowed within {} ms after power up", reset_window_ms),
        );
        Ok(())
    }

    pub fn persistence_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        self.make_test_credential(harness, PERSISTENCE_RP_ID, true)?;
        let non_resident_id = self.make_test_credential(harness, PERSISTENCE_RP_ID, false)?;
        self.prompt_replug_and_init(harness)?;

        let template = CommandTemplate::get_assertion(PERSISTENCE_RP_ID);
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "resident key persists after replug");
        let mut template = CommandTemplate::get_assertion(PERSISTENCE_RP_ID);
        template.set_credential_list(non_resident_id);
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "non-resident key persists after replug");

        self.set_default_pin(harness)?;
        let status = self.attempt_get_auth_token(harness, KNOWN_WRONG_PIN, true)?;
        self.tracker
            .check_status(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID, status, "reject wrong PIN");
        let reduced_retries = self.get_pin_retries(harness)?;
        self.prompt_replug_and_init(harness)?;
        let retries = self.get_pin_retries(harness)?;
        self.tracker.check_condition(
            retries == reduced_retries,
            "PIN retries persist after replug",
        );
        self.reset(harness)
    }
}

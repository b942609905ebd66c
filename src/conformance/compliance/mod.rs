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

//! Multi-step scenarios that check the procedures of the protocol.
//!
//! Scenarios build on each other through the device state: credentials, the PIN and the reset
//! window. The PIN state of the platform side is kept in a [`PinSession`].

mod client_pin;
mod get_assertion;
mod get_info;
mod make_credential;
mod reset;
pub mod session;

use self::session::PinSession;
use super::commands::{make_test_credential, template_negative};
use super::error::ConformanceError;
use super::tracker::{ResultTracker, Tally};
use super::Harness;
use crate::api::prompt::Prompt;
use crate::ctap::data_formats::AuthenticatorInfo;
use crate::ctap::status_code::Ctap2StatusCode;
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use alloc::vec::Vec;

pub const SERIES_NAME: &str = "Specification procedure test series";

pub struct ProtocolComplianceEngine {
    tracker: ResultTracker,
    session: PinSession,
    info: Option<AuthenticatorInfo>,
}

impl Default for ProtocolComplianceEngine {
    fn default() -> Self {
        ProtocolComplianceEngine::new()
    }
}

impl ProtocolComplianceEngine {
    pub fn new() -> Self {
        ProtocolComplianceEngine {
            tracker: ResultTracker::new(SERIES_NAME),
            session: PinSession::new(),
            info: None,
        }
    }

    pub fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    pub fn tally(&self) -> Tally {
        self.tracker.tally()
    }

    pub fn session(&self) -> &PinSession {
        &self.session
    }

    /// Creates a credential for later steps, authorized with the held token if any.
    fn make_test_credential<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        rp_id: &str,
        resident_key: bool,
    ) -> Result<Vec<u8>, ConformanceError> {
        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_rk_option(resident_key);
        if let Some(auth_token) = self.session.auth_token() {
            template.set_default_pin_uv_auth_param(auth_token)?;
            template.set_default_pin_uv_auth_protocol();
        }
        make_test_credential(harness, &mut self.tracker, &template)
    }

    /// Sends a request that should fail, and checks the status.
    fn check_rejection<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        expected: Ctap2StatusCode,
        expect_up: bool,
        test_name: &str,
    ) -> bool {
        let status = template_negative(harness, &mut self.tracker, template, expect_up);
        self.tracker.check_status(expected, status, test_name)
    }

    /// Asks the operator to not touch the device during the next command.
    fn prompt_no_touch<E: Env>(&mut self, harness: &mut Harness<E>) {
        self.tracker
            .record_manual_step("do not touch the device, even if it blinks");
        harness.env.prompt().prompt_no_touch();
    }
}

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
use crate::conformance::commands::get_assertion_positive;
use crate::conformance::error::ConformanceError;
use crate::conformance::Harness;
use crate::ctap::status_code::Ctap2StatusCode;
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use alloc::vec;
use alloc::vec::Vec;

impl ProtocolComplianceEngine {
    fn check_get_assertion<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        test_name: &str,
    ) -> Result<bool, ConformanceError> {
        let outcome = get_assertion_positive(harness, &mut self.tracker, template)?;
        Ok(self.tracker.check_response(&outcome, test_name))
    }

    pub fn get_assertion_options_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "options.example.com";
        self.make_test_credential(harness, rp_id, true)?;
        let mut template = CommandTemplate::get_assertion(rp_id);

        template.set_rk_option(false);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION,
            false,
            "reject rk set to false",
        );
        template.set_rk_option(true);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION,
            false,
            "reject rk set to true",
        );

        let accepted_options = [
            ("up", false, "accept up set to false without a touch"),
            ("up", true, "accept up set to true"),
            ("uv", false, "accept uv set to false"),
            ("unknown_option", false, "ignore unknown options"),
        ];
        for (name, value, test_name) in accepted_options.iter() {
            template.set_options(&[(*name, *value)]);
            self.check_get_assertion(harness, &template, test_name)?;
        }

        template.set_uv_option(true);
        if self.has_uv_option(harness)? {
            self.check_get_assertion(harness, &template, "accept uv set to true")?;
        } else {
            self.check_rejection(
                harness,
                &template,
                Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION,
                false,
                "reject uv set to true without built-in user verification",
            );
        }
        Ok(())
    }

    pub fn get_assertion_residential_key_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "residential.example.com";
        let template = CommandTemplate::get_assertion(rp_id);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            false,
            "no resident credential exists before creating one",
        );
        self.make_test_credential(harness, rp_id, true)?;
        self.check_get_assertion(harness, &template, "find the resident credential")?;

        let mut template = CommandTemplate::get_assertion(rp_id);
        template.set_required(1, "non-residential.example.com");
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            false,
            "no credential exists for another relying party",
        );
        let credential_id =
            self.make_test_credential(harness, "non-residential.example.com", false)?;
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            false,
            "non-resident credential is not found without allow list",
        );
        let fake_id = vec![0xFA; credential_id.len()];
        template.set_credential_list(credential_id);
        self.check_get_assertion(
            harness,
            &template,
            "find the non-resident credential in the allow list",
        )?;

        template.set_credential_list(fake_id);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            false,
            "reject an unknown credential in the allow list",
        );
        Ok(())
    }

    pub fn get_assertion_pin_auth_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "pinauth.example.com";
        let is_fido_2_1 = self.is_fido_2_1_compliant(harness)?;
        self.make_test_credential(harness, rp_id, true)?;
        let mut template = CommandTemplate::get_assertion(rp_id);

        if is_fido_2_1 {
            template.set_pin_uv_auth_param(Vec::new());
            template.set_default_pin_uv_auth_protocol();
            self.check_rejection(
                harness,
                &template,
                Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET,
                true,
                "zero length PIN auth without a PIN set",
            );
        }

        template.set_pin_uv_auth_param(vec![0x9A; 16]);
        template.set_pin_uv_auth_protocol(123_456);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID,
            false,
            "reject unsupported PIN protocol",
        );
        template.set_default_pin_uv_auth_protocol();
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET,
            false,
            "PIN auth without a PIN set",
        );

        self.get_auth_token(harness)?;
        let auth_token = self
            .session
            .auth_token()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ConformanceError::suite_bug("no token is held after getting it"))?;
        template.set_default_pin_uv_auth_param(&auth_token)?;
        self.check_get_assertion(harness, &template, "get assertion with a PIN token")?;

        if is_fido_2_1 {
            template.set_pin_uv_auth_param(Vec::new());
            self.check_rejection(
                harness,
                &template,
                Ctap2StatusCode::CTAP2_ERR_PIN_INVALID,
                true,
                "zero length PIN auth with a PIN set",
            );
        }

        template.set_pin_uv_auth_param(vec![0x9A; 16]);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID,
            false,
            "reject wrong PIN auth",
        );

        // Credentials made with a PIN set are found with and without a token.
        self.make_test_credential(harness, rp_id, true)?;
        template.remove(6);
        template.remove(7);
        self.check_get_assertion(
            harness,
            &template,
            "get assertion with a PIN set, but without a token",
        )?;
        template.set_default_pin_uv_auth_param(&auth_token)?;
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER,
            false,
            "PIN auth without PIN protocol",
        );

        self.reset(harness)
    }

    pub fn get_assertion_physical_presence_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "presence.example.com";
        self.make_test_credential(harness, rp_id, true)?;
        self.prompt_no_touch(harness);
        let template = CommandTemplate::get_assertion(rp_id);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT,
            true,
            "get assertion requires user presence",
        );
        Ok(())
    }
}

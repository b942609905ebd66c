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
use crate::api::customization::Customization;
use crate::conformance::commands::{
    extract_credential_id, get_assertion_positive, make_credential_positive, send_raw_negative,
    template_negative,
};
use crate::conformance::error::ConformanceError;
use crate::conformance::Harness;
use crate::ctap::data_formats::{
    MakeCredentialResponse, PublicKeyCredentialParameter, PublicKeyCredentialRpEntity,
    PublicKeyCredentialUserEntity, ES256_ALGORITHM, RS256_ALGORITHM,
};
use crate::ctap::encode_request;
use crate::ctap::status_code::Ctap2StatusCode;
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::TryFrom;
use ctap_cbor::{cbor_array, cbor_map};
use tracing::info;

const NON_ASCII_DISPLAY_NAME: &str = "テスト";

impl ProtocolComplianceEngine {
    fn check_make_credential<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        test_name: &str,
    ) -> Result<bool, ConformanceError> {
        let outcome = make_credential_positive(harness, &mut self.tracker, template)?;
        Ok(self.tracker.check_response(&outcome, test_name))
    }

    pub fn make_credential_exclude_list_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "exclude.example.com";
        let credential_id = self.make_test_credential(harness, rp_id, true)?;
        let template = CommandTemplate::get_assertion(rp_id);
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "the credential to exclude is usable");

        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_rk_option(true);
        template.set_user(PublicKeyCredentialUserEntity::new(vec![0x02; 32], "Bob"));
        template.set_credential_list(credential_id);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_CREDENTIAL_EXCLUDED,
            true,
            "reject excluded credential",
        );

        template.set_required(
            2,
            PublicKeyCredentialRpEntity::new("another.exclude.example.com"),
        );
        self.check_make_credential(
            harness,
            &template,
            "the exclude list only applies to its relying party",
        )?;
        Ok(())
    }

    pub fn make_credential_cose_algorithm_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("algorithm.example.com");
        let rejected_parameters = [
            (cbor_array![], "reject empty algorithm list"),
            (
                cbor_array![cbor_map! { "alg" => -1, "type" => "public-key" }],
                "reject unsupported algorithm",
            ),
            (
                cbor_array![cbor_map! { "alg" => ES256_ALGORITHM, "type" => "non-existing type" }],
                "reject unsupported credential type",
            ),
        ];
        for (parameters, test_name) in rejected_parameters.iter() {
            template.replace(4, parameters.clone());
            self.check_rejection(
                harness,
                &template,
                Ctap2StatusCode::CTAP2_ERR_UNSUPPORTED_ALGORITHM,
                false,
                test_name,
            );
        }

        template.replace(
            4,
            cbor_array![
                cbor_map! { "alg" => ES256_ALGORITHM, "type" => "non-existing type" },
                cbor_map! { "alg" => RS256_ALGORITHM, "type" => "public-key" },
                PublicKeyCredentialParameter::es256(),
            ],
        );
        self.check_make_credential(
            harness,
            &template,
            "pick the supported algorithm from a mixed list",
        )?;
        Ok(())
    }

    pub fn make_credential_options_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("options.example.com");
        let accepted_options = [
            ("rk", false, "accept rk set to false"),
            ("rk", true, "accept rk set to true"),
            ("up", true, "accept up set to true"),
            ("uv", false, "accept uv set to false"),
            ("unknown_option", false, "ignore unknown options"),
        ];
        for (name, value, test_name) in accepted_options.iter() {
            template.set_options(&[(*name, *value)]);
            self.check_make_credential(harness, &template, test_name)?;
        }

        template.set_up_option(false);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION,
            false,
            "reject up set to false",
        );

        template.set_uv_option(true);
        if self.has_uv_option(harness)? {
            self.check_make_credential(harness, &template, "accept uv set to true")?;
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

    pub fn make_credential_pin_auth_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let is_fido_2_1 = self.is_fido_2_1_compliant(harness)?;
        let mut template = CommandTemplate::make_credential("pinauth.example.com");

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
        self.check_make_credential(harness, &template, "make credential with a PIN token")?;

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

        template.remove(8);
        template.remove(9);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_PUAT_REQUIRED,
            false,
            "PIN parameter not given, but PIN is set",
        );
        template.set_default_pin_uv_auth_protocol();
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_PUAT_REQUIRED,
            false,
            "only the PIN protocol is given, but PIN is set",
        );
        template.remove(9);
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

    /// Fills the credential store, and resets the device afterwards.
    pub fn make_credential_multiple_keys_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "multiple_keys.example.com";
        let first_id = self.make_test_credential(harness, rp_id, true)?;
        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_rk_option(true);
        template.set_user(PublicKeyCredentialUserEntity::new(vec![0x01; 32], "second"));
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        let second_id = self
            .tracker
            .assert_response(outcome, "make a second resident credential")?;
        let second_id = extract_credential_id(&second_id);
        self.tracker.check_condition(
            second_id.map_or(false, |second_id| second_id != first_id),
            "credential IDs of different users differ",
        );

        let num_credentials = harness.env.customization().num_credentials();
        let mut counter: u32 = 0;
        let mut status = Ctap2StatusCode::CTAP2_OK;
        while status == Ctap2StatusCode::CTAP2_OK && (counter as usize) < num_credentials {
            counter += 1;
            let mut user_id = vec![0x10; 32];
            user_id[..4].copy_from_slice(&counter.to_be_bytes());
            template.set_user(PublicKeyCredentialUserEntity::new(user_id, "filler"));
            status = template_negative(harness, &mut self.tracker, &template, true);
        }
        if status != Ctap2StatusCode::CTAP2_OK {
            info!("The device stopped accepting credentials after {} more.", counter - 1);
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_KEY_STORE_FULL,
                status,
                "reject credentials when the store is full",
            );
        } else {
            info!(
                "The store full check is omitted, the device accepted {} more credentials.",
                num_credentials
            );
        }
        self.reset(harness)
    }

    pub fn make_credential_physical_presence_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "presence.example.com";
        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_rk_option(true);
        self.prompt_no_touch(harness);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT,
            true,
            "make credential requires user presence",
        );
        let template = CommandTemplate::get_assertion(rp_id);
        self.check_rejection(
            harness,
            &template,
            Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS,
            false,
            "no credential is created without user presence",
        );
        Ok(())
    }

    pub fn make_credential_display_name_encoding_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("displayname.example.com");
        template.set_rk_option(true);
        let long_name: String = "猫".repeat(108);
        let display_names = [
            String::from(NON_ASCII_DISPLAY_NAME),
            long_name.clone(),
            // Shifts the multibyte characters against a truncation boundary.
            format!("0{}", long_name),
            format!("01{}", long_name),
        ];
        for display_name in display_names.iter() {
            let mut user = PublicKeyCredentialUserEntity::new(vec![0x1D; 32], "display");
            user.user_display_name = Some(display_name.clone());
            template.set_user(user);
            self.check_make_credential(
                harness,
                &template,
                "accept displayName with non-ASCII characters",
            )?;
        }

        let mut user = PublicKeyCredentialUserEntity::new(vec![0x1D; 32], "display");
        user.user_display_name = Some(String::from(NON_ASCII_DISPLAY_NAME));
        template.set_user(user);
        let mut request = encode_request(Some(&template.to_cbor()))?;
        let needle = NON_ASCII_DISPLAY_NAME.as_bytes();
        let position = request
            .windows(needle.len())
            .position(|window| window == needle)
            .ok_or_else(|| ConformanceError::suite_bug("the display name is not in the request"))?;
        // A lone continuation byte is invalid UTF-8.
        request[position] = 0x80;
        let status = send_raw_negative(
            harness,
            &mut self.tracker,
            template.command(),
            &request,
            false,
        );
        if status != Ctap2StatusCode::CTAP2_ERR_INVALID_CBOR {
            harness
                .device_tracker
                .add_problem("UTF-8 correctness is not checked.");
        }
        Ok(())
    }

    pub fn make_credential_hmac_secret_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("hmac-secret.example.com");
        template.set_rk_option(true);
        template.set_extensions(cbor_map! { "hmac-secret" => true });
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        if !self
            .tracker
            .check_response(&outcome, "make credential with hmac-secret")
        {
            return Ok(());
        }
        let extensions = outcome
            .ok()
            .and_then(|response| MakeCredentialResponse::try_from(response).ok())
            .and_then(|response| response.auth_data.extensions);
        self.tracker.check_condition(
            extensions == Some(cbor_map! { "hmac-secret" => true }),
            "hmac-secret is confirmed in the authenticator data",
        );
        Ok(())
    }
}

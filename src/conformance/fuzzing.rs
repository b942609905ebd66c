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

//! Input parameter tests: requests with mutated types, missing parameters and excessive nesting.
//!
//! Every request is derived from a canonical command template, which itself is never modified.
//! Mutated requests are sent without a touch, since the device must reject them before checking
//! user presence.

use super::commands::{
    get_assertion_positive, make_credential_positive, make_test_credential, send_negative,
    send_raw_negative, template_negative,
};
use super::error::ConformanceError;
use super::monitor::DeviceMonitor;
use super::mutator::Mutator;
use super::tracker::{ResultTracker, Tally};
use super::Harness;
use crate::ctap::command::Command;
use crate::ctap::data_formats::{ClientPinSubCommand, CoseKey};
use crate::ctap::encode_request;
use crate::ctap::status_code::{outcome_status, Ctap2StatusCode};
use crate::ctap::template::{descriptor_with_transport, CommandTemplate};
use crate::env::Env;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use ctap_cbor as cbor;
use ctap_cbor::ValueKind;
use ctap_cbor::{cbor_array, cbor_array_vec, cbor_map};
use tracing::{debug, info};

pub const SERIES_NAME: &str = "Input parameter test series";

const BAD_TYPE: Ctap2StatusCode = Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE;
const TEST_CREDENTIAL_ID: [u8; 32] = [0xCE; 32];
const UNKNOWN_TRANSPORT: &str = "unknown-transport";
pub const DEFAULT_MUTATION_SEED: u64 = 0;
const MUTATION_BATCHES: usize = 4;
const MUTATION_BATCH_SIZE: usize = 25;
const MAX_MUTATION_DEGREE: usize = 8;
const MAX_MUTATED_REQUEST_LENGTH: usize = 1024;

/// Returns the example value of the given kind.
pub fn type_example(kind: ValueKind) -> cbor::Value {
    match kind {
        ValueKind::Unsigned => cbor::Value::from(42u64),
        ValueKind::Negative => cbor::Value::from(-42i64),
        ValueKind::ByteString => cbor::Value::from(vec![0x42]),
        ValueKind::TextString => cbor::Value::from("42"),
        ValueKind::Array => cbor_array![42],
        ValueKind::Map => cbor_map! { 42 => 42 },
        ValueKind::Simple => cbor::Value::bool_value(true),
        ValueKind::Float => cbor::Value::from(4.2),
    }
}

/// One example of each kind, in kind order.
pub fn type_examples() -> Vec<cbor::Value> {
    ValueKind::ALL.iter().map(|kind| type_example(*kind)).collect()
}

/// One example of each kind that CTAP parsers accept as map keys.
pub fn map_key_examples() -> Vec<cbor::KeyType> {
    vec![
        cbor::KeyType::Unsigned(42),
        cbor::KeyType::Negative(-42),
        cbor::KeyType::ByteString(vec![0x42]),
        cbor::KeyType::TextString("42".into()),
    ]
}

fn wrap_inner_map(
    inner_map: BTreeMap<cbor::KeyType, cbor::Value>,
    wrapped_in_array: bool,
) -> cbor::Value {
    let inner_map = cbor::Value::Map(inner_map);
    if wrapped_in_array {
        cbor_array![inner_map]
    } else {
        inner_map
    }
}

pub struct ParameterFuzzingEngine {
    tracker: ResultTracker,
    mutator: Mutator,
}

impl Default for ParameterFuzzingEngine {
    fn default() -> Self {
        ParameterFuzzingEngine::new()
    }
}

impl ParameterFuzzingEngine {
    pub fn new() -> Self {
        ParameterFuzzingEngine::with_mutation_seed(DEFAULT_MUTATION_SEED)
    }

    /// The seed determines all byte level mutations of a run.
    pub fn with_mutation_seed(seed: u64) -> Self {
        info!("Byte level mutations use the seed {}.", seed);
        ParameterFuzzingEngine {
            tracker: ResultTracker::new(SERIES_NAME),
            mutator: Mutator::new(MAX_MUTATION_DEGREE, seed),
        }
    }

    pub fn tracker(&self) -> &ResultTracker {
        &self.tracker
    }

    pub fn tally(&self) -> Tally {
        self.tracker.tally()
    }

    fn send_variant<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        key: u64,
        value: cbor::Value,
    ) -> Ctap2StatusCode {
        let mut variant = template.clone();
        variant.replace(key, value);
        template_negative(harness, &mut self.tracker, &variant, false)
    }

    /// Checks that every value of the wrong type is rejected, in the request and its entries.
    pub fn test_bad_parameter_types<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
    ) {
        let command = template.command();
        for example in type_examples() {
            if example.kind() == ValueKind::Map {
                continue;
            }
            let kind = example.kind();
            let status = send_negative(harness, &mut self.tracker, command, Some(&example), false);
            self.tracker.check_status(
                BAD_TYPE,
                status,
                &format!("bad type {} in {} for the request", kind, command),
            );
        }

        for (key, value) in template.entries() {
            for example in type_examples() {
                if example.has_same_kind(value) {
                    continue;
                }
                let kind = example.kind();
                let status = self.send_variant(harness, template, key, example);
                self.tracker.check_status(
                    BAD_TYPE,
                    status,
                    &format!("bad type {} in {} for key {}", kind, command, key),
                );
            }

            match value {
                cbor::Value::Map(inner_map) => {
                    self.test_bad_parameters_in_inner_map(harness, template, key, inner_map, false)
                }
                // Only the first element is checked, assuming all have the same type.
                cbor::Value::Array(elements) => {
                    if let Some(element) = elements.first() {
                        self.test_bad_parameters_in_inner_array(harness, template, key, element);
                    }
                }
                _ => (),
            }
        }
    }

    /// Checks that omitting any required parameter is rejected.
    pub fn test_missing_parameters<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
    ) {
        let command = template.command();
        for key in template.required_keys() {
            let mut variant = template.clone();
            variant.remove(key);
            let status = template_negative(harness, &mut self.tracker, &variant, false);
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER,
                status,
                &format!("missing key {} for command {}", key, command),
            );
        }
    }

    /// Checks the entries of the map at `outer_key`.
    ///
    /// Bad types are tested. Unknown extra keys and omitted entries are compared against the
    /// unmodified request, and differences are only logged as warnings.
    pub fn test_bad_parameters_in_inner_map<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        outer_key: u64,
        inner_map: &BTreeMap<cbor::KeyType, cbor::Value>,
        wrapped_in_array: bool,
    ) {
        let command = template.command();
        let location = if wrapped_in_array {
            format!("in array at map key {}", outer_key)
        } else {
            format!("at map key {}", outer_key)
        };
        for (inner_key, inner_value) in inner_map {
            for example in type_examples() {
                if example.has_same_kind(inner_value) {
                    continue;
                }
                let kind = example.kind();
                let mut test_map = inner_map.clone();
                test_map.insert(inner_key.clone(), example);
                let status = self.send_variant(
                    harness,
                    template,
                    outer_key,
                    wrap_inner_map(test_map, wrapped_in_array),
                );
                self.tracker.check_status(
                    BAD_TYPE,
                    status,
                    &format!(
                        "bad type {} in {} in inner key {} {}",
                        kind, command, inner_key, location
                    ),
                );
            }
        }

        let baseline = template_negative(harness, &mut self.tracker, template, false);
        // Unknown entries get a value that is valid elsewhere in the same map.
        let filler = inner_map
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| type_example(ValueKind::Unsigned));
        for unknown_key in map_key_examples() {
            if inner_map.contains_key(&unknown_key) {
                continue;
            }
            let mut test_map = inner_map.clone();
            test_map.insert(unknown_key.clone(), filler.clone());
            let status = self.send_variant(
                harness,
                template,
                outer_key,
                wrap_inner_map(test_map, wrapped_in_array),
            );
            self.tracker.warn_on_mismatch(
                baseline,
                status,
                &format!("unknown inner key {} in {} {}", unknown_key, command, location),
            );
        }
        for inner_key in inner_map.keys() {
            let mut test_map = inner_map.clone();
            test_map.remove(inner_key);
            let status = self.send_variant(
                harness,
                template,
                outer_key,
                wrap_inner_map(test_map, wrapped_in_array),
            );
            self.tracker.warn_on_mismatch(
                baseline,
                status,
                &format!("omitted inner key {} in {} {}", inner_key, command, location),
            );
        }
    }

    /// Checks that a second array element of the wrong type is rejected.
    pub fn test_bad_parameters_in_inner_array<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        outer_key: u64,
        element: &cbor::Value,
    ) {
        let command = template.command();
        for example in type_examples() {
            if example.has_same_kind(element) {
                continue;
            }
            let kind = example.kind();
            let test_array = cbor_array_vec!(vec![element.clone(), example]);
            let status = self.send_variant(harness, template, outer_key, test_array);
            self.tracker.check_status(
                BAD_TYPE,
                status,
                &format!(
                    "bad type {} in {} in array element at map key {}",
                    kind, command, outer_key
                ),
            );
        }

        if let cbor::Value::Map(inner_map) = element {
            self.test_bad_parameters_in_inner_map(harness, template, outer_key, inner_map, true);
        }
    }

    /// Checks the nesting limit with credential descriptors in the exclude or allow list.
    ///
    /// A transport list item that is an array or map exceeds the maximum depth. An unknown
    /// transport string stays at the maximum depth and must be ignored, so that request succeeds.
    /// The allow list of GetAssertion refers to a new credential of `rp_id` for that purpose.
    pub fn test_credential_descriptors_array_for_cbor_depth<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
        map_key: u64,
        rp_id: &str,
    ) -> Result<(), ConformanceError> {
        let command = template.command();
        let credential_id = if command == Command::AuthenticatorGetAssertion {
            self.make_test_credential(harness, rp_id, false)?
        } else {
            TEST_CREDENTIAL_ID.to_vec()
        };
        for kind in [ValueKind::Array, ValueKind::Map] {
            let descriptor = descriptor_with_transport(credential_id.clone(), type_example(kind));
            let status = self.send_variant(harness, template, map_key, cbor_array![descriptor]);
            self.tracker.check_status(
                Ctap2StatusCode::CTAP2_ERR_INVALID_CBOR,
                status,
                &format!(
                    "maximum CBOR nesting depth exceeded with {} in credential descriptor \
                     transport list item in {} for key {}",
                    kind, command, map_key
                ),
            );
        }

        let mut unknown_transport = template.clone();
        unknown_transport.replace(
            map_key,
            cbor_array![descriptor_with_transport(
                credential_id,
                cbor::Value::from(UNKNOWN_TRANSPORT),
            )],
        );
        let outcome = if command == Command::AuthenticatorMakeCredential {
            make_credential_positive(harness, &mut self.tracker, &unknown_transport)?
        } else {
            get_assertion_positive(harness, &mut self.tracker, &unknown_transport)?
        };
        self.tracker.check_condition(
            outcome_status(&outcome) != Ctap2StatusCode::CTAP2_ERR_INVALID_CBOR,
            &format!(
                "accept maximum CBOR nesting depth in {} for key {}",
                command, map_key
            ),
        );
        self.tracker.check_response(
            &outcome,
            &format!(
                "ignore unknown transport at maximum CBOR nesting depth in {} for {}",
                command, rp_id
            ),
        );
        Ok(())
    }

    /// Sends batches of byte level mutations of the serialized request.
    ///
    /// Any answer is accepted. After each batch, the device must still answer and must not have
    /// restarted.
    pub fn test_mutated_requests<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        template: &CommandTemplate,
    ) -> Result<(), ConformanceError> {
        let command = template.command();
        let request = encode_request(Some(&template.to_cbor()))?;
        for batch in 0..MUTATION_BATCHES {
            let monitor = DeviceMonitor::attach(harness)?;
            for _ in 0..MUTATION_BATCH_SIZE {
                let mut mutated = request.clone();
                let applied = self.mutator.mutate(&mut mutated, MAX_MUTATED_REQUEST_LENGTH);
                let status =
                    send_raw_negative(harness, &mut self.tracker, command, &mutated, false);
                debug!(%command, applied, %status, "Mutated request answered");
            }
            self.tracker.check_condition(
                !monitor.device_crashed(harness),
                &format!("device keeps running after mutated {} batch {}", command, batch),
            );
        }
        Ok(())
    }

    fn make_test_credential<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
        rp_id: &str,
        resident_key: bool,
    ) -> Result<Vec<u8>, ConformanceError> {
        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_rk_option(resident_key);
        make_test_credential(harness, &mut self.tracker, &template)
    }

    pub fn make_credential_bad_parameter_types_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "make_bad_types.example.com";
        let mut template = CommandTemplate::make_credential(rp_id);
        template.set_required(
            2,
            cbor_map! {
                "id" => rp_id,
                "icon" => "http://icon.png",
                "name" => "example",
            },
        );
        template.set_required(
            3,
            cbor_map! {
                "id" => vec![0x1D; 32],
                "icon" => "http://icon.png",
                "name" => "John Doe",
                "displayName" => "JD",
            },
        );
        template.set_credential_list(Vec::new());
        template.set_extensions(cbor_map! {});
        // The correct behavior with "up" isn't specified well, but it should be okay.
        template.set_options(&[("rk", false), ("up", true), ("uv", false)]);
        template.set_default_pin_uv_auth_param(&[])?;
        template.set_default_pin_uv_auth_protocol();
        self.test_bad_parameter_types(harness, &template);
        Ok(())
    }

    pub fn make_credential_missing_parameter_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let template = CommandTemplate::make_credential("make_missing.example.com");
        self.test_missing_parameters(harness, &template);
        Ok(())
    }

    pub fn make_credential_relying_party_entity_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "make_parameter2.example.com";
        let mut template = CommandTemplate::make_credential(rp_id);

        template.set_required(2, cbor_map! { "id" => rp_id, "name" => "example" });
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "recognize optional name in relying party entity");

        template.set_required(2, cbor_map! { "id" => rp_id, "icon" => "http://icon.png" });
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "recognize optional icon in relying party entity");
        Ok(())
    }

    pub fn make_credential_user_entity_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("make_parameter3.example.com");
        let user_id = vec![0x1D; 32];
        let user_entities = [
            (
                cbor_map! { "id" => user_id.clone(), "name" => "Adam" },
                "recognize optional name in user entity",
            ),
            (
                cbor_map! { "id" => user_id.clone(), "icon" => "http://icon.png" },
                "recognize optional icon in user entity",
            ),
            (
                cbor_map! { "id" => user_id, "displayName" => "A L" },
                "recognize optional displayName in user entity",
            ),
        ];
        for (user_entity, test_name) in user_entities {
            template.set_required(3, user_entity);
            let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
            self.tracker.check_response(&outcome, test_name);
        }
        Ok(())
    }

    pub fn make_credential_exclude_list_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "make_parameter5.example.com";
        let mut template = CommandTemplate::make_credential(rp_id);
        self.test_credential_descriptors_array_for_cbor_depth(harness, &template, 5, rp_id)?;

        template.set_credential_list(TEST_CREDENTIAL_ID.to_vec());
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "accept a valid credential descriptor");
        Ok(())
    }

    pub fn make_credential_extensions_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let mut template = CommandTemplate::make_credential("make_parameter6.example.com");
        template.set_extensions(cbor_map! { "test_extension" => "extension CBOR" });
        let outcome = make_credential_positive(harness, &mut self.tracker, &template)?;
        self.tracker.check_response(&outcome, "accept valid extension");
        Ok(())
    }

    pub fn make_credential_mutated_request_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let template = CommandTemplate::make_credential("make_mutated.example.com");
        self.test_mutated_requests(harness, &template)
    }

    pub fn get_assertion_bad_parameter_types_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "get_bad_types.example.com";
        let credential_id = self.make_test_credential(harness, rp_id, false)?;

        let mut template = CommandTemplate::get_assertion(rp_id);
        template.set_credential_list(credential_id);
        template.set_extensions(cbor_map! {});
        // "rk" is an invalid option here.
        template.set_options(&[("up", false), ("uv", false)]);
        template.set_default_pin_uv_auth_param(&[])?;
        template.set_default_pin_uv_auth_protocol();
        self.test_bad_parameter_types(harness, &template);
        Ok(())
    }

    pub fn get_assertion_missing_parameter_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "get_missing.example.com";
        self.make_test_credential(harness, rp_id, true)?;
        let template = CommandTemplate::get_assertion(rp_id);
        self.test_missing_parameters(harness, &template);
        Ok(())
    }

    pub fn get_assertion_allow_list_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "get_parameter3.example.com";
        let mut template = CommandTemplate::get_assertion(rp_id);
        self.test_credential_descriptors_array_for_cbor_depth(harness, &template, 3, rp_id)?;

        let credential_id = self.make_test_credential(harness, rp_id, false)?;
        template.set_credential_list(credential_id);
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker
            .check_response(&outcome, "accept a valid credential descriptor");
        Ok(())
    }

    pub fn get_assertion_extensions_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "get_parameter4.example.com";
        let credential_id = self.make_test_credential(harness, rp_id, false)?;
        let mut template = CommandTemplate::get_assertion(rp_id);
        template.set_credential_list(credential_id);
        template.set_extensions(cbor_map! { "test_extension" => "extension CBOR" });
        let outcome = get_assertion_positive(harness, &mut self.tracker, &template)?;
        self.tracker.check_response(&outcome, "accept a valid extension");
        Ok(())
    }

    pub fn get_assertion_mutated_request_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let rp_id = "get_mutated.example.com";
        let credential_id = self.make_test_credential(harness, rp_id, false)?;
        let mut template = CommandTemplate::get_assertion(rp_id);
        template.set_credential_list(credential_id);
        self.test_mutated_requests(harness, &template)
    }

    fn client_pin_test<E: Env>(&mut self, harness: &mut Harness<E>, template: CommandTemplate) {
        self.test_bad_parameter_types(harness, &template);
        self.test_missing_parameters(harness, &template);
    }

    pub fn client_pin_get_pin_retries_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template = CommandTemplate::client_pin(ClientPinSubCommand::GetPinRetries);
        self.client_pin_test(harness, template);
    }

    pub fn client_pin_get_key_agreement_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template = CommandTemplate::client_pin(ClientPinSubCommand::GetKeyAgreement);
        self.client_pin_test(harness, template);
    }

    pub fn client_pin_set_pin_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template =
            CommandTemplate::client_pin_set_pin(CoseKey::example_ecdh_pubkey(), vec![], vec![]);
        self.client_pin_test(harness, template);
    }

    pub fn client_pin_change_pin_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template = CommandTemplate::client_pin_change_pin(
            CoseKey::example_ecdh_pubkey(),
            vec![],
            vec![],
            vec![],
        );
        self.client_pin_test(harness, template);
    }

    pub fn client_pin_get_pin_token_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template =
            CommandTemplate::client_pin_get_pin_token(CoseKey::example_ecdh_pubkey(), vec![]);
        self.client_pin_test(harness, template);
    }

    /// Only for CTAP 2.1 authenticators.
    pub fn client_pin_get_pin_uv_auth_token_using_uv_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) {
        let template = CommandTemplate::client_pin_get_pin_uv_auth_token_using_uv(
            CoseKey::example_ecdh_pubkey(),
        );
        self.client_pin_test(harness, template);
    }

    /// Only for CTAP 2.1 authenticators.
    pub fn client_pin_get_uv_retries_test<E: Env>(&mut self, harness: &mut Harness<E>) {
        let template = CommandTemplate::client_pin(ClientPinSubCommand::GetUvRetries);
        self.client_pin_test(harness, template);
    }
}

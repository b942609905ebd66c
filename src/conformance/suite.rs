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

//! Runs all test series against one device, in an order where each step leaves the device in a
//! state the next one can start from.

use super::compliance::ProtocolComplianceEngine;
use super::error::ConformanceError;
use super::fuzzing::ParameterFuzzingEngine;
use super::tracker::Tally;
use super::Harness;
use crate::api::customization::is_valid;
use crate::env::Env;
use core::fmt;
use tracing::{error, info, warn};

/// The final tallies of both test series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteReport {
    pub input_tally: Tally,
    pub compliance_tally: Tally,
}

impl SuiteReport {
    pub fn failed(&self) -> usize {
        self.input_tally.failed() + self.compliance_tally.failed()
    }
}

fn run_input_tests<E: Env>(
    fuzzing: &mut ParameterFuzzingEngine,
    harness: &mut Harness<E>,
    is_fido_2_1: bool,
) -> Result<(), ConformanceError> {
    info!("Running the MakeCredential input parameter tests.");
    fuzzing.make_credential_bad_parameter_types_test(harness)?;
    fuzzing.make_credential_missing_parameter_test(harness)?;
    fuzzing.make_credential_relying_party_entity_test(harness)?;
    fuzzing.make_credential_user_entity_test(harness)?;
    fuzzing.make_credential_exclude_list_test(harness)?;
    fuzzing.make_credential_extensions_test(harness)?;
    fuzzing.make_credential_mutated_request_test(harness)?;

    info!("Running the GetAssertion input parameter tests.");
    fuzzing.get_assertion_bad_parameter_types_test(harness)?;
    fuzzing.get_assertion_missing_parameter_test(harness)?;
    fuzzing.get_assertion_allow_list_test(harness)?;
    fuzzing.get_assertion_extensions_test(harness)?;
    fuzzing.get_assertion_mutated_request_test(harness)?;

    info!("Running the ClientPin input parameter tests.");
    fuzzing.client_pin_get_pin_retries_test(harness);
    fuzzing.client_pin_get_key_agreement_test(harness);
    fuzzing.client_pin_set_pin_test(harness);
    fuzzing.client_pin_change_pin_test(harness);
    fuzzing.client_pin_get_pin_token_test(harness);
    if is_fido_2_1 {
        fuzzing.client_pin_get_pin_uv_auth_token_using_uv_test(harness);
        fuzzing.client_pin_get_uv_retries_test(harness);
    }
    Ok(())
}

fn run_compliance_tests<E: Env>(
    compliance: &mut ProtocolComplianceEngine,
    harness: &mut Harness<E>,
) -> Result<(), ConformanceError> {
    info!("Running the Reset tests.");
    compliance.reset_deletion_test(harness)?;
    compliance.reset_physical_presence_test(harness)?;
    compliance.persistence_test(harness)?;

    info!("Running the MakeCredential tests.");
    compliance.make_credential_exclude_list_test(harness)?;
    compliance.make_credential_cose_algorithm_test(harness)?;
    compliance.make_credential_options_test(harness)?;
    compliance.make_credential_pin_auth_test(harness)?;
    compliance.make_credential_multiple_keys_test(harness)?;
    compliance.make_credential_physical_presence_test(harness)?;
    compliance.make_credential_display_name_encoding_test(harness)?;

    info!("Running the GetAssertion tests.");
    compliance.get_assertion_options_test(harness)?;
    compliance.get_assertion_residential_key_test(harness)?;
    compliance.get_assertion_pin_auth_test(harness)?;
    compliance.get_assertion_physical_presence_test(harness)?;

    info!("Running the GetInfo and ClientPin tests.");
    compliance.get_info_test(harness)?;
    compliance.client_pin_requirements_test(harness)?;
    compliance.client_pin_retries_test(harness)?;
    if compliance.is_hmac_secret_supported(harness)? {
        compliance.make_credential_hmac_secret_test(harness)?;
    } else {
        info!("The hmac-secret tests are skipped, the extension is not supported.");
    }
    Ok(())
}

fn run_series<E: Env>(
    fuzzing: &mut ParameterFuzzingEngine,
    compliance: &mut ProtocolComplianceEngine,
    harness: &mut Harness<E>,
) -> Result<(), ConformanceError> {
    // Starts from an empty device, and caches the capabilities.
    compliance.reset(harness)?;
    let is_fido_2_1 = compliance.is_fido_2_1_compliant(harness)?;
    if !is_fido_2_1 {
        info!("The device is not CTAP 2.1 compliant, 2.1 specific tests are skipped.");
    }
    run_input_tests(fuzzing, harness, is_fido_2_1)?;
    run_compliance_tests(compliance, harness)
}

fn print_report<E: Env>(
    fuzzing: &ParameterFuzzingEngine,
    compliance: &ProtocolComplianceEngine,
    harness: &mut Harness<E>,
) -> fmt::Result {
    let mut writer = harness.env.write();
    harness.device_tracker.report_findings(&mut writer)?;
    fuzzing.tracker().print_results(&mut writer)?;
    compliance.tracker().print_results(&mut writer)
}

/// Runs every test series and prints the findings and results.
///
/// The results are also printed if a critical test fails, with the tallies up to that point.
pub fn run_conformance_suite<E: Env>(env: E) -> Result<SuiteReport, ConformanceError> {
    if !is_valid(env.customization()) {
        return Err(ConformanceError::suite_bug(
            "the customization violates its invariants",
        ));
    }
    let mut harness = Harness::new(env);
    let mut fuzzing = ParameterFuzzingEngine::new();
    let mut compliance = ProtocolComplianceEngine::new();

    let result = run_series(&mut fuzzing, &mut compliance, &mut harness);
    if let Err(error) = &result {
        error!(%error, "Stopped the conformance run");
    }
    if print_report(&fuzzing, &compliance, &mut harness).is_err() {
        warn!("Failed to print the conformance report.");
    }
    result?;
    Ok(SuiteReport {
        input_tally: fuzzing.tally(),
        compliance_tally: compliance.tally(),
    })
}

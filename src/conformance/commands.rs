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

//! Sends commands and validates successful responses.
//!
//! Positive commands ask for a touch when the device needs one, and pass every successful
//! response through the credential and counter validators. A response that doesn't parse is
//! returned as an error status. Validator failures end the run.

use super::error::ConformanceError;
use super::tracker::ResultTracker;
use super::Harness;
use crate::api::device::Device;
use crate::api::prompt::Prompt;
use crate::api::validator::{CounterValidator, CredentialValidator};
use crate::ctap::command::Command;
use crate::ctap::data_formats::{
    ClientPinResponse, GetAssertionResponse, MakeCredentialResponse,
};
use crate::ctap::status_code::{outcome_status, Ctap2StatusCode, ResponseOutcome};
use crate::ctap::template::{CommandTemplate, DEFAULT_CLIENT_DATA_HASH};
use crate::env::Env;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::convert::TryFrom;
use ctap_cbor as cbor;
use ctap_cbor::cbor_null;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

fn request_touch<E: Env>(harness: &mut Harness<E>, tracker: &mut ResultTracker, command: Command) {
    tracker.record_manual_step(&format!("touch for {}", command));
    harness.env.prompt().request_touch();
}

// Values the response signs over, read from the request.
fn client_data_hash(template: &CommandTemplate, key: u64) -> Vec<u8> {
    template
        .get(key)
        .and_then(|value| value.as_bytes())
        .map_or_else(|| DEFAULT_CLIENT_DATA_HASH.to_vec(), |bytes| bytes.to_vec())
}

fn make_credential_rp_id(template: &CommandTemplate) -> Option<&str> {
    template
        .get(2)?
        .as_map()?
        .get(&cbor::KeyType::from("id"))?
        .as_text()
}

fn allow_list_id(template: &CommandTemplate) -> Option<Vec<u8>> {
    match template.get(3)?.as_array()? {
        [descriptor] => descriptor
            .as_map()?
            .get(&cbor::KeyType::from("id"))?
            .as_bytes()
            .map(|id| id.to_vec()),
        _ => None,
    }
}

fn check_user_presence<E: Env>(harness: &mut Harness<E>, user_present: bool, command: Command) {
    if !user_present {
        harness.device_tracker.add_problem(format!(
            "The user presence flag is not set in {} after a touch.",
            command
        ));
    }
}

/// Extracts the credential ID from a MakeCredential response.
pub fn extract_credential_id(response: &cbor::Value) -> Option<Vec<u8>> {
    let response = MakeCredentialResponse::try_from(response.clone()).ok()?;
    response.credential_id().map(|credential_id| credential_id.to_vec())
}

/// Creates a credential that later tests depend on, and returns its ID.
pub fn make_test_credential<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    template: &CommandTemplate,
) -> Result<Vec<u8>, ConformanceError> {
    let outcome = make_credential_positive(harness, tracker, template)?;
    let response = tracker.assert_response(outcome, "make credential for further tests")?;
    extract_credential_id(&response).ok_or_else(|| ConformanceError::FailedCriticalTest {
        name: String::from("extract the ID of the new credential"),
        status: None,
    })
}

/// Sends a MakeCredential request that is expected to succeed, with a touch.
pub fn make_credential_positive<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    template: &CommandTemplate,
) -> Result<ResponseOutcome, ConformanceError> {
    let command = Command::AuthenticatorMakeCredential;
    request_touch(harness, tracker, command);
    let value = match harness.env.device().send(command, Some(&template.to_cbor())) {
        Ok(value) => value,
        Err(status) => return Ok(Err(status)),
    };
    let response = match MakeCredentialResponse::try_from(value.clone()) {
        Ok(response) => response,
        Err(status) => {
            warn!(%status, "MakeCredential response does not parse");
            return Ok(Err(status));
        }
    };
    let attested_credential_data = match &response.auth_data.attested_credential_data {
        Some(data) => data,
        None => {
            warn!("MakeCredential response has no attested credential data");
            return Ok(Err(Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER));
        }
    };
    harness.device_tracker.key_checker().register_credential(
        &attested_credential_data.credential_id,
        &attested_credential_data.public_key,
    )?;
    harness.device_tracker.counter_checker().register_counter(
        &attested_credential_data.credential_id,
        response.auth_data.sign_count,
    )?;

    check_user_presence(harness, response.auth_data.user_present(), command);
    if let Some(rp_id) = make_credential_rp_id(template) {
        if response.auth_data.rp_id_hash[..] != Sha256::digest(rp_id.as_bytes())[..] {
            harness
                .device_tracker
                .add_problem("The RP ID hash in MakeCredential does not match the RP ID.");
        }
    }
    harness
        .device_tracker
        .add_observation(format!("Attestation format is \"{}\".", response.fmt));
    debug!(
        credential_id_length = attested_credential_data.credential_id.len(),
        "Created credential"
    );
    Ok(Ok(value))
}

/// Sends a GetAssertion request that is expected to succeed.
///
/// Asks for a touch unless the request sets the user presence option to false.
pub fn get_assertion_positive<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    template: &CommandTemplate,
) -> Result<ResponseOutcome, ConformanceError> {
    let command = Command::AuthenticatorGetAssertion;
    let expects_touch = template.up_option() != Some(false);
    if expects_touch {
        request_touch(harness, tracker, command);
    }
    let value = match harness.env.device().send(command, Some(&template.to_cbor())) {
        Ok(value) => value,
        Err(status) => return Ok(Err(status)),
    };
    let response = match GetAssertionResponse::try_from(value.clone()) {
        Ok(response) => response,
        Err(status) => {
            warn!(%status, "GetAssertion response does not parse");
            return Ok(Err(status));
        }
    };
    // The credential may be omitted if the allow list has exactly one entry.
    let credential_id = match response
        .credential
        .as_ref()
        .map(|descriptor| descriptor.key_id.clone())
        .or_else(|| allow_list_id(template))
    {
        Some(credential_id) => credential_id,
        None => {
            warn!("GetAssertion response does not identify the credential");
            return Ok(Err(Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER));
        }
    };

    let mut signed_data = response.auth_data_bytes.clone();
    signed_data.extend_from_slice(&client_data_hash(template, 2));
    harness.device_tracker.key_checker().verify_assertion(
        &credential_id,
        &signed_data,
        &response.signature,
    )?;
    harness
        .device_tracker
        .counter_checker()
        .register_counter(&credential_id, response.auth_data.sign_count)?;
    if expects_touch {
        check_user_presence(harness, response.auth_data.user_present(), command);
    }
    Ok(Ok(value))
}

/// Sends a request that is expected to fail, and returns the status.
///
/// If the device should only fail after checking user presence, a touch is requested.
pub fn send_negative<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    command: Command,
    parameters: Option<&cbor::Value>,
    expect_up: bool,
) -> Ctap2StatusCode {
    if expect_up {
        request_touch(harness, tracker, command);
    }
    outcome_status(&harness.env.device().send(command, parameters))
}

pub fn template_negative<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    template: &CommandTemplate,
    expect_up: bool,
) -> Ctap2StatusCode {
    send_negative(
        harness,
        tracker,
        template.command(),
        Some(&template.to_cbor()),
        expect_up,
    )
}

/// As [`send_negative`], for requests that can't be represented as a CBOR value.
pub fn send_raw_negative<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
    command: Command,
    request: &[u8],
    expect_up: bool,
) -> Ctap2StatusCode {
    if expect_up {
        request_touch(harness, tracker, command);
    }
    outcome_status(&harness.env.device().send_raw(command, request))
}

/// Sends a ClientPin request that is expected to succeed. No subcommand needs a touch.
pub fn client_pin_positive<E: Env>(
    harness: &mut Harness<E>,
    template: &CommandTemplate,
) -> ResponseOutcome {
    let value = harness
        .env
        .device()
        .send(Command::AuthenticatorClientPin, Some(&template.to_cbor()))?;
    // SetPin and ChangePin may answer without payload.
    if value == cbor_null!() {
        return Ok(value);
    }
    if let Err(status) = ClientPinResponse::try_from(value.clone()) {
        warn!(%status, "ClientPin response does not parse");
        return Err(status);
    }
    Ok(value)
}

pub fn get_info_positive<E: Env>(harness: &mut Harness<E>) -> ResponseOutcome {
    harness
        .env
        .device()
        .send(Command::AuthenticatorGetInfo, None)
}

/// Sends a Reset, with a touch.
pub fn reset_positive<E: Env>(
    harness: &mut Harness<E>,
    tracker: &mut ResultTracker,
) -> ResponseOutcome {
    let command = Command::AuthenticatorReset;
    request_touch(harness, tracker, command);
    harness.env.device().send(command, None)
}

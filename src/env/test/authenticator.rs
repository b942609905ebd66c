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

//! A simulated CTAP2.1 authenticator, to run the conformance tests without hardware.
//!
//! It implements the subset of the protocol that the tests exercise: typed parameter parsing,
//! depth-limited decoding, PIN protocol version 1, resident and non-resident ES256 credentials,
//! user presence and the reset window. Faults can be injected to check that the tests notice.

use super::{TestClock, TestTimer, TestUserPresence};
use crate::api::clock::Clock;
use crate::ctap::command::Command;
use crate::ctap::data_formats::{
    extract_array, extract_bool, extract_byte_string, extract_map, extract_text_string,
    extract_unsigned, ok_or_missing, AttestedCredentialData, AuthenticatorData,
    ClientPinSubCommand, CoseKey, GetAssertionOptions, MakeCredentialOptions,
    PublicKeyCredentialDescriptor, PublicKeyCredentialParameter, PublicKeyCredentialRpEntity,
    PublicKeyCredentialType, PublicKeyCredentialUserEntity, ES256_ALGORITHM,
};
use crate::ctap::pin_protocol::{
    pin_hash, verify_pin_uv_auth_token, KeyAgreementKey, SharedSecret, PIN_TOKEN_LENGTH,
};
use crate::ctap::status_code::Ctap2StatusCode;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::TryFrom;
use ctap_cbor as cbor;
use ctap_cbor::{cbor_array, cbor_map, cbor_map_options, destructure_cbor_map};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const AAGUID: [u8; 16] = [
    0x5A, 0x1E, 0xC7, 0x0F, 0x0C, 0x74, 0x4B, 0x2E, 0x8B, 0x9C, 0x41, 0xD3, 0x6E, 0x0A, 0x55, 0x12,
];
const CREDENTIAL_ID_SIZE: usize = 32;
const MAX_RESIDENT_CREDENTIALS: usize = 25;
const MAX_MSG_SIZE: u64 = 1200;
const MAX_PIN_RETRIES: u8 = 8;
const MAX_CONSECUTIVE_PIN_MISMATCHES: u8 = 3;
const MIN_PIN_LENGTH: usize = 4;
const MAX_PIN_LENGTH: usize = 63;
const PADDED_PIN_LENGTH: usize = 64;
const PIN_HASH_LENGTH: usize = 16;
const PIN_PROTOCOL_V1: u64 = 1;
const RESET_WINDOW_MS: usize = 10000;
const HMAC_SECRET_EXTENSION: &str = "hmac-secret";

/// Deviations from the protocol, for checking that the conformance tests detect them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Faults {
    /// Answers mistyped requests with success instead of CBOR_UNEXPECTED_TYPE.
    pub skip_type_checks: bool,
    /// Decodes requests of any nesting depth.
    pub ignore_depth_limit: bool,
    /// Keeps the key agreement key after a wrong PIN hash.
    pub keep_key_agreement_after_mismatch: bool,
    /// Rejects requests that reach the maximum nesting depth.
    pub strict_depth_limit: bool,
    /// Restarts, losing all volatile state, when a request is not well-formed CBOR.
    pub restart_on_malformed_request: bool,
}

struct Credential {
    credential_id: Vec<u8>,
    private_key: SigningKey,
    rp_id: String,
    user_handle: Vec<u8>,
    is_resident: bool,
}

struct MakeCredentialParameters {
    client_data_hash: Vec<u8>,
    rp: PublicKeyCredentialRpEntity,
    user: PublicKeyCredentialUserEntity,
    pub_key_cred_params: Vec<PublicKeyCredentialParameter>,
    exclude_list: Vec<PublicKeyCredentialDescriptor>,
    hmac_secret: bool,
    options: MakeCredentialOptions,
    pin_uv_auth_param: Option<Vec<u8>>,
    pin_uv_auth_protocol: Option<u64>,
}

impl TryFrom<cbor::Value> for MakeCredentialParameters {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => client_data_hash,
                2 => rp,
                3 => user,
                4 => cred_param_vec,
                5 => exclude_list,
                6 => extensions,
                7 => options,
                8 => pin_uv_auth_param,
                9 => pin_uv_auth_protocol,
            } = extract_map(cbor_value)?;
        }

        let client_data_hash = extract_byte_string(ok_or_missing(client_data_hash)?)?;
        let rp = PublicKeyCredentialRpEntity::try_from(ok_or_missing(rp)?)?;
        let user = PublicKeyCredentialUserEntity::try_from(ok_or_missing(user)?)?;
        let pub_key_cred_params = extract_array(ok_or_missing(cred_param_vec)?)?
            .into_iter()
            .map(PublicKeyCredentialParameter::try_from)
            .collect::<Result<Vec<_>, Ctap2StatusCode>>()?;
        let exclude_list = parse_credential_list(exclude_list)?;
        let hmac_secret = parse_hmac_secret_extension(extensions)?;
        let options = options
            .map(MakeCredentialOptions::try_from)
            .transpose()?
            .unwrap_or_default();
        let pin_uv_auth_param = pin_uv_auth_param.map(extract_byte_string).transpose()?;
        let pin_uv_auth_protocol = pin_uv_auth_protocol.map(extract_unsigned).transpose()?;

        Ok(MakeCredentialParameters {
            client_data_hash,
            rp,
            user,
            pub_key_cred_params,
            exclude_list,
            hmac_secret,
            options,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        })
    }
}

struct GetAssertionParameters {
    rp_id: String,
    client_data_hash: Vec<u8>,
    allow_list: Vec<PublicKeyCredentialDescriptor>,
    options: GetAssertionOptions,
    pin_uv_auth_param: Option<Vec<u8>>,
    pin_uv_auth_protocol: Option<u64>,
}

impl TryFrom<cbor::Value> for GetAssertionParameters {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => rp_id,
                2 => client_data_hash,
                3 => allow_list,
                4 => extensions,
                5 => options,
                6 => pin_uv_auth_param,
                7 => pin_uv_auth_protocol,
            } = extract_map(cbor_value)?;
        }

        let rp_id = extract_text_string(ok_or_missing(rp_id)?)?;
        let client_data_hash = extract_byte_string(ok_or_missing(client_data_hash)?)?;
        let allow_list = parse_credential_list(allow_list)?;
        // Assertions ignore all extensions, but the container must be a map.
        extensions.map(extract_map).transpose()?;
        let options = options
            .map(GetAssertionOptions::try_from)
            .transpose()?
            .unwrap_or_default();
        let pin_uv_auth_param = pin_uv_auth_param.map(extract_byte_string).transpose()?;
        let pin_uv_auth_protocol = pin_uv_auth_protocol.map(extract_unsigned).transpose()?;

        Ok(GetAssertionParameters {
            rp_id,
            client_data_hash,
            allow_list,
            options,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        })
    }
}

struct ClientPinParameters {
    pin_uv_auth_protocol: u64,
    sub_command: ClientPinSubCommand,
    key_agreement: Option<CoseKey>,
    pin_uv_auth_param: Option<Vec<u8>>,
    new_pin_enc: Option<Vec<u8>>,
    pin_hash_enc: Option<Vec<u8>>,
}

impl TryFrom<cbor::Value> for ClientPinParameters {
    type Error = Ctap2StatusCode;

    fn try_from(cbor_value: cbor::Value) -> Result<Self, Ctap2StatusCode> {
        destructure_cbor_map! {
            let {
                1 => pin_uv_auth_protocol,
                2 => sub_command,
                3 => key_agreement,
                4 => pin_uv_auth_param,
                5 => new_pin_enc,
                6 => pin_hash_enc,
            } = extract_map(cbor_value)?;
        }

        let pin_uv_auth_protocol = extract_unsigned(ok_or_missing(pin_uv_auth_protocol)?)?;
        let sub_command = ClientPinSubCommand::try_from(ok_or_missing(sub_command)?)?;
        let key_agreement = key_agreement.map(CoseKey::try_from).transpose()?;
        let pin_uv_auth_param = pin_uv_auth_param.map(extract_byte_string).transpose()?;
        let new_pin_enc = new_pin_enc.map(extract_byte_string).transpose()?;
        let pin_hash_enc = pin_hash_enc.map(extract_byte_string).transpose()?;

        Ok(ClientPinParameters {
            pin_uv_auth_protocol,
            sub_command,
            key_agreement,
            pin_uv_auth_param,
            new_pin_enc,
            pin_hash_enc,
        })
    }
}

fn parse_credential_list(
    list: Option<cbor::Value>,
) -> Result<Vec<PublicKeyCredentialDescriptor>, Ctap2StatusCode> {
    match list {
        Some(list) => extract_array(list)?
            .into_iter()
            .map(PublicKeyCredentialDescriptor::try_from)
            .collect(),
        None => Ok(Vec::new()),
    }
}

// Unknown extensions are ignored, hmac-secret must be a boolean.
fn parse_hmac_secret_extension(extensions: Option<cbor::Value>) -> Result<bool, Ctap2StatusCode> {
    let extensions = match extensions {
        Some(extensions) => extract_map(extensions)?,
        None => return Ok(false),
    };
    match extensions.get(&cbor::KeyType::from(HMAC_SECRET_EXTENSION)) {
        Some(hmac_secret) => extract_bool(hmac_secret.clone()),
        None => Ok(false),
    }
}

pub struct SimulatedAuthenticator {
    rng: StdRng,
    faults: Faults,
    credentials: Vec<Credential>,
    // Global for all credentials, and kept over reset.
    signature_counter: u32,
    pin_hash: Option<[u8; PIN_HASH_LENGTH]>,
    pin_retries: u8,
    consecutive_pin_mismatches: u8,
    key_agreement_key: KeyAgreementKey,
    pin_uv_auth_token: [u8; PIN_TOKEN_LENGTH],
    reset_timer: TestTimer,
    request_count: usize,
}

impl SimulatedAuthenticator {
    /// Powers up a factory new authenticator.
    pub fn new(seed: u64, faults: Faults, clock: &mut TestClock) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let key_agreement_key = KeyAgreementKey::random(&mut rng);
        let mut pin_uv_auth_token = [0; PIN_TOKEN_LENGTH];
        rng.fill_bytes(&mut pin_uv_auth_token);
        SimulatedAuthenticator {
            rng,
            faults,
            credentials: Vec::new(),
            signature_counter: 0,
            pin_hash: None,
            pin_retries: MAX_PIN_RETRIES,
            consecutive_pin_mismatches: 0,
            key_agreement_key,
            pin_uv_auth_token,
            reset_timer: clock.make_timer(RESET_WINDOW_MS),
            request_count: 0,
        }
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Number of stored resident credentials.
    pub fn resident_credential_count(&self) -> usize {
        self.credentials.iter().filter(|c| c.is_resident).count()
    }

    /// Number of requests received, including rejected ones.
    pub fn request_count(&self) -> usize {
        self.request_count
    }

    /// Loses all state that is not persistent, and restarts the reset window.
    pub fn power_cycle(&mut self, clock: &mut TestClock) {
        self.consecutive_pin_mismatches = 0;
        self.regenerate_key_agreement_key();
        self.rng.fill_bytes(&mut self.pin_uv_auth_token);
        self.reset_timer = clock.make_timer(RESET_WINDOW_MS);
    }

    /// Processes a serialized request and returns the status byte followed by the CBOR payload.
    pub fn process_command(
        &mut self,
        command: Command,
        request: &[u8],
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Vec<u8> {
        self.request_count += 1;
        let result = self.process_request(command, request, user_presence, clock);
        // A touch is only noticed during the command it was given for.
        user_presence.clear();
        match result {
            Ok(None) => vec![Ctap2StatusCode::CTAP2_OK as u8],
            Ok(Some(response)) => {
                let mut encoded = vec![Ctap2StatusCode::CTAP2_OK as u8];
                if cbor::write(response, &mut encoded).is_err() {
                    return vec![Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR as u8];
                }
                encoded
            }
            Err(status) => vec![status as u8],
        }
    }

    fn process_request(
        &mut self,
        command: Command,
        request: &[u8],
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Result<Option<cbor::Value>, Ctap2StatusCode> {
        let max_nesting_depth = if self.faults.ignore_depth_limit {
            None
        } else if self.faults.strict_depth_limit {
            Some(cbor::MAX_NESTING_DEPTH - 1)
        } else {
            Some(cbor::MAX_NESTING_DEPTH)
        };
        let parameters = if request.is_empty() {
            None
        } else {
            match cbor::read_nested(request, max_nesting_depth) {
                Ok(parameters) => Some(parameters),
                Err(error) => {
                    if self.faults.restart_on_malformed_request {
                        self.power_cycle(clock);
                    }
                    return Err(error.into());
                }
            }
        };
        let result = match command {
            Command::AuthenticatorMakeCredential => {
                MakeCredentialParameters::try_from(ok_or_missing(parameters)?)
                    .and_then(|p| self.make_credential(p, user_presence, clock))
                    .map(Some)
            }
            Command::AuthenticatorGetAssertion => {
                GetAssertionParameters::try_from(ok_or_missing(parameters)?)
                    .and_then(|p| self.get_assertion(p, user_presence, clock))
                    .map(Some)
            }
            Command::AuthenticatorGetInfo => Ok(Some(self.get_info())),
            Command::AuthenticatorClientPin => {
                ClientPinParameters::try_from(ok_or_missing(parameters)?)
                    .and_then(|p| self.client_pin(p))
                    .map(Some)
            }
            Command::AuthenticatorReset => self.reset(user_presence, clock).map(|_| None),
            // No assertion is ever pending.
            Command::AuthenticatorGetNextAssertion => Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED),
        };
        match result {
            Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
                if self.faults.skip_type_checks =>
            {
                Ok(None)
            }
            result => result,
        }
    }

    fn regenerate_key_agreement_key(&mut self) {
        self.key_agreement_key = KeyAgreementKey::random(&mut self.rng);
    }

    // Checks a pinUvAuthParam before anything else is looked at.
    fn check_pin_uv_auth_param_precondition(
        &self,
        pin_uv_auth_param: &Option<Vec<u8>>,
        pin_uv_auth_protocol: Option<u64>,
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Result<(), Ctap2StatusCode> {
        if let Some(auth_param) = pin_uv_auth_param {
            let protocol = ok_or_missing(pin_uv_auth_protocol)?;
            // Zero length parameters are used by platforms to select an authenticator.
            if auth_param.is_empty() {
                user_presence.check(clock)?;
                return Err(if self.pin_hash.is_some() {
                    Ctap2StatusCode::CTAP2_ERR_PIN_INVALID
                } else {
                    Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET
                });
            }
            if protocol != PIN_PROTOCOL_V1 {
                return Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID);
            }
        }
        Ok(())
    }

    // Returns whether the user was verified.
    fn verify_pin_uv_auth_param(
        &self,
        pin_uv_auth_param: &Option<Vec<u8>>,
        client_data_hash: &[u8],
        required: bool,
    ) -> Result<bool, Ctap2StatusCode> {
        match (self.pin_hash.is_some(), pin_uv_auth_param) {
            (true, Some(auth_param)) => {
                verify_pin_uv_auth_token(&self.pin_uv_auth_token, client_data_hash, auth_param)?;
                Ok(true)
            }
            (true, None) if required => Err(Ctap2StatusCode::CTAP2_ERR_PUAT_REQUIRED),
            (false, Some(_)) => Err(Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET),
            _ => Ok(false),
        }
    }

    fn sign(
        private_key: &SigningKey,
        auth_data: &[u8],
        client_data_hash: &[u8],
    ) -> Vec<u8> {
        let mut signed_data = auth_data.to_vec();
        signed_data.extend_from_slice(client_data_hash);
        let signature: Signature = private_key.sign(&signed_data);
        signature.to_der().as_bytes().to_vec()
    }

    fn next_signature_count(&mut self) -> u32 {
        self.signature_counter = self.signature_counter.wrapping_add(1);
        self.signature_counter
    }

    fn make_credential(
        &mut self,
        parameters: MakeCredentialParameters,
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        let MakeCredentialParameters {
            client_data_hash,
            rp,
            user,
            pub_key_cred_params,
            exclude_list,
            hmac_secret,
            options,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        } = parameters;

        self.check_pin_uv_auth_param_precondition(
            &pin_uv_auth_param,
            pin_uv_auth_protocol,
            user_presence,
            clock,
        )?;
        if options.up == Some(false) || options.uv == Some(true) {
            return Err(Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION);
        }
        let has_es256 = pub_key_cred_params.iter().any(|param| {
            param.cred_type == PublicKeyCredentialType::PublicKey && param.alg == ES256_ALGORITHM
        });
        if !has_es256 {
            return Err(Ctap2StatusCode::CTAP2_ERR_UNSUPPORTED_ALGORITHM);
        }
        let user_verified =
            self.verify_pin_uv_auth_param(&pin_uv_auth_param, &client_data_hash, true)?;

        let is_excluded = exclude_list.iter().any(|descriptor| {
            self.credentials.iter().any(|credential| {
                credential.rp_id == rp.rp_id && credential.credential_id == descriptor.key_id
            })
        });
        if is_excluded {
            user_presence.check(clock)?;
            return Err(Ctap2StatusCode::CTAP2_ERR_CREDENTIAL_EXCLUDED);
        }

        user_presence.check(clock)?;

        let is_resident = options.rk.unwrap_or(false);
        if is_resident {
            let replaces_existing = self.credentials.iter().any(|credential| {
                credential.is_resident
                    && credential.rp_id == rp.rp_id
                    && credential.user_handle == user.user_id
            });
            if !replaces_existing && self.resident_credential_count() >= MAX_RESIDENT_CREDENTIALS
            {
                return Err(Ctap2StatusCode::CTAP2_ERR_KEY_STORE_FULL);
            }
            self.credentials.retain(|credential| {
                !(credential.is_resident
                    && credential.rp_id == rp.rp_id
                    && credential.user_handle == user.user_id)
            });
        }

        let private_key = SigningKey::random(&mut self.rng);
        let mut credential_id = vec![0; CREDENTIAL_ID_SIZE];
        self.rng.fill_bytes(&mut credential_id);
        let mut flags = AuthenticatorData::UP_FLAG;
        if user_verified {
            flags |= AuthenticatorData::UV_FLAG;
        }
        let auth_data = AuthenticatorData {
            rp_id_hash: Sha256::digest(rp.rp_id.as_bytes()).into(),
            flags,
            sign_count: self.next_signature_count(),
            attested_credential_data: Some(AttestedCredentialData {
                aaguid: AAGUID,
                credential_id: credential_id.clone(),
                public_key: CoseKey::from_ecdsa_public_key(&VerifyingKey::from(&private_key)),
            }),
            extensions: if hmac_secret {
                Some(cbor_map! { HMAC_SECRET_EXTENSION => true })
            } else {
                None
            },
        }
        .to_bytes()?;
        let signature = SimulatedAuthenticator::sign(&private_key, &auth_data, &client_data_hash);

        self.credentials.push(Credential {
            credential_id,
            private_key,
            rp_id: rp.rp_id,
            user_handle: user.user_id,
            is_resident,
        });

        Ok(cbor_map! {
            1 => "packed",
            2 => auth_data,
            3 => cbor_map! {
                "alg" => ES256_ALGORITHM,
                "sig" => signature,
            },
        })
    }

    fn get_assertion(
        &mut self,
        parameters: GetAssertionParameters,
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        let GetAssertionParameters {
            rp_id,
            client_data_hash,
            allow_list,
            options,
            pin_uv_auth_param,
            pin_uv_auth_protocol,
        } = parameters;

        self.check_pin_uv_auth_param_precondition(
            &pin_uv_auth_param,
            pin_uv_auth_protocol,
            user_presence,
            clock,
        )?;
        if options.rk.is_some() || options.uv == Some(true) {
            return Err(Ctap2StatusCode::CTAP2_ERR_INVALID_OPTION);
        }
        let user_verified =
            self.verify_pin_uv_auth_param(&pin_uv_auth_param, &client_data_hash, false)?;

        // Newest credentials first.
        let applicable: Vec<usize> = if allow_list.is_empty() {
            (0..self.credentials.len())
                .rev()
                .filter(|&i| {
                    self.credentials[i].is_resident && self.credentials[i].rp_id == rp_id
                })
                .collect()
        } else {
            allow_list
                .iter()
                .filter_map(|descriptor| {
                    self.credentials.iter().position(|credential| {
                        credential.rp_id == rp_id && credential.credential_id == descriptor.key_id
                    })
                })
                .collect()
        };
        let index = *applicable
            .first()
            .ok_or(Ctap2StatusCode::CTAP2_ERR_NO_CREDENTIALS)?;

        let user_present = options.up.unwrap_or(true);
        if user_present {
            user_presence.check(clock)?;
        }

        let mut flags = 0;
        if user_present {
            flags |= AuthenticatorData::UP_FLAG;
        }
        if user_verified {
            flags |= AuthenticatorData::UV_FLAG;
        }
        let auth_data = AuthenticatorData {
            rp_id_hash: Sha256::digest(rp_id.as_bytes()).into(),
            flags,
            sign_count: self.next_signature_count(),
            attested_credential_data: None,
            extensions: None,
        }
        .to_bytes()?;
        let credential = &self.credentials[index];
        let signature =
            SimulatedAuthenticator::sign(&credential.private_key, &auth_data, &client_data_hash);
        let user = if credential.is_resident {
            Some(cbor_map! { "id" => credential.user_handle.clone() })
        } else {
            None
        };
        let number_of_credentials = if allow_list.is_empty() && applicable.len() > 1 {
            Some(applicable.len() as u64)
        } else {
            None
        };

        let descriptor = PublicKeyCredentialDescriptor::new(credential.credential_id.clone());
        Ok(cbor_map_options! {
            1 => cbor::Value::from(descriptor),
            2 => auth_data,
            3 => signature,
            4 => user,
            5 => number_of_credentials,
        })
    }

    fn get_info(&self) -> cbor::Value {
        cbor_map! {
            1 => cbor_array!["FIDO_2_0", "FIDO_2_1"],
            2 => cbor_array![HMAC_SECRET_EXTENSION],
            3 => AAGUID.to_vec(),
            4 => cbor_map! {
                "rk" => true,
                "up" => true,
                "plat" => false,
                "clientPin" => self.pin_hash.is_some(),
            },
            5 => MAX_MSG_SIZE,
            6 => cbor_array![PIN_PROTOCOL_V1],
        }
    }

    fn client_pin(
        &mut self,
        parameters: ClientPinParameters,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        if parameters.pin_uv_auth_protocol != PIN_PROTOCOL_V1 {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER);
        }
        match parameters.sub_command {
            ClientPinSubCommand::GetPinRetries => Ok(cbor_map! {
                3 => self.pin_retries as u64,
            }),
            ClientPinSubCommand::GetKeyAgreement => Ok(cbor_map! {
                1 => cbor::Value::from(self.key_agreement_key.public_key()),
            }),
            ClientPinSubCommand::SetPin => self.process_set_pin(parameters),
            ClientPinSubCommand::ChangePin => self.process_change_pin(parameters),
            ClientPinSubCommand::GetPinToken => self.process_get_pin_token(parameters),
            ClientPinSubCommand::GetPinUvAuthTokenUsingUvWithPermissions => {
                ok_or_missing(parameters.key_agreement)?;
                // There is no built-in user verification.
                Err(Ctap2StatusCode::CTAP2_ERR_INVALID_SUBCOMMAND)
            }
            ClientPinSubCommand::GetUvRetries => Err(Ctap2StatusCode::CTAP2_ERR_INVALID_SUBCOMMAND),
        }
    }

    fn check_and_store_new_pin(
        &mut self,
        shared_secret: &SharedSecret,
        new_pin_enc: &[u8],
    ) -> Result<(), Ctap2StatusCode> {
        if new_pin_enc.len() != PADDED_PIN_LENGTH {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION);
        }
        let padded_pin = shared_secret.decrypt(new_pin_enc)?;
        let pin_length = padded_pin
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(padded_pin.len());
        if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin_length) {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION);
        }
        self.pin_hash = Some(pin_hash(&padded_pin[..pin_length]));
        self.pin_retries = MAX_PIN_RETRIES;
        Ok(())
    }

    fn verify_pin_hash_enc(
        &mut self,
        shared_secret: &SharedSecret,
        pin_hash_enc: &[u8],
    ) -> Result<(), Ctap2StatusCode> {
        let stored_hash = self.pin_hash.ok_or(Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET)?;
        if self.pin_retries == 0 {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_BLOCKED);
        }
        if self.consecutive_pin_mismatches >= MAX_CONSECUTIVE_PIN_MISMATCHES {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED);
        }
        if pin_hash_enc.len() != PIN_HASH_LENGTH {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER);
        }
        self.pin_retries -= 1;
        let pin_hash_dec = shared_secret
            .decrypt(pin_hash_enc)
            .map_err(|_| Ctap2StatusCode::CTAP2_ERR_PIN_INVALID)?;
        if !bool::from(stored_hash.ct_eq(pin_hash_dec.as_slice())) {
            if !self.faults.keep_key_agreement_after_mismatch {
                self.regenerate_key_agreement_key();
            }
            if self.pin_retries == 0 {
                return Err(Ctap2StatusCode::CTAP2_ERR_PIN_BLOCKED);
            }
            self.consecutive_pin_mismatches += 1;
            if self.consecutive_pin_mismatches >= MAX_CONSECUTIVE_PIN_MISMATCHES {
                return Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED);
            }
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID);
        }
        self.pin_retries = MAX_PIN_RETRIES;
        self.consecutive_pin_mismatches = 0;
        Ok(())
    }

    fn process_set_pin(
        &mut self,
        parameters: ClientPinParameters,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        let key_agreement = ok_or_missing(parameters.key_agreement)?;
        let pin_uv_auth_param = ok_or_missing(parameters.pin_uv_auth_param)?;
        let new_pin_enc = ok_or_missing(parameters.new_pin_enc)?;

        if self.pin_hash.is_some() {
            return Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED);
        }
        let shared_secret = self.key_agreement_key.decapsulate(&key_agreement)?;
        shared_secret.verify(&new_pin_enc, &pin_uv_auth_param)?;
        self.check_and_store_new_pin(&shared_secret, &new_pin_enc)?;
        Ok(cbor_map! {})
    }

    fn process_change_pin(
        &mut self,
        parameters: ClientPinParameters,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        let key_agreement = ok_or_missing(parameters.key_agreement)?;
        let pin_uv_auth_param = ok_or_missing(parameters.pin_uv_auth_param)?;
        let new_pin_enc = ok_or_missing(parameters.new_pin_enc)?;
        let pin_hash_enc = ok_or_missing(parameters.pin_hash_enc)?;

        if self.pin_hash.is_none() {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET);
        }
        let shared_secret = self.key_agreement_key.decapsulate(&key_agreement)?;
        let mut auth_message = new_pin_enc.clone();
        auth_message.extend_from_slice(&pin_hash_enc);
        shared_secret.verify(&auth_message, &pin_uv_auth_param)?;
        self.verify_pin_hash_enc(&shared_secret, &pin_hash_enc)?;
        self.check_and_store_new_pin(&shared_secret, &new_pin_enc)?;
        self.rng.fill_bytes(&mut self.pin_uv_auth_token);
        Ok(cbor_map! {})
    }

    fn process_get_pin_token(
        &mut self,
        parameters: ClientPinParameters,
    ) -> Result<cbor::Value, Ctap2StatusCode> {
        let key_agreement = ok_or_missing(parameters.key_agreement)?;
        let pin_hash_enc = ok_or_missing(parameters.pin_hash_enc)?;

        if self.pin_hash.is_none() {
            return Err(Ctap2StatusCode::CTAP2_ERR_PIN_NOT_SET);
        }
        let shared_secret = self.key_agreement_key.decapsulate(&key_agreement)?;
        self.verify_pin_hash_enc(&shared_secret, &pin_hash_enc)?;
        let pin_token_enc = shared_secret.encrypt(&self.pin_uv_auth_token)?;
        Ok(cbor_map! {
            2 => pin_token_enc,
        })
    }

    fn reset(
        &mut self,
        user_presence: &mut TestUserPresence,
        clock: &mut TestClock,
    ) -> Result<(), Ctap2StatusCode> {
        if clock.is_elapsed(&self.reset_timer) {
            return Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED);
        }
        user_presence.check(clock)?;
        self.credentials.clear();
        self.pin_hash = None;
        self.pin_retries = MAX_PIN_RETRIES;
        self.consecutive_pin_mismatches = 0;
        self.regenerate_key_agreement_key();
        self.rng.fill_bytes(&mut self.pin_uv_auth_token);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::TestEnv;
    use super::*;
    use crate::api::device::Device;
    use crate::api::prompt::Prompt;
    use crate::ctap::data_formats::{
        AuthenticatorInfo, ClientPinResponse, GetAssertionResponse, MakeCredentialResponse,
    };
    use crate::ctap::pin_protocol::{authenticate_pin_uv_auth_token, pad_pin};
    use ctap_cbor::{cbor_bytes, cbor_int, cbor_text};
    use p256::ecdsa::signature::Verifier;

    const CLIENT_DATA_HASH: [u8; 32] = [0xCD; 32];

    fn make_credential_parameters(rp_id: &str, rk: bool) -> cbor::Value {
        cbor_map! {
            1 => CLIENT_DATA_HASH.to_vec(),
            2 => PublicKeyCredentialRpEntity::new(rp_id),
            3 => PublicKeyCredentialUserEntity::new(vec![0x1D; 32], "John Doe"),
            4 => cbor_array![PublicKeyCredentialParameter::es256()],
            7 => cbor_map! { "rk" => rk },
        }
    }

    fn make_credential(env: &mut TestEnv, rp_id: &str, rk: bool) -> MakeCredentialResponse {
        env.request_touch();
        let response = env
            .send(
                Command::AuthenticatorMakeCredential,
                Some(&make_credential_parameters(rp_id, rk)),
            )
            .unwrap();
        MakeCredentialResponse::try_from(response).unwrap()
    }

    fn get_assertion_parameters(rp_id: &str) -> cbor::Value {
        cbor_map! {
            1 => rp_id,
            2 => CLIENT_DATA_HASH.to_vec(),
        }
    }

    fn shared_secret(env: &mut TestEnv) -> (KeyAgreementKey, SharedSecret) {
        let parameters = cbor_map! {
            1 => 1,
            2 => ClientPinSubCommand::GetKeyAgreement,
        };
        let response = env
            .send(Command::AuthenticatorClientPin, Some(&parameters))
            .unwrap();
        let device_key = ClientPinResponse::try_from(response)
            .unwrap()
            .key_agreement
            .unwrap();
        let platform_key = KeyAgreementKey::random(&mut StdRng::seed_from_u64(7));
        let shared_secret = platform_key.decapsulate(&device_key).unwrap();
        (platform_key, shared_secret)
    }

    fn set_pin(env: &mut TestEnv, pin: &[u8]) -> Result<cbor::Value, Ctap2StatusCode> {
        let (platform_key, shared_secret) = shared_secret(env);
        let new_pin_enc = shared_secret
            .encrypt(&pad_pin(pin, PADDED_PIN_LENGTH))
            .unwrap();
        let parameters = cbor_map! {
            1 => 1,
            2 => ClientPinSubCommand::SetPin,
            3 => platform_key.public_key(),
            4 => shared_secret.authenticate(&new_pin_enc).unwrap(),
            5 => new_pin_enc,
        };
        env.send(Command::AuthenticatorClientPin, Some(&parameters))
    }

    fn get_pin_token(
        env: &mut TestEnv,
        shared: &(KeyAgreementKey, SharedSecret),
        pin: &[u8],
    ) -> Result<Vec<u8>, Ctap2StatusCode> {
        let (platform_key, shared_secret) = shared;
        let parameters = cbor_map! {
            1 => 1,
            2 => ClientPinSubCommand::GetPinToken,
            3 => platform_key.public_key(),
            6 => shared_secret.encrypt(&pin_hash(pin)).unwrap(),
        };
        let response = env.send(Command::AuthenticatorClientPin, Some(&parameters))?;
        let pin_token_enc = ClientPinResponse::try_from(response)?.pin_token.unwrap();
        shared_secret.decrypt(&pin_token_enc)
    }

    fn pin_retries(env: &mut TestEnv) -> u64 {
        let parameters = cbor_map! {
            1 => 1,
            2 => ClientPinSubCommand::GetPinRetries,
        };
        let response = env
            .send(Command::AuthenticatorClientPin, Some(&parameters))
            .unwrap();
        ClientPinResponse::try_from(response).unwrap().retries.unwrap()
    }

    #[test]
    fn test_get_info() {
        let mut env = TestEnv::new();
        let response = env.send(Command::AuthenticatorGetInfo, None).unwrap();
        let info = AuthenticatorInfo::try_from(response).unwrap();
        assert!(info.is_fido_2_1_compliant());
        assert!(info.is_hmac_secret_supported());
        assert_eq!(info.option("clientPin"), Some(false));
        assert_eq!(info.pin_protocols, vec![1]);
        assert_eq!(info.aaguid, AAGUID.to_vec());

        set_pin(&mut env, b"1234").unwrap();
        let response = env.send(Command::AuthenticatorGetInfo, None).unwrap();
        let info = AuthenticatorInfo::try_from(response).unwrap();
        assert_eq!(info.option("clientPin"), Some(true));
    }

    #[test]
    fn test_make_credential_and_get_assertion() {
        let mut env = TestEnv::new();
        let credential = make_credential(&mut env, "example.com", true);
        assert_eq!(credential.fmt, "packed");
        assert!(credential.auth_data.user_present());
        let attested = credential.auth_data.attested_credential_data.unwrap();
        assert_eq!(attested.credential_id.len(), CREDENTIAL_ID_SIZE);

        env.request_touch();
        let response = env
            .send(
                Command::AuthenticatorGetAssertion,
                Some(&get_assertion_parameters("example.com")),
            )
            .unwrap();
        let assertion = GetAssertionResponse::try_from(response).unwrap();
        assert_eq!(assertion.credential.unwrap().key_id, attested.credential_id);
        assert!(assertion.auth_data.sign_count > credential.auth_data.sign_count);

        let verifying_key = attested.public_key.to_verifying_key().unwrap();
        let mut signed_data = assertion.auth_data_bytes.clone();
        signed_data.extend_from_slice(&CLIENT_DATA_HASH);
        let signature = Signature::from_der(&assertion.signature).unwrap();
        assert!(verifying_key.verify(&signed_data, &signature).is_ok());
    }

    #[test]
    fn test_user_presence_required() {
        let mut env = TestEnv::new();
        assert_eq!(
            env.send(
                Command::AuthenticatorMakeCredential,
                Some(&make_credential_parameters("example.com", true)),
            ),
            Err(Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT)
        );
        make_credential(&mut env, "example.com", true);
        let mut parameters = get_assertion_parameters("example.com");
        if let cbor::Value::Map(map) = &mut parameters {
            map.insert(cbor::KeyType::from(5), cbor_map! { "up" => false });
        }
        let response = env
            .send(Command::AuthenticatorGetAssertion, Some(&parameters))
            .unwrap();
        let assertion = GetAssertionResponse::try_from(response).unwrap();
        assert!(!assertion.auth_data.user_present());
    }

    #[test]
    fn test_parameter_checks() {
        let mut env = TestEnv::new();
        assert_eq!(
            env.send(Command::AuthenticatorMakeCredential, None),
            Err(Ctap2StatusCode::CTAP2_ERR_MISSING_PARAMETER)
        );
        assert_eq!(
            env.send(Command::AuthenticatorMakeCredential, Some(&cbor_int!(1))),
            Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
        );
        let parameters = cbor_map! {
            1 => CLIENT_DATA_HASH.to_vec(),
            2 => cbor_text!("example.com"),
        };
        assert_eq!(
            env.send(Command::AuthenticatorMakeCredential, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
        );
        let parameters = cbor_map! {
            1 => cbor_text!("example.com"),
            2 => cbor_bytes!(CLIENT_DATA_HASH.to_vec()),
            5 => cbor_map! { "unknown" => 1 },
        };
        assert_eq!(
            env.send(Command::AuthenticatorGetAssertion, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
        );

        env.authenticator().faults_mut().skip_type_checks = true;
        assert!(env
            .send(Command::AuthenticatorMakeCredential, Some(&cbor_int!(1)))
            .is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let mut env = TestEnv::new();
        let mut parameters = get_assertion_parameters("example.com");
        if let cbor::Value::Map(map) = &mut parameters {
            let descriptor = cbor_map! {
                "id" => vec![0x01; 32],
                "transports" => cbor_array![cbor_array![1]],
                "type" => "public-key",
            };
            map.insert(cbor::KeyType::from(3), cbor_array![descriptor]);
        }
        assert_eq!(
            env.send(Command::AuthenticatorGetAssertion, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_INVALID_CBOR)
        );
        env.authenticator().faults_mut().ignore_depth_limit = true;
        assert_eq!(
            env.send(Command::AuthenticatorGetAssertion, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_CBOR_UNEXPECTED_TYPE)
        );
    }

    #[test]
    fn test_exclude_list() {
        let mut env = TestEnv::new();
        let credential = make_credential(&mut env, "example.com", false);
        let mut parameters = make_credential_parameters("example.com", false);
        if let cbor::Value::Map(map) = &mut parameters {
            let credential_id = credential.credential_id().unwrap().to_vec();
            map.insert(
                cbor::KeyType::from(5),
                cbor_array![PublicKeyCredentialDescriptor::new(credential_id)],
            );
        }
        env.request_touch();
        assert_eq!(
            env.send(Command::AuthenticatorMakeCredential, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_CREDENTIAL_EXCLUDED)
        );
    }

    #[test]
    fn test_key_store_full() {
        let mut env = TestEnv::new();
        for i in 0..MAX_RESIDENT_CREDENTIALS {
            let mut parameters = make_credential_parameters("example.com", true);
            if let cbor::Value::Map(map) = &mut parameters {
                let user_id = vec![0x10 + i as u8; 32];
                let user = PublicKeyCredentialUserEntity::new(user_id, "Greedy Greg");
                map.insert(cbor::KeyType::from(3), user.into());
            }
            env.request_touch();
            assert!(env
                .send(Command::AuthenticatorMakeCredential, Some(&parameters))
                .is_ok());
        }
        env.request_touch();
        let mut parameters = make_credential_parameters("example.com", true);
        if let cbor::Value::Map(map) = &mut parameters {
            let user = PublicKeyCredentialUserEntity::new(vec![0xFF; 32], "Greedy Greg");
            map.insert(cbor::KeyType::from(3), user.into());
        }
        assert_eq!(
            env.send(Command::AuthenticatorMakeCredential, Some(&parameters)),
            Err(Ctap2StatusCode::CTAP2_ERR_KEY_STORE_FULL)
        );
        // Credentials of the same user are overwritten.
        make_credential(&mut env, "example.com", true);
        assert_eq!(
            env.authenticator().resident_credential_count(),
            MAX_RESIDENT_CREDENTIALS
        );
    }

    #[test]
    fn test_pin_policy() {
        let mut env = TestEnv::new();
        assert_eq!(
            set_pin(&mut env, b"123"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION)
        );
        assert_eq!(
            set_pin(&mut env, &[0x30; 64]),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_POLICY_VIOLATION)
        );
        assert!(set_pin(&mut env, &[0x30; 63]).is_ok());
        assert_eq!(
            set_pin(&mut env, b"1234"),
            Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED)
        );
    }

    #[test]
    fn test_pin_token_authorizes_make_credential() {
        let mut env = TestEnv::new();
        set_pin(&mut env, b"1234").unwrap();
        env.request_touch();
        assert_eq!(
            env.send(
                Command::AuthenticatorMakeCredential,
                Some(&make_credential_parameters("example.com", false)),
            ),
            Err(Ctap2StatusCode::CTAP2_ERR_PUAT_REQUIRED)
        );

        let shared = shared_secret(&mut env);
        let pin_token = get_pin_token(&mut env, &shared, b"1234").unwrap();
        let mut parameters = make_credential_parameters("example.com", false);
        if let cbor::Value::Map(map) = &mut parameters {
            let pin_auth =
                authenticate_pin_uv_auth_token(&pin_token, &CLIENT_DATA_HASH).unwrap();
            map.insert(cbor::KeyType::from(8), pin_auth.into());
            map.insert(cbor::KeyType::from(9), 1.into());
        }
        env.request_touch();
        let response = env
            .send(Command::AuthenticatorMakeCredential, Some(&parameters))
            .unwrap();
        let credential = MakeCredentialResponse::try_from(response).unwrap();
        assert!(credential.auth_data.user_verified());
    }

    #[test]
    fn test_pin_retries() {
        let mut env = TestEnv::new();
        set_pin(&mut env, b"1234").unwrap();
        assert_eq!(pin_retries(&mut env), MAX_PIN_RETRIES as u64);

        for _ in 0..2 {
            let shared = shared_secret(&mut env);
            assert_eq!(
                get_pin_token(&mut env, &shared, b"fake"),
                Err(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID)
            );
        }
        let shared = shared_secret(&mut env);
        assert_eq!(
            get_pin_token(&mut env, &shared, b"fake"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED)
        );
        let shared = shared_secret(&mut env);
        assert_eq!(
            get_pin_token(&mut env, &shared, b"1234"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED)
        );
        assert_eq!(pin_retries(&mut env), MAX_PIN_RETRIES as u64 - 3);

        env.prompt_replug();
        let shared = shared_secret(&mut env);
        assert!(get_pin_token(&mut env, &shared, b"1234").is_ok());
        assert_eq!(pin_retries(&mut env), MAX_PIN_RETRIES as u64);
    }

    #[test]
    fn test_key_agreement_after_mismatch() {
        let mut env = TestEnv::new();
        set_pin(&mut env, b"1234").unwrap();
        let shared = shared_secret(&mut env);
        assert_eq!(
            get_pin_token(&mut env, &shared, b"fake"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID)
        );
        assert_eq!(
            get_pin_token(&mut env, &shared, b"1234"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID)
        );

        env.authenticator().faults_mut().keep_key_agreement_after_mismatch = true;
        let shared = shared_secret(&mut env);
        assert_eq!(
            get_pin_token(&mut env, &shared, b"fake"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_BLOCKED)
        );
        env.prompt_replug();
        let shared = shared_secret(&mut env);
        assert_eq!(
            get_pin_token(&mut env, &shared, b"fake"),
            Err(Ctap2StatusCode::CTAP2_ERR_PIN_INVALID)
        );
        assert!(get_pin_token(&mut env, &shared, b"1234").is_ok());
    }

    #[test]
    fn test_reset() {
        let mut env = TestEnv::new();
        let credential = make_credential(&mut env, "example.com", true);
        set_pin(&mut env, b"1234").unwrap();
        env.request_touch();
        assert!(env.send(Command::AuthenticatorReset, None).is_ok());
        assert_eq!(env.authenticator().resident_credential_count(), 0);

        // The signature counter is global and survives reset.
        let new_credential = make_credential(&mut env, "example.com", true);
        assert!(new_credential.auth_data.sign_count > credential.auth_data.sign_count);
        assert!(set_pin(&mut env, b"1234").is_ok());

        env.wait(RESET_WINDOW_MS);
        env.request_touch();
        assert_eq!(
            env.send(Command::AuthenticatorReset, None),
            Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED)
        );
    }
}

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

//! Request parameters for one command, with each entry flagged as required or optional.
//!
//! The constructors fill in canonical values for all required entries. Setters for optional
//! entries know where the parameter lives for MakeCredential, GetAssertion and ClientPIN.

use super::command::Command;
use super::data_formats::{
    ClientPinSubCommand, CoseKey, PublicKeyCredentialDescriptor, PublicKeyCredentialParameter,
    PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity,
};
use super::pin_protocol::authenticate_pin_uv_auth_token;
use super::status_code::Ctap2StatusCode;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use ctap_cbor as cbor;
use ctap_cbor::{cbor_array, cbor_map};

pub const DEFAULT_CLIENT_DATA_HASH: [u8; 32] = [0xCD; 32];
pub const DEFAULT_USER_ID: [u8; 32] = [0x1D; 32];
pub const DEFAULT_USER_NAME: &str = "Adam";
pub const PIN_PROTOCOL_V1: u64 = 1;

#[derive(Clone, Debug, PartialEq)]
struct TemplateEntry {
    value: cbor::Value,
    required: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandTemplate {
    command: Command,
    entries: BTreeMap<u64, TemplateEntry>,
}

impl CommandTemplate {
    pub fn new(command: Command) -> Self {
        CommandTemplate {
            command,
            entries: BTreeMap::new(),
        }
    }

    /// MakeCredential with the default client data hash, user and ES256 parameters.
    pub fn make_credential(rp_id: &str) -> Self {
        let mut template = CommandTemplate::new(Command::AuthenticatorMakeCredential);
        template.set_required(1, DEFAULT_CLIENT_DATA_HASH.to_vec());
        template.set_required(2, PublicKeyCredentialRpEntity::new(rp_id));
        template.set_required(
            3,
            PublicKeyCredentialUserEntity::new(DEFAULT_USER_ID.to_vec(), DEFAULT_USER_NAME),
        );
        template.set_required(4, cbor_array![PublicKeyCredentialParameter::es256()]);
        template
    }

    pub fn get_assertion(rp_id: &str) -> Self {
        let mut template = CommandTemplate::new(Command::AuthenticatorGetAssertion);
        template.set_required(1, rp_id);
        template.set_required(2, DEFAULT_CLIENT_DATA_HASH.to_vec());
        template
    }

    /// ClientPIN with protocol version 1 and the given subcommand, as for getPinRetries.
    pub fn client_pin(subcommand: ClientPinSubCommand) -> Self {
        let mut template = CommandTemplate::new(Command::AuthenticatorClientPin);
        template.set_required(1, PIN_PROTOCOL_V1);
        template.set_required(2, subcommand);
        template
    }

    pub fn client_pin_set_pin(
        key_agreement: CoseKey,
        pin_auth: Vec<u8>,
        new_pin_enc: Vec<u8>,
    ) -> Self {
        let mut template = CommandTemplate::client_pin(ClientPinSubCommand::SetPin);
        template.set_required(3, key_agreement);
        template.set_required(4, pin_auth);
        template.set_required(5, new_pin_enc);
        template
    }

    pub fn client_pin_change_pin(
        key_agreement: CoseKey,
        pin_auth: Vec<u8>,
        new_pin_enc: Vec<u8>,
        pin_hash_enc: Vec<u8>,
    ) -> Self {
        let mut template = CommandTemplate::client_pin(ClientPinSubCommand::ChangePin);
        template.set_required(3, key_agreement);
        template.set_required(4, pin_auth);
        template.set_required(5, new_pin_enc);
        template.set_required(6, pin_hash_enc);
        template
    }

    pub fn client_pin_get_pin_token(key_agreement: CoseKey, pin_hash_enc: Vec<u8>) -> Self {
        let mut template = CommandTemplate::client_pin(ClientPinSubCommand::GetPinToken);
        template.set_required(3, key_agreement);
        template.set_required(6, pin_hash_enc);
        template
    }

    pub fn client_pin_get_pin_uv_auth_token_using_uv(key_agreement: CoseKey) -> Self {
        let mut template = CommandTemplate::client_pin(
            ClientPinSubCommand::GetPinUvAuthTokenUsingUvWithPermissions,
        );
        template.set_required(3, key_agreement);
        template
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn set_required(&mut self, key: u64, value: impl Into<cbor::Value>) {
        self.entries.insert(
            key,
            TemplateEntry {
                value: value.into(),
                required: true,
            },
        );
    }

    pub fn set_optional(&mut self, key: u64, value: impl Into<cbor::Value>) {
        self.entries.insert(
            key,
            TemplateEntry {
                value: value.into(),
                required: false,
            },
        );
    }

    /// Replaces the value at `key`, keeping its flag. New keys are optional.
    pub fn replace(&mut self, key: u64, value: cbor::Value) {
        let required = self.is_required(key);
        self.entries.insert(key, TemplateEntry { value, required });
    }

    pub fn remove(&mut self, key: u64) -> Option<cbor::Value> {
        self.entries.remove(&key).map(|entry| entry.value)
    }

    pub fn get(&self, key: u64) -> Option<&cbor::Value> {
        self.entries.get(&key).map(|entry| &entry.value)
    }

    pub fn has_entry(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_required(&self, key: u64) -> bool {
        self.entries.get(&key).map_or(false, |entry| entry.required)
    }

    /// Iterates over all entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &cbor::Value)> {
        self.entries.iter().map(|(key, entry)| (*key, &entry.value))
    }

    pub fn required_keys(&self) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.required)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn to_cbor(&self) -> cbor::Value {
        cbor::Value::Map(
            self.entries
                .iter()
                .map(|(key, entry)| (cbor::KeyType::Unsigned(*key), entry.value.clone()))
                .collect(),
        )
    }

    fn credential_list_key(&self) -> u64 {
        match self.command {
            Command::AuthenticatorGetAssertion => 3,
            _ => 5,
        }
    }

    fn extensions_key(&self) -> u64 {
        match self.command {
            Command::AuthenticatorGetAssertion => 4,
            _ => 6,
        }
    }

    fn options_key(&self) -> u64 {
        match self.command {
            Command::AuthenticatorGetAssertion => 5,
            _ => 7,
        }
    }

    fn pin_uv_auth_param_key(&self) -> u64 {
        match self.command {
            Command::AuthenticatorGetAssertion => 6,
            Command::AuthenticatorClientPin => 4,
            _ => 8,
        }
    }

    fn pin_uv_auth_protocol_key(&self) -> u64 {
        match self.command {
            Command::AuthenticatorGetAssertion => 7,
            Command::AuthenticatorClientPin => 1,
            _ => 9,
        }
    }

    pub fn set_user(&mut self, user: PublicKeyCredentialUserEntity) {
        self.set_required(3, user);
    }

    /// Sets the exclude list or allow list to one descriptor with the given ID.
    pub fn set_credential_list(&mut self, credential_id: Vec<u8>) {
        let key = self.credential_list_key();
        self.set_optional(key, cbor_array![PublicKeyCredentialDescriptor::new(credential_id)]);
    }

    pub fn set_extensions(&mut self, extensions: cbor::Value) {
        let key = self.extensions_key();
        self.set_optional(key, extensions);
    }

    /// Sets the options map, replacing all previous options.
    pub fn set_options(&mut self, options: &[(&str, bool)]) {
        let key = self.options_key();
        let options_map = options
            .iter()
            .map(|(name, value)| {
                (
                    cbor::KeyType::TextString(String::from(*name)),
                    cbor::Value::bool_value(*value),
                )
            })
            .collect();
        self.set_optional(key, cbor::Value::Map(options_map));
    }

    pub fn set_rk_option(&mut self, rk: bool) {
        self.set_options(&[("rk", rk)]);
    }

    pub fn set_up_option(&mut self, up: bool) {
        self.set_options(&[("up", up)]);
    }

    pub fn set_uv_option(&mut self, uv: bool) {
        self.set_options(&[("uv", uv)]);
    }

    /// Returns the user presence option, if the options map has one.
    pub fn up_option(&self) -> Option<bool> {
        self.get(self.options_key())
            .and_then(|options| options.as_map())
            .and_then(|options| options.get(&cbor::KeyType::TextString(String::from("up"))))
            .and_then(|up| up.as_bool())
    }

    pub fn set_pin_uv_auth_param(&mut self, pin_uv_auth_param: Vec<u8>) {
        let key = self.pin_uv_auth_param_key();
        self.set_optional(key, pin_uv_auth_param);
    }

    /// Authenticates the default client data hash with the token.
    pub fn set_default_pin_uv_auth_param(
        &mut self,
        pin_token: &[u8],
    ) -> Result<(), Ctap2StatusCode> {
        let pin_uv_auth_param =
            authenticate_pin_uv_auth_token(pin_token, &DEFAULT_CLIENT_DATA_HASH)?;
        self.set_pin_uv_auth_param(pin_uv_auth_param);
        Ok(())
    }

    pub fn set_pin_uv_auth_protocol(&mut self, protocol: u64) {
        let key = self.pin_uv_auth_protocol_key();
        self.set_optional(key, protocol);
    }

    pub fn set_default_pin_uv_auth_protocol(&mut self) {
        self.set_pin_uv_auth_protocol(PIN_PROTOCOL_V1);
    }
}

/// A credential descriptor with the given extra transport, for nesting depth checks.
pub fn descriptor_with_transport(credential_id: Vec<u8>, transport: cbor::Value) -> cbor::Value {
    cbor_map! {
        "id" => credential_id,
        "type" => "public-key",
        "transports" => cbor_array!["usb", transport],
    }
}

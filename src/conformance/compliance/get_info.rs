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
use crate::conformance::commands::get_info_positive;
use crate::conformance::error::ConformanceError;
use crate::conformance::Harness;
use crate::ctap::data_formats::AuthenticatorInfo;
use crate::env::Env;
use alloc::format;
use alloc::string::String;
use core::convert::TryFrom;
use core::fmt::Write;
use ctap_cbor as cbor;

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(2 * bytes.len());
    for byte in bytes {
        // Writing to a String never fails.
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

impl ProtocolComplianceEngine {
    /// Returns the GetInfo response, requesting it from the device on first use.
    ///
    /// The first response also initializes the device tracker.
    pub fn authenticator_info<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<AuthenticatorInfo, ConformanceError> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }
        let outcome = get_info_positive(harness);
        let response = self
            .tracker
            .assert_response(outcome, "correct GetInfo response")?;
        let entries = match &response {
            cbor::Value::Map(entries) => entries,
            _ => {
                return Err(ConformanceError::critical(
                    "GetInfo response is a map",
                    None,
                ))
            }
        };
        let aaguid = entries.get(&cbor::KeyType::Unsigned(3));
        self.tracker.assert_condition(
            matches!(aaguid, Some(cbor::Value::KeyValue(cbor::KeyType::ByteString(_)))),
            "AAGUID is a bytestring",
        )?;
        if let Some(cbor::Value::Array(pin_protocols)) = entries.get(&cbor::KeyType::Unsigned(6)) {
            for pin_protocol in pin_protocols {
                self.tracker.assert_condition(
                    matches!(pin_protocol, cbor::Value::KeyValue(cbor::KeyType::Unsigned(_))),
                    "PIN protocol version is unsigned",
                )?;
            }
        }
        let info = AuthenticatorInfo::try_from(response).map_err(|status| {
            ConformanceError::critical("parse the GetInfo response", Some(status))
        })?;

        harness
            .device_tracker
            .initialize(&info.versions, &info.extensions, &info.options);
        harness
            .device_tracker
            .add_observation(format!("The AAGUID is {}.", to_hex(&info.aaguid)));
        self.info = Some(info.clone());
        Ok(info)
    }

    pub fn is_fido_2_1_compliant<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<bool, ConformanceError> {
        Ok(self.authenticator_info(harness)?.is_fido_2_1_compliant())
    }

    pub fn has_uv_option<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<bool, ConformanceError> {
        Ok(self.authenticator_info(harness)?.has_uv_option())
    }

    pub fn is_hmac_secret_supported<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<bool, ConformanceError> {
        Ok(self.authenticator_info(harness)?.is_hmac_secret_supported())
    }

    pub fn get_info_test<E: Env>(
        &mut self,
        harness: &mut Harness<E>,
    ) -> Result<(), ConformanceError> {
        let info = self.authenticator_info(harness)?;
        self.tracker
            .check_condition(info.option("rk") == Some(true), "resident key support");
        self.tracker.check_condition(
            info.option("clientPin").is_some(),
            "client PIN support is advertised",
        );
        self.tracker.check_condition(
            info.option("up").unwrap_or(true),
            "user presence is supported",
        );
        self.tracker
            .check_condition(info.pin_protocols.contains(&1), "PIN protocol 1 support");
        Ok(())
    }
}

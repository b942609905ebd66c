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

//! Detects whether the device restarted or stopped answering.
//!
//! The authenticator key agreement key is generated at power up, and only replaced after a wrong
//! PIN. As long as no ClientPin request is sent, a different key means the device restarted.

use super::commands::client_pin_positive;
use super::error::ConformanceError;
use super::Harness;
use crate::ctap::data_formats::{ClientPinResponse, ClientPinSubCommand, CoseKey};
use crate::ctap::template::CommandTemplate;
use crate::env::Env;
use core::convert::TryFrom;
use tracing::warn;

fn fetch_key_agreement<E: Env>(harness: &mut Harness<E>) -> Option<CoseKey> {
    let template = CommandTemplate::client_pin(ClientPinSubCommand::GetKeyAgreement);
    let response = match client_pin_positive(harness, &template) {
        Ok(response) => response,
        Err(status) => {
            warn!(%status, "The device did not answer the key agreement request");
            return None;
        }
    };
    ClientPinResponse::try_from(response)
        .ok()
        .and_then(|response| response.key_agreement)
}

pub struct DeviceMonitor {
    initial_key: CoseKey,
}

impl DeviceMonitor {
    /// Remembers the current key agreement key. Fails if the device has none to offer.
    pub fn attach<E: Env>(harness: &mut Harness<E>) -> Result<Self, ConformanceError> {
        let initial_key = fetch_key_agreement(harness)
            .ok_or_else(|| ConformanceError::critical("attach the device monitor", None))?;
        Ok(DeviceMonitor { initial_key })
    }

    pub fn device_crashed<E: Env>(&self, harness: &mut Harness<E>) -> bool {
        match fetch_key_agreement(harness) {
            Some(key) => key != self.initial_key,
            None => true,
        }
    }
}

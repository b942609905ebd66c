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

pub mod command;
pub mod data_formats;
pub mod pin_protocol;
pub mod status_code;
pub mod template;

use self::status_code::{Ctap2StatusCode, ResponseOutcome};
use alloc::vec::Vec;
use ctap_cbor as cbor;
use ctap_cbor::cbor_null;

/// Serializes request parameters without a nesting limit.
///
/// Requests are allowed to exceed the canonical depth, so that over-nesting can be tested.
pub fn encode_request(parameters: Option<&cbor::Value>) -> Result<Vec<u8>, Ctap2StatusCode> {
    let mut encoded = Vec::new();
    if let Some(parameters) = parameters {
        cbor::write_nested(parameters.clone(), &mut encoded, None)
            .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
    }
    Ok(encoded)
}

/// Splits a response into status byte and CBOR payload.
///
/// An empty payload after a success status is returned as null.
pub fn parse_response(response: &[u8]) -> ResponseOutcome {
    let (status_byte, payload) = response
        .split_first()
        .ok_or(Ctap2StatusCode::CTAP1_ERR_INVALID_LENGTH)?;
    let status = Ctap2StatusCode::from(*status_byte);
    if status != Ctap2StatusCode::CTAP2_OK {
        return Err(status);
    }
    if payload.is_empty() {
        return Ok(cbor_null!());
    }
    Ok(cbor::read(payload)?)
}

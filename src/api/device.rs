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

use crate::ctap::command::Command;
use crate::ctap::encode_request;
use crate::ctap::status_code::{outcome_status, Ctap2StatusCode, ResponseOutcome};
use ctap_cbor as cbor;
use tracing::debug;

/// The authenticator under test, behind its transport.
///
/// Calls block until the device answers. There is never more than one request in flight.
pub trait Device {
    /// Sends an already serialized request.
    ///
    /// The transport decodes the answer into a status and a CBOR value, as done by
    /// [`parse_response`](crate::ctap::parse_response).
    fn send_raw(&mut self, command: Command, request: &[u8]) -> ResponseOutcome;

    /// Initializes the transport session, after the device was plugged in.
    fn init(&mut self) -> Result<(), Ctap2StatusCode>;

    /// Serializes the parameters and sends them.
    ///
    /// Requests are written without a nesting limit, so that over-nested parameters reach the
    /// device.
    fn send(&mut self, command: Command, parameters: Option<&cbor::Value>) -> ResponseOutcome {
        let request = encode_request(parameters)?;
        debug!(%command, length = request.len(), "Sending request");
        let outcome = self.send_raw(command, &request);
        debug!(%command, status = %outcome_status(&outcome), "Received response");
        outcome
    }
}

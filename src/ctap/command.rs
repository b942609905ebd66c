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

use super::status_code::Ctap2StatusCode;
use core::convert::TryFrom;
use core::fmt;

/// The CTAP2 commands the conformance tests send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    AuthenticatorMakeCredential = 0x01,
    AuthenticatorGetAssertion = 0x02,
    AuthenticatorGetInfo = 0x04,
    AuthenticatorClientPin = 0x06,
    AuthenticatorReset = 0x07,
    AuthenticatorGetNextAssertion = 0x08,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::AuthenticatorMakeCredential => "MakeCredential",
            Command::AuthenticatorGetAssertion => "GetAssertion",
            Command::AuthenticatorGetInfo => "GetInfo",
            Command::AuthenticatorClientPin => "ClientPIN",
            Command::AuthenticatorReset => "Reset",
            Command::AuthenticatorGetNextAssertion => "GetNextAssertion",
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        command as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Ctap2StatusCode;

    fn try_from(command_byte: u8) -> Result<Self, Ctap2StatusCode> {
        match command_byte {
            0x01 => Ok(Command::AuthenticatorMakeCredential),
            0x02 => Ok(Command::AuthenticatorGetAssertion),
            0x04 => Ok(Command::AuthenticatorGetInfo),
            0x06 => Ok(Command::AuthenticatorClientPin),
            0x07 => Ok(Command::AuthenticatorReset),
            0x08 => Ok(Command::AuthenticatorGetNextAssertion),
            _ => Err(Ctap2StatusCode::CTAP1_ERR_INVALID_COMMAND),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

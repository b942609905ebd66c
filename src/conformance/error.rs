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

use crate::api::validator::ValidationError;
use crate::ctap::status_code::Ctap2StatusCode;
use alloc::string::String;
use thiserror::Error;

/// Ends a conformance run.
///
/// Non-fatal findings are tallied instead, so every variant stops all further tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConformanceError {
    /// A test whose failure makes all following results meaningless.
    #[error("failed critical test: {name}{}", status_suffix(.status))]
    FailedCriticalTest {
        name: String,
        status: Option<Ctap2StatusCode>,
    },

    /// A credential or counter validator rejected a response.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The tests themselves are inconsistent, as with a customized PIN out of bounds.
    #[error("test suite bug: {0}")]
    SuiteBug(String),

    /// A platform side PIN protocol operation failed on local data.
    #[error("local PIN protocol operation failed with {0}")]
    Platform(#[from] Ctap2StatusCode),
}

impl ConformanceError {
    pub fn critical(name: &str, status: Option<Ctap2StatusCode>) -> Self {
        ConformanceError::FailedCriticalTest {
            name: String::from(name),
            status,
        }
    }

    pub fn suite_bug(description: &str) -> Self {
        ConformanceError::SuiteBug(String::from(description))
    }
}

fn status_suffix(status: &Option<Ctap2StatusCode>) -> String {
    match status {
        Some(status) => alloc::format!(" - returned status code {}", status),
        None => String::new(),
    }
}

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

//! Counts and logs the results of one test series.

use super::error::ConformanceError;
use crate::ctap::status_code::{Ctap2StatusCode, ResponseOutcome};
use alloc::string::String;
use core::fmt;
use ctap_cbor as cbor;
use tracing::{error, info, warn};

/// Results of a test series. Only ever grows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    pub name: &'static str,
    pub attempted: usize,
    pub passed: usize,
}

impl Tally {
    pub fn failed(&self) -> usize {
        self.attempted - self.passed
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} tests passed",
            self.name, self.passed, self.attempted
        )
    }
}

pub struct ResultTracker {
    name: &'static str,
    attempted: usize,
    passed: usize,
    warnings: usize,
    manual_steps: usize,
}

impl ResultTracker {
    pub fn new(name: &'static str) -> Self {
        ResultTracker {
            name,
            attempted: 0,
            passed: 0,
            warnings: 0,
            manual_steps: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    /// Number of tolerated mismatches, where the device failed with an unexpected error.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn manual_steps(&self) -> usize {
        self.manual_steps
    }

    pub fn tally(&self) -> Tally {
        Tally {
            name: self.name,
            attempted: self.attempted,
            passed: self.passed,
        }
    }

    fn record(&mut self, passed: bool, test_name: &str) -> bool {
        self.attempted += 1;
        if passed {
            self.passed += 1;
            info!(series = self.name, "Passed: {}", test_name);
        } else {
            error!(series = self.name, "Failed: {}", test_name);
        }
        passed
    }

    /// Asserts a general condition, failing the whole run if it doesn't hold.
    pub fn assert_condition(
        &mut self,
        condition: bool,
        test_name: &str,
    ) -> Result<(), ConformanceError> {
        if condition {
            return Ok(());
        }
        error!(series = self.name, "Failed critical test: {}", test_name);
        Err(ConformanceError::FailedCriticalTest {
            name: String::from(test_name),
            status: None,
        })
    }

    /// As above, but asserts the success of an executed command and returns its response.
    pub fn assert_response(
        &mut self,
        outcome: ResponseOutcome,
        test_name: &str,
    ) -> Result<cbor::Value, ConformanceError> {
        outcome.map_err(|status| {
            error!(
                series = self.name,
                %status,
                "Failed critical test: {}", test_name
            );
            ConformanceError::FailedCriticalTest {
                name: String::from(test_name),
                status: Some(status),
            }
        })
    }

    pub fn check_condition(&mut self, condition: bool, test_name: &str) -> bool {
        self.record(condition, test_name)
    }

    /// Passes if the command succeeded.
    pub fn check_response(&mut self, outcome: &ResponseOutcome, test_name: &str) -> bool {
        if let Err(status) = outcome {
            warn!(series = self.name, %status, "Unexpected error status");
        }
        self.record(outcome.is_ok(), test_name)
    }

    /// Compares an expected and an actual status.
    ///
    /// Success must match exactly. If both are errors, any error passes, but a different one
    /// than expected is reported as a warning.
    pub fn check_status(
        &mut self,
        expected: Ctap2StatusCode,
        actual: Ctap2StatusCode,
        test_name: &str,
    ) -> bool {
        let expected_ok = expected == Ctap2StatusCode::CTAP2_OK;
        let actual_ok = actual == Ctap2StatusCode::CTAP2_OK;
        if expected_ok != actual_ok {
            error!(series = self.name, %expected, %actual, "Status mismatch");
            return self.record(false, test_name);
        }
        if expected != actual {
            self.warnings += 1;
            warn!(
                series = self.name,
                %expected,
                %actual,
                "Tolerated different error: {}", test_name
            );
        }
        self.record(true, test_name)
    }

    /// Logs a warning if the statuses differ, without counting a test.
    pub fn warn_on_mismatch(
        &mut self,
        expected: Ctap2StatusCode,
        actual: Ctap2StatusCode,
        description: &str,
    ) -> bool {
        if expected == actual {
            return true;
        }
        self.warnings += 1;
        warn!(
            series = self.name,
            %expected,
            %actual,
            "Behavior changed: {}", description
        );
        false
    }

    /// Counts an action of the person operating the device.
    pub fn record_manual_step(&mut self, description: &str) {
        self.manual_steps += 1;
        info!(series = self.name, "Manual step: {}", description);
    }

    pub fn print_results(&self, writer: &mut impl fmt::Write) -> fmt::Result {
        writeln!(writer, "{}", self.tally())?;
        if self.manual_steps > 0 {
            writeln!(writer, "{}: {} manual steps", self.name, self.manual_steps)?;
        }
        Ok(())
    }
}

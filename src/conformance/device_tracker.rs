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

use super::checker::{CounterChecker, KeyChecker};
use crate::api::validator::CounterValidator;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

// Options whose value changes over the lifetime of a device, so their presence is what counts.
const MUTABLE_OPTIONS: [&str; 3] = ["clientPin", "uv", "bioEnroll"];

/// Collects what the tests learn about the device, beyond pass and fail.
pub struct DeviceTracker {
    is_initialized: bool,
    versions: BTreeSet<String>,
    extensions: BTreeSet<String>,
    options: BTreeSet<String>,
    observations: Vec<String>,
    problems: Vec<String>,
    key_checker: KeyChecker,
    counter_checker: CounterChecker,
}

impl Default for DeviceTracker {
    fn default() -> Self {
        DeviceTracker::new()
    }
}

impl DeviceTracker {
    pub fn new() -> Self {
        DeviceTracker {
            is_initialized: false,
            versions: BTreeSet::new(),
            extensions: BTreeSet::new(),
            options: BTreeSet::new(),
            observations: Vec::new(),
            problems: Vec::new(),
            key_checker: KeyChecker::new(),
            counter_checker: CounterChecker::new(),
        }
    }

    /// Stores the capabilities from the first GetInfo response. Later calls are ignored.
    ///
    /// Immutable options are only stored if true, mutable options whenever present.
    pub fn initialize(
        &mut self,
        versions: &[String],
        extensions: &[String],
        options: &BTreeMap<String, bool>,
    ) {
        if self.is_initialized {
            return;
        }
        self.is_initialized = true;
        self.versions.extend(versions.iter().cloned());
        self.extensions.extend(extensions.iter().cloned());
        self.options.extend(
            options
                .iter()
                .filter(|(name, value)| **value || MUTABLE_OPTIONS.contains(&name.as_str()))
                .map(|(name, _)| name.clone()),
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.contains(version)
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(option)
    }

    /// Adds a noteworthy fact about the device. Duplicates are ignored.
    pub fn add_observation(&mut self, observation: impl Into<String>) {
        let observation = observation.into();
        if !self.observations.contains(&observation) {
            self.observations.push(observation);
        }
    }

    /// Adds a deviation from the protocol that isn't covered by a test. Duplicates are ignored.
    pub fn add_problem(&mut self, problem: impl Into<String>) {
        let problem = problem.into();
        if !self.problems.contains(&problem) {
            self.problems.push(problem);
        }
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    pub fn key_checker(&mut self) -> &mut KeyChecker {
        &mut self.key_checker
    }

    pub fn counter_checker(&mut self) -> &mut CounterChecker {
        &mut self.counter_checker
    }

    /// Prints observations, then problems, then what was learned about counters.
    pub fn report_findings(&self, writer: &mut impl fmt::Write) -> fmt::Result {
        for observation in &self.observations {
            writeln!(writer, "{}", observation)?;
        }
        writeln!(writer)?;
        for problem in &self.problems {
            writeln!(writer, "{}", problem)?;
        }
        writeln!(writer)?;
        if let Some(finding) = self.counter_checker.finding() {
            writeln!(writer, "{}", finding)?;
        }
        Ok(())
    }
}

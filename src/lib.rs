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

//! Conformance tests for CTAP2 authenticators.
//!
//! The tests drive a device through malformed inputs and protocol scenarios, and count how many
//! of its answers comply. See [`run_conformance_suite`](conformance::suite::run_conformance_suite)
//! for the entry point.

extern crate alloc;

pub mod api;
pub mod conformance;
pub mod ctap;
pub mod env;
#[cfg(test)]
mod test_helpers;

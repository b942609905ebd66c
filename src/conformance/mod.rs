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

//! The conformance tests, grouped into test series that share one device.

pub mod checker;
pub mod commands;
pub mod compliance;
pub mod device_tracker;
pub mod error;
pub mod fuzzing;
pub mod monitor;
pub mod mutator;
pub mod suite;
pub mod tracker;

use self::device_tracker::DeviceTracker;
use crate::env::Env;

/// Everything the test series share: the environment with the device, and what was learned
/// about the device so far.
pub struct Harness<E: Env> {
    pub env: E,
    pub device_tracker: DeviceTracker,
}

impl<E: Env> Harness<E> {
    pub fn new(env: E) -> Self {
        Harness {
            env,
            device_tracker: DeviceTracker::new(),
        }
    }
}

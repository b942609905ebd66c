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

use crate::api::customization::Customization;
use crate::api::device::Device;
use crate::api::prompt::Prompt;
use crate::api::rng::Rng;

pub mod test;

/// Describes what the conformance tests need to function.
pub trait Env {
    type Rng: Rng;
    type Device: Device;
    type Prompt: Prompt;
    type Write: core::fmt::Write;
    type Customization: Customization;

    fn rng(&mut self) -> &mut Self::Rng;
    fn device(&mut self) -> &mut Self::Device;
    fn prompt(&mut self) -> &mut Self::Prompt;

    /// Creates a write instance for the results.
    ///
    /// This API doesn't return a reference such that drop may flush.
    fn write(&mut self) -> Self::Write;

    fn customization(&self) -> &Self::Customization;
}

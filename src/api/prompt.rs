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

/// Instructions for the person operating the device.
///
/// All calls block until the person acted. There is no timeout.
pub trait Prompt {
    /// Asks for a touch, to be given when the device blinks during the next command.
    fn request_touch(&mut self);

    /// Asks to not touch the device until told otherwise.
    fn prompt_no_touch(&mut self);

    /// Asks to unplug and replug the device, and returns once it is plugged in again.
    fn prompt_replug(&mut self);

    /// Waits for the given time in ms.
    fn wait(&mut self, milliseconds: usize);
}

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

//! This file contains all customizable constants of a conformance run.
//!
//! If you adapt them, make sure to run the tests before testing a device.

/// The PIN that negative tests use, which must never be the PIN of the device.
pub const KNOWN_WRONG_PIN: &[u8] = b"fake";

pub trait Customization {
    /// Number of resident credentials to create when filling the key store.
    ///
    /// # Invariant
    ///
    /// - The number must be positive.
    ///
    /// If the key store does not fill up before, the store full check is omitted.
    fn num_credentials(&self) -> usize;

    /// Minimum PIN length in bytes, that a conforming authenticator must accept.
    ///
    /// # Invariant
    ///
    /// - The minimum PIN length must be at least 4.
    /// - The minimum PIN length must be at most max_pin_length().
    fn min_pin_length(&self) -> usize;

    /// Maximum PIN length in bytes, that a conforming authenticator must accept.
    ///
    /// # Invariant
    ///
    /// - The maximum PIN length must be at most 63.
    fn max_pin_length(&self) -> usize;

    /// Length of the padded PIN in setPin and changePin.
    ///
    /// # Invariant
    ///
    /// - The padded length must be a multiple of the AES block size 16.
    /// - The padded length must be greater than max_pin_length().
    fn pin_padded_length(&self) -> usize;

    /// Upper limit for the PIN retries counter.
    ///
    /// # Invariant
    ///
    /// - The retries must be between 1 and 8.
    fn max_pin_retries(&self) -> u8;

    /// Consecutive wrong PINs after which a power cycle is required.
    ///
    /// # Invariant
    ///
    /// - The number must be positive.
    fn wrong_pins_before_power_cycle(&self) -> u8;

    /// Time after power up in which Reset is allowed, in ms.
    ///
    /// # Invariant
    ///
    /// - The time must be positive.
    fn reset_window_ms(&self) -> usize;

    /// The PIN set by tests that need any PIN.
    ///
    /// # Invariant
    ///
    /// - The length must be between min_pin_length() and max_pin_length().
    /// - The PIN must differ from KNOWN_WRONG_PIN.
    fn default_pin(&self) -> &[u8];
}

#[derive(Clone)]
pub struct CustomizationImpl {
    pub num_credentials: usize,
    pub min_pin_length: usize,
    pub max_pin_length: usize,
    pub pin_padded_length: usize,
    pub max_pin_retries: u8,
    pub wrong_pins_before_power_cycle: u8,
    pub reset_window_ms: usize,
    pub default_pin: &'static [u8],
}

pub const DEFAULT_CUSTOMIZATION: CustomizationImpl = CustomizationImpl {
    num_credentials: 50,
    min_pin_length: 4,
    max_pin_length: 63,
    pin_padded_length: 64,
    max_pin_retries: 8,
    wrong_pins_before_power_cycle: 3,
    reset_window_ms: 10000,
    default_pin: b"1234",
};

impl Customization for CustomizationImpl {
    fn num_credentials(&self) -> usize {
        self.num_credentials
    }

    fn min_pin_length(&self) -> usize {
        self.min_pin_length
    }

    fn max_pin_length(&self) -> usize {
        self.max_pin_length
    }

    fn pin_padded_length(&self) -> usize {
        self.pin_padded_length
    }

    fn max_pin_retries(&self) -> u8 {
        self.max_pin_retries
    }

    fn wrong_pins_before_power_cycle(&self) -> u8 {
        self.wrong_pins_before_power_cycle
    }

    fn reset_window_ms(&self) -> usize {
        self.reset_window_ms
    }

    fn default_pin(&self) -> &[u8] {
        self.default_pin
    }
}

pub fn is_valid(customization: &impl Customization) -> bool {
    // At least one credential must be created.
    if customization.num_credentials() == 0 {
        return false;
    }

    // PIN lengths must be ordered and between 4 and 63.
    if customization.min_pin_length() < 4
        || customization.min_pin_length() > customization.max_pin_length()
        || customization.max_pin_length() > 63
    {
        return false;
    }

    // The padded PIN must fit all PINs and be made of AES blocks.
    if customization.pin_padded_length() % 16 != 0
        || customization.pin_padded_length() <= customization.max_pin_length()
    {
        return false;
    }

    // Max PIN retries must be between 1 and 8.
    if customization.max_pin_retries() == 0 || customization.max_pin_retries() > 8 {
        return false;
    }

    if customization.wrong_pins_before_power_cycle() == 0 {
        return false;
    }

    if customization.reset_window_ms() == 0 {
        return false;
    }

    // The default PIN must be valid and distinguishable from the wrong one.
    let default_pin = customization.default_pin();
    if default_pin.len() < customization.min_pin_length()
        || default_pin.len() > customization.max_pin_length()
        || default_pin == KNOWN_WRONG_PIN
    {
        return false;
    }

    true
}

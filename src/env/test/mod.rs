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

use self::authenticator::{Faults, SimulatedAuthenticator};
use crate::api::clock::Clock;
use crate::api::customization::DEFAULT_CUSTOMIZATION;
use crate::api::device::Device;
use crate::api::prompt::Prompt;
use crate::ctap::command::Command;
use crate::ctap::parse_response;
use crate::ctap::status_code::{Ctap2StatusCode, ResponseOutcome};
use crate::env::Env;
use customization::TestCustomization;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod authenticator;

// Time the simulated user waits before giving up on a touch request.
const USER_PRESENCE_TIMEOUT_MS: usize = 30000;

pub type TestRng = StdRng;

/// A clock that only advances when told to.
#[derive(Debug, Default)]
pub struct TestClock {
    now_ms: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestTimer {
    end_ms: usize,
}

impl TestClock {
    pub fn advance(&mut self, milliseconds: usize) {
        self.now_ms = self.now_ms.saturating_add(milliseconds);
    }
}

impl Clock for TestClock {
    type Timer = TestTimer;

    fn make_timer(&mut self, milliseconds: usize) -> Self::Timer {
        TestTimer {
            end_ms: self.now_ms.saturating_add(milliseconds),
        }
    }

    fn is_elapsed(&mut self, timer: &Self::Timer) -> bool {
        self.now_ms >= timer.end_ms
    }
}

/// The simulated user next to the authenticator.
///
/// A requested touch is given during the next command only. After being asked to not touch,
/// the user ignores touch requests until a touch is missed.
#[derive(Debug, Default)]
pub struct TestUserPresence {
    touch_pending: bool,
    refusing_touch: bool,
}

impl TestUserPresence {
    fn request_touch(&mut self) {
        if !self.refusing_touch {
            self.touch_pending = true;
        }
    }

    fn prompt_no_touch(&mut self) {
        self.refusing_touch = true;
        self.touch_pending = false;
    }

    pub fn clear(&mut self) {
        self.touch_pending = false;
    }

    /// Consumes the touch, or times out.
    pub fn check(&mut self, clock: &mut TestClock) -> Result<(), Ctap2StatusCode> {
        if self.touch_pending {
            self.touch_pending = false;
            return Ok(());
        }
        clock.advance(USER_PRESENCE_TIMEOUT_MS);
        self.refusing_touch = false;
        Err(Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT)
    }
}

pub struct TestWrite;

impl core::fmt::Write for TestWrite {
    fn write_str(&mut self, _: &str) -> core::fmt::Result {
        Ok(())
    }
}

/// Runs the conformance tests against a [`SimulatedAuthenticator`].
pub struct TestEnv {
    rng: TestRng,
    clock: TestClock,
    user_presence: TestUserPresence,
    authenticator: SimulatedAuthenticator,
    customization: TestCustomization,
}

impl Default for TestEnv {
    fn default() -> Self {
        TestEnv::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        TestEnv::with_faults(Faults::default())
    }

    /// Simulates an authenticator that deviates from the protocol as described.
    pub fn with_faults(faults: Faults) -> Self {
        let rng = StdRng::seed_from_u64(0);
        let mut clock = TestClock::default();
        let authenticator = SimulatedAuthenticator::new(1, faults, &mut clock);
        TestEnv {
            rng,
            clock,
            user_presence: TestUserPresence::default(),
            authenticator,
            customization: DEFAULT_CUSTOMIZATION.into(),
        }
    }

    pub fn authenticator(&mut self) -> &mut SimulatedAuthenticator {
        &mut self.authenticator
    }

    pub fn clock(&mut self) -> &mut TestClock {
        &mut self.clock
    }

    pub fn customization_mut(&mut self) -> &mut TestCustomization {
        &mut self.customization
    }
}

impl Device for TestEnv {
    fn send_raw(&mut self, command: Command, request: &[u8]) -> ResponseOutcome {
        let response = self.authenticator.process_command(
            command,
            request,
            &mut self.user_presence,
            &mut self.clock,
        );
        parse_response(&response)
    }

    fn init(&mut self) -> Result<(), Ctap2StatusCode> {
        Ok(())
    }
}

impl Prompt for TestEnv {
    fn request_touch(&mut self) {
        self.user_presence.request_touch();
    }

    fn prompt_no_touch(&mut self) {
        self.user_presence.prompt_no_touch();
    }

    fn prompt_replug(&mut self) {
        self.user_presence = TestUserPresence::default();
        self.authenticator.power_cycle(&mut self.clock);
    }

    fn wait(&mut self, milliseconds: usize) {
        self.clock.advance(milliseconds);
    }
}

impl Env for TestEnv {
    type Rng = TestRng;
    type Device = Self;
    type Prompt = Self;
    type Write = TestWrite;
    type Customization = TestCustomization;

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn device(&mut self) -> &mut Self {
        self
    }

    fn prompt(&mut self) -> &mut Self {
        self
    }

    fn write(&mut self) -> Self::Write {
        TestWrite
    }

    fn customization(&self) -> &Self::Customization {
        &self.customization
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock() {
        let mut clock = TestClock::default();
        let timer = clock.make_timer(100);
        assert!(!clock.is_elapsed(&timer));
        clock.advance(99);
        assert!(!clock.is_elapsed(&timer));
        clock.advance(1);
        assert!(clock.is_elapsed(&timer));
        clock.advance(1);
        assert!(clock.is_elapsed(&timer));
    }

    #[test]
    fn test_user_presence() {
        let mut clock = TestClock::default();
        let mut user_presence = TestUserPresence::default();
        assert_eq!(
            user_presence.check(&mut clock),
            Err(Ctap2StatusCode::CTAP2_ERR_USER_ACTION_TIMEOUT)
        );
        assert_eq!(clock.now_ms, USER_PRESENCE_TIMEOUT_MS);

        user_presence.request_touch();
        assert_eq!(user_presence.check(&mut clock), Ok(()));
        assert!(user_presence.check(&mut clock).is_err());

        user_presence.prompt_no_touch();
        user_presence.request_touch();
        assert!(user_presence.check(&mut clock).is_err());
        // Once a touch was missed, the user follows requests again.
        user_presence.request_touch();
        assert_eq!(user_presence.check(&mut clock), Ok(()));
    }

    #[test]
    fn test_replug_restarts_reset_window() {
        let mut env = TestEnv::new();
        env.wait(DEFAULT_CUSTOMIZATION.reset_window_ms);
        env.request_touch();
        assert_eq!(
            env.send(Command::AuthenticatorReset, None),
            Err(Ctap2StatusCode::CTAP2_ERR_NOT_ALLOWED)
        );
        env.prompt_replug();
        env.request_touch();
        assert!(env.send(Command::AuthenticatorReset, None).is_ok());
    }
}

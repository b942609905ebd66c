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

//! CBOR values as exchanged with CTAP2 authenticators.
//!
//! The writer emits canonical CTAP2 CBOR. Both directions can enforce a maximum nesting depth, and
//! the writer can also lift it, so that deliberately over-nested requests can be produced.

#![no_std]

#[macro_use]
extern crate alloc;
#[cfg(test)]
extern crate std;

#[macro_use]
pub mod macros;
pub mod reader;
pub mod values;
pub mod writer;

pub use self::reader::{read, read_nested, read_prefix, DecoderError};
pub use self::values::{KeyType, SimpleValue, Value, ValueKind};
pub use self::writer::{write, write_nested, EncoderError};

/// Maximum nesting depth of canonical CTAP2 messages.
///
/// A top level map has depth 0, so its values have depth 1.
pub const MAX_NESTING_DEPTH: i8 = 4;

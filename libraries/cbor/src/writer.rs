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

use super::values::{Constants, KeyType, Value};
use crate::MAX_NESTING_DEPTH;
use alloc::vec::Vec;

/// Possible errors from a serialization operation.
#[derive(Debug, PartialEq, Eq)]
pub enum EncoderError {
    TooMuchNesting,
}

/// Serializes a value with the default nesting limit.
pub fn write(value: Value, encoded_cbor: &mut Vec<u8>) -> Result<(), EncoderError> {
    write_nested(value, encoded_cbor, Some(MAX_NESTING_DEPTH))
}

/// Serializes a value, checking the nesting limit if given.
///
/// `None` removes the limit, which lets callers produce messages that a conforming reader must
/// reject.
pub fn write_nested(
    value: Value,
    encoded_cbor: &mut Vec<u8>,
    max_nesting_depth: Option<i8>,
) -> Result<(), EncoderError> {
    let mut writer = Writer::new(encoded_cbor);
    writer.encode_cbor(value, max_nesting_depth)
}

struct Writer<'a> {
    encoded_cbor: &'a mut Vec<u8>,
}

impl<'a> Writer<'a> {
    pub fn new(encoded_cbor: &mut Vec<u8>) -> Writer {
        Writer { encoded_cbor }
    }

    fn encode_cbor(
        &mut self,
        value: Value,
        remaining_depth: Option<i8>,
    ) -> Result<(), EncoderError> {
        if remaining_depth.map_or(false, |d| d < 0) {
            return Err(EncoderError::TooMuchNesting);
        }
        let child_depth = remaining_depth.map(|d| d - 1);
        match value {
            Value::KeyValue(KeyType::Unsigned(unsigned)) => self.start_item(0, unsigned),
            Value::KeyValue(KeyType::Negative(negative)) => {
                self.start_item(1, -(negative + 1) as u64)
            }
            Value::KeyValue(KeyType::ByteString(byte_string)) => {
                self.start_item(2, byte_string.len() as u64);
                self.encoded_cbor.extend(byte_string);
            }
            Value::KeyValue(KeyType::TextString(text_string)) => {
                self.start_item(3, text_string.len() as u64);
                self.encoded_cbor.extend(text_string.into_bytes());
            }
            Value::Array(array) => {
                self.start_item(4, array.len() as u64);
                for el in array {
                    self.encode_cbor(el, child_depth)?;
                }
            }
            Value::Map(map) => {
                self.start_item(5, map.len() as u64);
                for (k, v) in map {
                    self.encode_cbor(Value::KeyValue(k), child_depth)?;
                    self.encode_cbor(v, child_depth)?;
                }
            }
            Value::Simple(simple_value) => self.start_item(7, simple_value as u64),
            Value::Float(float) => {
                // Always double precision, shorter forms are never required.
                self.encoded_cbor.push(
                    (7 << Constants::MAJOR_TYPE_BIT_SHIFT)
                        | Constants::ADDITIONAL_INFORMATION_8_BYTES,
                );
                self.encoded_cbor.extend_from_slice(&float.to_be_bytes());
            }
        }
        Ok(())
    }

    fn start_item(&mut self, type_label: u8, size: u64) {
        let (mut first_byte, shift) = match size {
            0..=23 => (size as u8, 0),
            24..=0xFF => (Constants::ADDITIONAL_INFORMATION_1_BYTE, 1),
            0x100..=0xFFFF => (Constants::ADDITIONAL_INFORMATION_2_BYTES, 2),
            0x10000..=0xFFFF_FFFF => (Constants::ADDITIONAL_INFORMATION_4_BYTES, 4),
            _ => (Constants::ADDITIONAL_INFORMATION_8_BYTES, 8),
        };
        first_byte |= type_label << Constants::MAJOR_TYPE_BIT_SHIFT;
        self.encoded_cbor.push(first_byte);

        for i in (0..shift).rev() {
            self.encoded_cbor.push((size >> (i * 8)) as u8);
        }
    }
}

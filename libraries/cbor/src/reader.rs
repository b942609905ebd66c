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

use super::values::{Constants, KeyType, SimpleValue, Value};
use crate::MAX_NESTING_DEPTH;
use alloc::collections::BTreeMap;
use alloc::str;
use alloc::vec::Vec;

/// Possible errors from a deserialization operation.
#[derive(Debug, PartialEq, Eq)]
pub enum DecoderError {
    UnsupportedMajorType,
    UnknownAdditionalInfo,
    IncompleteCborData,
    IncorrectMapKeyType,
    TooMuchNesting,
    InvalidUtf8,
    ExtranousData,
    OutOfOrderKey,
    NonMinimalCborEncoding,
    UnsupportedSimpleValue,
    OutOfRangeIntegerValue,
}

/// Deserializes a single data item with the default nesting limit.
pub fn read(encoded_cbor: &[u8]) -> Result<Value, DecoderError> {
    read_nested(encoded_cbor, Some(MAX_NESTING_DEPTH))
}

/// Deserializes a single data item, checking the nesting limit if given.
///
/// Trailing bytes are an error.
pub fn read_nested(
    encoded_cbor: &[u8],
    max_nesting_depth: Option<i8>,
) -> Result<Value, DecoderError> {
    let mut reader = Reader::new(encoded_cbor);
    let value = reader.decode_complete_data_item(max_nesting_depth)?;
    if !reader.remaining_cbor.is_empty() {
        return Err(DecoderError::ExtranousData);
    }
    Ok(value)
}

/// Deserializes the first data item and returns it with the bytes that follow.
///
/// Authenticator data embeds a COSE key followed by extension data, so its length is only known
/// after parsing.
pub fn read_prefix(encoded_cbor: &[u8]) -> Result<(Value, &[u8]), DecoderError> {
    let mut reader = Reader::new(encoded_cbor);
    let value = reader.decode_complete_data_item(Some(MAX_NESTING_DEPTH))?;
    Ok((value, reader.remaining_cbor))
}

struct Reader<'a> {
    remaining_cbor: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(cbor: &'a [u8]) -> Reader<'a> {
        Reader {
            remaining_cbor: cbor,
        }
    }

    pub fn decode_complete_data_item(
        &mut self,
        remaining_depth: Option<i8>,
    ) -> Result<Value, DecoderError> {
        if remaining_depth.map_or(false, |d| d < 0) {
            return Err(DecoderError::TooMuchNesting);
        }
        let first_byte = match self.read_bytes(1) {
            Some([first_byte]) => *first_byte,
            _ => return Err(DecoderError::IncompleteCborData),
        };
        // Unsigned byte means logical shift, so only zeros get shifted in.
        let major_type_value = first_byte >> Constants::MAJOR_TYPE_BIT_SHIFT;
        let additional_info = first_byte & Constants::ADDITIONAL_INFORMATION_MASK;
        if major_type_value == 7
            && (Constants::ADDITIONAL_INFORMATION_2_BYTES..=Constants::ADDITIONAL_INFORMATION_8_BYTES)
                .contains(&additional_info)
        {
            return self.read_float(additional_info);
        }
        let size_value = self.read_variadic_length_integer(additional_info)?;
        let child_depth = remaining_depth.map(|d| d - 1);
        match major_type_value {
            0 => Ok(cbor_unsigned!(size_value)),
            1 => self.decode_value_to_negative(size_value),
            2 => self.read_byte_string_content(size_value),
            3 => self.read_text_string_content(size_value),
            4 => self.read_array_content(size_value, child_depth),
            5 => self.read_map_content(size_value, child_depth),
            7 => self.decode_to_simple_value(size_value),
            _ => Err(DecoderError::UnsupportedMajorType),
        }
    }

    fn read_bytes(&mut self, num_bytes: usize) -> Option<&[u8]> {
        if num_bytes > self.remaining_cbor.len() {
            None
        } else {
            let (left, right) = self.remaining_cbor.split_at(num_bytes);
            self.remaining_cbor = right;
            Some(left)
        }
    }

    fn read_be_u64(&mut self, num_bytes: usize) -> Result<u64, DecoderError> {
        let bytes = self
            .read_bytes(num_bytes)
            .ok_or(DecoderError::IncompleteCborData)?;
        Ok(bytes
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | *byte as u64))
    }

    fn read_variadic_length_integer(&mut self, additional_info: u8) -> Result<u64, DecoderError> {
        let additional_bytes_num = match additional_info {
            0..=Constants::ADDITIONAL_INFORMATION_MAX_INT => return Ok(additional_info as u64),
            Constants::ADDITIONAL_INFORMATION_1_BYTE => 1,
            Constants::ADDITIONAL_INFORMATION_2_BYTES => 2,
            Constants::ADDITIONAL_INFORMATION_4_BYTES => 4,
            Constants::ADDITIONAL_INFORMATION_8_BYTES => 8,
            _ => return Err(DecoderError::UnknownAdditionalInfo),
        };
        let size_value = self.read_be_u64(additional_bytes_num)?;
        if (additional_bytes_num == 1 && size_value < 24)
            || size_value < (1u64 << (8 * (additional_bytes_num >> 1)))
        {
            Err(DecoderError::NonMinimalCborEncoding)
        } else {
            Ok(size_value)
        }
    }

    fn read_float(&mut self, additional_info: u8) -> Result<Value, DecoderError> {
        let float = match additional_info {
            Constants::ADDITIONAL_INFORMATION_2_BYTES => half_to_f64(self.read_be_u64(2)? as u16),
            Constants::ADDITIONAL_INFORMATION_4_BYTES => {
                f32::from_bits(self.read_be_u64(4)? as u32) as f64
            }
            _ => f64::from_bits(self.read_be_u64(8)?),
        };
        Ok(Value::Float(float))
    }

    fn decode_value_to_negative(&self, size_value: u64) -> Result<Value, DecoderError> {
        let signed_size = size_value as i64;
        if signed_size < 0 {
            Err(DecoderError::OutOfRangeIntegerValue)
        } else {
            Ok(Value::KeyValue(KeyType::Negative(-(size_value as i64) - 1)))
        }
    }

    fn read_byte_string_content(&mut self, size_value: u64) -> Result<Value, DecoderError> {
        match self.read_bytes(size_value as usize) {
            Some(bytes) => Ok(cbor_bytes_lit!(bytes)),
            None => Err(DecoderError::IncompleteCborData),
        }
    }

    fn read_text_string_content(&mut self, size_value: u64) -> Result<Value, DecoderError> {
        match self.read_bytes(size_value as usize) {
            Some(bytes) => match str::from_utf8(bytes) {
                Ok(s) => Ok(cbor_text!(s)),
                Err(_) => Err(DecoderError::InvalidUtf8),
            },
            None => Err(DecoderError::IncompleteCborData),
        }
    }

    fn read_array_content(
        &mut self,
        size_value: u64,
        child_depth: Option<i8>,
    ) -> Result<Value, DecoderError> {
        // Don't set the capacity already, it is an unsanitized input.
        let mut value_array = Vec::new();
        for _ in 0..size_value {
            value_array.push(self.decode_complete_data_item(child_depth)?);
        }
        Ok(cbor_array_vec!(value_array))
    }

    fn read_map_content(
        &mut self,
        size_value: u64,
        child_depth: Option<i8>,
    ) -> Result<Value, DecoderError> {
        let mut value_map = BTreeMap::new();
        let mut last_key_option = None;
        for _ in 0..size_value {
            let key = match self.decode_complete_data_item(child_depth)? {
                Value::KeyValue(key) => key,
                _ => return Err(DecoderError::IncorrectMapKeyType),
            };
            if let Some(last_key) = last_key_option {
                if last_key >= key {
                    return Err(DecoderError::OutOfOrderKey);
                }
            }
            last_key_option = Some(key.clone());
            value_map.insert(key, self.decode_complete_data_item(child_depth)?);
        }
        Ok(cbor_map_btree!(value_map))
    }

    fn decode_to_simple_value(&self, size_value: u64) -> Result<Value, DecoderError> {
        match SimpleValue::from_integer(size_value) {
            Some(simple_value) => Ok(Value::Simple(simple_value)),
            None => Err(DecoderError::UnsupportedSimpleValue),
        }
    }
}

/// Exact power of two for exponents in the normal double range.
fn pow2(exponent: i32) -> f64 {
    f64::from_bits(((exponent + 1023) as u64) << 52)
}

fn half_to_f64(bits: u16) -> f64 {
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x03FF) as f64;
    let magnitude = match exponent {
        0 => mantissa * pow2(-24),
        0x1F if mantissa == 0.0 => f64::INFINITY,
        0x1F => f64::NAN,
        _ => (mantissa + 1024.0) * pow2(exponent - 25),
    };
    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

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

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::convert::TryFrom;
use core::fmt;

/// A decoded CBOR data item, restricted to what CTAP messages can carry.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    KeyValue(KeyType),
    Array(Vec<Value>),
    Map(BTreeMap<KeyType, Value>),
    // TAG is omitted
    Simple(SimpleValue),
    Float(f64),
}

/// The values that can be map keys.
///
/// Key support is parser dependent. CTAP only uses integers and text, but byte strings are
/// accepted by canonical parsers as well.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyType {
    Unsigned(u64),
    // We only use 63 bits of information here.
    Negative(i64),
    ByteString(Vec<u8>),
    TextString(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleValue {
    FalseValue = 20,
    TrueValue = 21,
    NullValue = 22,
    Undefined = 23,
}

/// The closed set of structural categories of a `Value`.
///
/// The order follows the major types, with floats last since they share major type 7 with simple
/// values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Unsigned,
    Negative,
    ByteString,
    TextString,
    Array,
    Map,
    Simple,
    Float,
}

pub struct Constants {}

impl Constants {
    pub const MAJOR_TYPE_BIT_SHIFT: u8 = 5;
    pub const ADDITIONAL_INFORMATION_MASK: u8 = 0x1F;
    pub const ADDITIONAL_INFORMATION_MAX_INT: u8 = 23;
    pub const ADDITIONAL_INFORMATION_1_BYTE: u8 = 24;
    pub const ADDITIONAL_INFORMATION_2_BYTES: u8 = 25;
    pub const ADDITIONAL_INFORMATION_4_BYTES: u8 = 26;
    pub const ADDITIONAL_INFORMATION_8_BYTES: u8 = 27;
}

impl Value {
    pub fn bool_value(b: bool) -> Value {
        if b {
            Value::Simple(SimpleValue::TrueValue)
        } else {
            Value::Simple(SimpleValue::FalseValue)
        }
    }

    pub fn type_label(&self) -> u8 {
        match self {
            Value::KeyValue(key) => key.type_label(),
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Simple(_) | Value::Float(_) => 7,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::KeyValue(key) => key.kind(),
            Value::Array(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Map,
            Value::Simple(_) => ValueKind::Simple,
            Value::Float(_) => ValueKind::Float,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.kind().is_integer()
    }

    /// Returns whether both values would be accepted for the same typed slot.
    ///
    /// Unsigned and negative integers share one slot type.
    pub fn has_same_kind(&self, other: &Value) -> bool {
        self.kind().is_same_slot(other.kind())
    }

    /// Returns the value as an integer, if it is one that fits.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::KeyValue(KeyType::Unsigned(unsigned)) => i64::try_from(*unsigned).ok(),
            Value::KeyValue(KeyType::Negative(negative)) => Some(*negative),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::KeyValue(KeyType::Unsigned(unsigned)) => Some(*unsigned),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::KeyValue(KeyType::ByteString(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::KeyValue(KeyType::TextString(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<KeyType, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Simple(SimpleValue::TrueValue) => Some(true),
            Value::Simple(SimpleValue::FalseValue) => Some(false),
            _ => None,
        }
    }
}

impl KeyType {
    // For simplicity, this only takes i64. Construct directly for the last bit.
    pub fn integer(int: i64) -> KeyType {
        if int >= 0 {
            KeyType::Unsigned(int as u64)
        } else {
            KeyType::Negative(int)
        }
    }

    pub fn type_label(&self) -> u8 {
        match self {
            KeyType::Unsigned(_) => 0,
            KeyType::Negative(_) => 1,
            KeyType::ByteString(_) => 2,
            KeyType::TextString(_) => 3,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            KeyType::Unsigned(_) => ValueKind::Unsigned,
            KeyType::Negative(_) => ValueKind::Negative,
            KeyType::ByteString(_) => ValueKind::ByteString,
            KeyType::TextString(_) => ValueKind::TextString,
        }
    }
}

impl ValueKind {
    pub const ALL: [ValueKind; 8] = [
        ValueKind::Unsigned,
        ValueKind::Negative,
        ValueKind::ByteString,
        ValueKind::TextString,
        ValueKind::Array,
        ValueKind::Map,
        ValueKind::Simple,
        ValueKind::Float,
    ];

    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::Unsigned | ValueKind::Negative)
    }

    pub fn is_same_slot(self, other: ValueKind) -> bool {
        self == other || (self.is_integer() && other.is_integer())
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Unsigned => "unsigned",
            ValueKind::Negative => "negative",
            ValueKind::ByteString => "byte string",
            ValueKind::TextString => "text string",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
            ValueKind::Simple => "simple value",
            ValueKind::Float => "floating point",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Unsigned(unsigned) => write!(f, "{}", unsigned),
            KeyType::Negative(negative) => write!(f, "{}", negative),
            KeyType::ByteString(bytes) => {
                f.write_str("h'")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                f.write_str("'")
            }
            KeyType::TextString(text) => write!(f, "\"{}\"", text),
        }
    }
}

impl Ord for KeyType {
    fn cmp(&self, other: &KeyType) -> Ordering {
        use super::values::KeyType::{ByteString, Negative, TextString, Unsigned};
        let self_type_value = self.type_label();
        let other_type_value = other.type_label();
        if self_type_value != other_type_value {
            return self_type_value.cmp(&other_type_value);
        }
        match (self, other) {
            (Unsigned(u1), Unsigned(u2)) => u1.cmp(u2),
            (Negative(n1), Negative(n2)) => n1.cmp(n2).reverse(),
            (ByteString(b1), ByteString(b2)) => b1.len().cmp(&b2.len()).then(b1.cmp(b2)),
            (TextString(t1), TextString(t2)) => t1.len().cmp(&t2.len()).then(t1.cmp(t2)),
            // Type labels are equal, so the variants are too.
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for KeyType {
    fn partial_cmp(&self, other: &KeyType) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SimpleValue {
    pub fn from_integer(int: u64) -> Option<SimpleValue> {
        match int {
            20 => Some(SimpleValue::FalseValue),
            21 => Some(SimpleValue::TrueValue),
            22 => Some(SimpleValue::NullValue),
            23 => Some(SimpleValue::Undefined),
            _ => None,
        }
    }
}

impl From<u64> for KeyType {
    fn from(unsigned: u64) -> Self {
        KeyType::Unsigned(unsigned)
    }
}

impl From<i64> for KeyType {
    fn from(i: i64) -> Self {
        KeyType::integer(i)
    }
}

impl From<i32> for KeyType {
    fn from(i: i32) -> Self {
        KeyType::integer(i as i64)
    }
}

impl From<u8> for KeyType {
    fn from(unsigned: u8) -> Self {
        KeyType::Unsigned(unsigned as u64)
    }
}

impl From<Vec<u8>> for KeyType {
    fn from(bytes: Vec<u8>) -> Self {
        KeyType::ByteString(bytes)
    }
}

impl From<&[u8]> for KeyType {
    fn from(bytes: &[u8]) -> Self {
        KeyType::ByteString(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for KeyType {
    fn from(bytes: &[u8; N]) -> Self {
        KeyType::ByteString(bytes.to_vec())
    }
}

impl From<String> for KeyType {
    fn from(text: String) -> Self {
        KeyType::TextString(text)
    }
}

impl From<&str> for KeyType {
    fn from(text: &str) -> Self {
        KeyType::TextString(text.to_string())
    }
}

impl<T> From<T> for Value
where
    KeyType: From<T>,
{
    fn from(t: T) -> Self {
        Value::KeyValue(KeyType::from(t))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool_value(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

pub trait IntoCborKey {
    fn into_cbor_key(self) -> KeyType;
}

impl<T> IntoCborKey for T
where
    KeyType: From<T>,
{
    fn into_cbor_key(self) -> KeyType {
        KeyType::from(self)
    }
}

pub trait IntoCborValue {
    fn into_cbor_value(self) -> Value;
}

impl<T> IntoCborValue for T
where
    Value: From<T>,
{
    fn into_cbor_value(self) -> Value {
        Value::from(self)
    }
}

pub trait IntoCborValueOption {
    fn into_cbor_value_option(self) -> Option<Value>;
}

impl<T> IntoCborValueOption for T
where
    Value: From<T>,
{
    fn into_cbor_value_option(self) -> Option<Value> {
        Some(Value::from(self))
    }
}

impl<T> IntoCborValueOption for Option<T>
where
    Value: From<T>,
{
    fn into_cbor_value_option(self) -> Option<Value> {
        self.map(Value::from)
    }
}

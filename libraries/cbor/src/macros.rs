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

use crate::values::{KeyType, Value};
use alloc::collections::btree_map;
use core::cmp::Ordering;
use core::iter::Peekable;

/// Extracts several entries of a `BTreeMap<KeyType, Value>` in one linear pass, consuming the map.
///
/// Each identifier is bound to an `Option<Value>`, `None` when its key is absent. Entries with
/// keys that are not listed are dropped.
///
/// Keys **must be listed in increasing canonical order**. Unsorted keys silently yield `None` for
/// present entries. Tests assert the order, release builds don't check it.
///
/// ```rust
/// # extern crate alloc;
/// # #[macro_use]
/// # extern crate ctap_cbor;
/// #
/// # fn main() {
/// #     let map = alloc::collections::BTreeMap::new();
/// destructure_cbor_map! {
///     let {
///         1 => x,
///         "key" => y,
///     } = map;
/// }
/// # }
/// ```
#[macro_export]
macro_rules! destructure_cbor_map {
    ( let { $( $key:expr => $variable:ident, )+ } = $map:expr; ) => {
        #[cfg(test)]
        $crate::assert_sorted_keys!($( $key, )+);

        use $crate::values::{IntoCborKey, Value};
        use $crate::macros::destructure_cbor_map_peek_value;

        let mut it = $map.into_iter().peekable();
        $(
        let $variable: Option<Value> = destructure_cbor_map_peek_value(&mut it, $key.into_cbor_key());
        )+
    };
}

/// Advances the sorted iterator up to `needle` and returns its value if present.
///
/// Internal detail of `destructure_cbor_map!`, public so that the macro expands in other crates.
pub fn destructure_cbor_map_peek_value(
    it: &mut Peekable<btree_map::IntoIter<KeyType, Value>>,
    needle: KeyType,
) -> Option<Value> {
    loop {
        let ordering = match it.peek() {
            None => return None,
            Some((key, _)) => key.cmp(&needle),
        };
        match ordering {
            Ordering::Less => {
                it.next();
            }
            Ordering::Equal => return it.next().map(|(_, value)| value),
            Ordering::Greater => return None,
        }
    }
}

#[macro_export]
macro_rules! assert_sorted_keys {
    // Last key
    ( $key:expr, ) => {
    };

    ( $key1:expr, $key2:expr, $( $keys:expr, )* ) => {
        {
            use $crate::values::{IntoCborKey, KeyType};
            let k1: KeyType = $key1.into_cbor_key();
            let k2: KeyType = $key2.into_cbor_key();
            assert!(
                k1 < k2,
                "{:?} < {:?} failed. The destructure_cbor_map! macro requires keys in sorted order.",
                k1,
                k2,
            );
        }
        $crate::assert_sorted_keys!($key2, $( $keys, )*);
    };
}

#[macro_export]
macro_rules! cbor_map {
    // trailing comma case
    ( $( $key:expr => $value:expr, )+ ) => {
        $crate::cbor_map! ( $($key => $value),+ )
    };

    ( $( $key:expr => $value:expr ),* ) => {
        {
            // The import is unused if the list is empty.
            #[allow(unused_imports)]
            use $crate::values::{IntoCborKey, IntoCborValue};
            let mut _map = $crate::macros::BTreeMap::new();
            $(
                _map.insert($key.into_cbor_key(), $value.into_cbor_value());
            )*
            $crate::values::Value::Map(_map)
        }
    };
}

/// Like `cbor_map!`, but entries whose value is `None` are left out.
#[macro_export]
macro_rules! cbor_map_options {
    // trailing comma case
    ( $( $key:expr => $value:expr, )+ ) => {
        $crate::cbor_map_options! ( $($key => $value),+ )
    };

    ( $( $key:expr => $value:expr ),* ) => {
        {
            // The import is unused if the list is empty.
            #[allow(unused_imports)]
            use $crate::values::{IntoCborKey, IntoCborValueOption};
            let mut _map = $crate::macros::BTreeMap::<_, $crate::values::Value>::new();
            $(
            {
                let opt: Option<$crate::values::Value> = $value.into_cbor_value_option();
                if let Some(val) = opt {
                    _map.insert($key.into_cbor_key(), val);
                }
            }
            )*
            $crate::values::Value::Map(_map)
        }
    };
}

#[macro_export]
macro_rules! cbor_map_btree {
    ( $tree:expr ) => {
        $crate::values::Value::Map($tree)
    };
}

#[macro_export]
macro_rules! cbor_array {
    // trailing comma case
    ( $( $value:expr, )+ ) => {
        $crate::cbor_array! ( $($value),+ )
    };

    ( $( $value:expr ),* ) => {
        {
            // The import is unused if the list is empty.
            #[allow(unused_imports)]
            use $crate::values::IntoCborValue;
            let mut _array = $crate::macros::Vec::<$crate::values::Value>::new();
            $(
                _array.push($value.into_cbor_value());
            )*
            $crate::values::Value::Array(_array)
        }
    };
}

#[macro_export]
macro_rules! cbor_array_vec {
    ( $vec:expr ) => {{
        use $crate::values::IntoCborValue;
        $crate::values::Value::Array($vec.into_iter().map(|x| x.into_cbor_value()).collect())
    }};
}

#[macro_export]
macro_rules! cbor_true {
    ( ) => {
        $crate::values::Value::Simple($crate::values::SimpleValue::TrueValue)
    };
}

#[macro_export]
macro_rules! cbor_false {
    ( ) => {
        $crate::values::Value::Simple($crate::values::SimpleValue::FalseValue)
    };
}

#[macro_export]
macro_rules! cbor_null {
    ( ) => {
        $crate::values::Value::Simple($crate::values::SimpleValue::NullValue)
    };
}

#[macro_export]
macro_rules! cbor_undefined {
    ( ) => {
        $crate::values::Value::Simple($crate::values::SimpleValue::Undefined)
    };
}

#[macro_export]
macro_rules! cbor_bool {
    ( $x:expr ) => {
        $crate::values::Value::bool_value($x)
    };
}

#[macro_export]
macro_rules! cbor_float {
    ( $x:expr ) => {
        $crate::values::Value::Float($x)
    };
}

// For key types, we construct a KeyType and call .into(), which will automatically convert it to a
// KeyType or a Value depending on the context.
#[macro_export]
macro_rules! cbor_unsigned {
    ( $x:expr ) => {
        $crate::values::Value::KeyValue($crate::cbor_key_unsigned!($x))
    };
}

#[macro_export]
macro_rules! cbor_int {
    ( $x:expr ) => {
        $crate::values::Value::KeyValue($crate::cbor_key_int!($x))
    };
}

#[macro_export]
macro_rules! cbor_text {
    ( $x:expr ) => {
        $crate::values::Value::KeyValue($crate::cbor_key_text!($x))
    };
}

#[macro_export]
macro_rules! cbor_bytes {
    ( $x:expr ) => {
        $crate::values::Value::KeyValue($crate::cbor_key_bytes!($x))
    };
}

// Macro to use with a literal, e.g. cbor_bytes_lit!(b"foo")
#[macro_export]
macro_rules! cbor_bytes_lit {
    ( $x:expr ) => {
        $crate::cbor_bytes!(($x as &[u8]).to_vec())
    };
}

// Some explicit macros are also available for contexts where the type is not explicit.
#[macro_export]
macro_rules! cbor_key_unsigned {
    ( $x:expr ) => {
        $crate::values::KeyType::Unsigned($x)
    };
}

#[macro_export]
macro_rules! cbor_key_int {
    ( $x:expr ) => {
        $crate::values::KeyType::integer($x)
    };
}

#[macro_export]
macro_rules! cbor_key_text {
    ( $x:expr ) => {
        $crate::values::KeyType::TextString($x.into())
    };
}

#[macro_export]
macro_rules! cbor_key_bytes {
    ( $x:expr ) => {
        $crate::values::KeyType::ByteString($x)
    };
}

// Re-exported so that the macros expand in crates without `extern crate alloc`.
#[doc(hidden)]
pub use alloc::collections::BTreeMap;
#[doc(hidden)]
pub use alloc::vec::Vec;

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    geometry::{Rectangle, Size},
};

/// Element type of a control value, as libcamera's `ControlType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    None,
    Bool,
    Byte,
    Int32,
    Int64,
    Float,
    String,
    Rectangle,
    Size,
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlType::None => "none",
            ControlType::Bool => "bool",
            ControlType::Byte => "byte",
            ControlType::Int32 => "int32",
            ControlType::Int64 => "int64",
            ControlType::Float => "float",
            ControlType::String => "string",
            ControlType::Rectangle => "rectangle",
            ControlType::Size => "size",
        })
    }
}

/// Element type plus array-ness; what a typed accessor expects to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlKind {
    pub control_type: ControlType,
    pub is_array: bool,
}

impl ControlKind {
    pub const fn scalar(control_type: ControlType) -> Self {
        Self {
            control_type,
            is_array: false,
        }
    }

    pub const fn array(control_type: ControlType) -> Self {
        Self {
            control_type,
            is_array: true,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}[]", self.control_type)
        } else {
            write!(f, "{}", self.control_type)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlScalar {
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Rectangle(Rectangle),
    Size(Size),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlArray {
    Bool(Vec<bool>),
    Byte(Vec<u8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Rectangle(Vec<Rectangle>),
    Size(Vec<Size>),
}

/// A control value copied out of (or destined for) the native library.
///
/// Strings are kept apart from the numeric variants since libcamera stores
/// them as byte arrays with their own rendering rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ControlValue {
    #[default]
    None,
    Scalar(ControlScalar),
    Array(ControlArray),
    String(String),
    StringArray(Vec<String>),
}

impl ControlScalar {
    pub fn control_type(&self) -> ControlType {
        match self {
            ControlScalar::Bool(_) => ControlType::Bool,
            ControlScalar::Byte(_) => ControlType::Byte,
            ControlScalar::Int32(_) => ControlType::Int32,
            ControlScalar::Int64(_) => ControlType::Int64,
            ControlScalar::Float(_) => ControlType::Float,
            ControlScalar::Rectangle(_) => ControlType::Rectangle,
            ControlScalar::Size(_) => ControlType::Size,
        }
    }
}

impl ControlArray {
    pub fn control_type(&self) -> ControlType {
        match self {
            ControlArray::Bool(_) => ControlType::Bool,
            ControlArray::Byte(_) => ControlType::Byte,
            ControlArray::Int32(_) => ControlType::Int32,
            ControlArray::Int64(_) => ControlType::Int64,
            ControlArray::Float(_) => ControlType::Float,
            ControlArray::Rectangle(_) => ControlType::Rectangle,
            ControlArray::Size(_) => ControlType::Size,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ControlArray::Bool(v) => v.len(),
            ControlArray::Byte(v) => v.len(),
            ControlArray::Int32(v) => v.len(),
            ControlArray::Int64(v) => v.len(),
            ControlArray::Float(v) => v.len(),
            ControlArray::Rectangle(v) => v.len(),
            ControlArray::Size(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ControlValue {
    pub fn control_type(&self) -> ControlType {
        match self {
            ControlValue::None => ControlType::None,
            ControlValue::Scalar(s) => s.control_type(),
            ControlValue::Array(a) => a.control_type(),
            ControlValue::String(_) | ControlValue::StringArray(_) => ControlType::String,
        }
    }

    /// libcamera treats a single string as a byte array, but it is reported
    /// here as a scalar so that `get::<String>()` matches `set_string()`.
    pub fn is_array(&self) -> bool {
        matches!(self, ControlValue::Array(_) | ControlValue::StringArray(_))
    }

    pub fn kind(&self) -> ControlKind {
        ControlKind {
            control_type: self.control_type(),
            is_array: self.is_array(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ControlValue::None)
    }

    pub fn num_elements(&self) -> usize {
        match self {
            ControlValue::None => 0,
            ControlValue::Scalar(_) | ControlValue::String(_) => 1,
            ControlValue::Array(a) => a.len(),
            ControlValue::StringArray(v) => v.len(),
        }
    }

    /// Reads the value as `T`, failing if it holds a different variant.
    pub fn get<T: ControlValueType>(&self) -> Result<T> {
        T::from_value(self)
    }

    /// Replaces the value, changing its variant to match `T`.
    pub fn set<T: ControlValueType>(&mut self, value: T) {
        *self = value.into_value();
    }

    /// Borrows the elements of an array value without copying.
    pub fn get_array<T: ControlElement>(&self) -> Result<&[T]> {
        let slice = match self {
            ControlValue::Array(a) => T::slice(a),
            _ => None,
        };
        slice.ok_or_else(|| self.wrong_variant(ControlKind::array(T::TYPE)))
    }

    pub fn set_array<T: ControlElement>(&mut self, values: &[T]) {
        *self = ControlValue::Array(T::into_array(values.to_vec()));
    }

    pub fn get_string(&self) -> Result<&str> {
        match self {
            ControlValue::String(s) => Ok(s),
            _ => Err(self.wrong_variant(ControlKind::scalar(ControlType::String))),
        }
    }

    pub fn set_string(&mut self, value: impl Into<String>) {
        *self = ControlValue::String(value.into());
    }

    pub fn get_string_array(&self) -> Result<&[String]> {
        match self {
            ControlValue::StringArray(v) => Ok(v),
            _ => Err(self.wrong_variant(ControlKind::array(ControlType::String))),
        }
    }

    pub fn set_string_array(&mut self, values: Vec<String>) {
        *self = ControlValue::StringArray(values);
    }

    pub(crate) fn wrong_variant(&self, expected: ControlKind) -> Error {
        Error::WrongVariant {
            expected,
            found: self.kind(),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f32) -> fmt::Result {
    write!(f, "{v:.6}")
}

impl fmt::Display for ControlScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlScalar::Bool(v) => write!(f, "{v}"),
            ControlScalar::Byte(v) => write!(f, "{v}"),
            ControlScalar::Int32(v) => write!(f, "{v}"),
            ControlScalar::Int64(v) => write!(f, "{v}"),
            ControlScalar::Float(v) => write_float(f, *v),
            ControlScalar::Rectangle(v) => write!(f, "{v}"),
            ControlScalar::Size(v) => write!(f, "{v}"),
        }
    }
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    f.write_str("[ ")?;
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item(f, v)?;
    }
    f.write_str(" ]")
}

impl fmt::Display for ControlArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlArray::Bool(v) => write_list(f, v, |f, v| write!(f, "{v}")),
            ControlArray::Byte(v) => write_list(f, v, |f, v| write!(f, "{v}")),
            ControlArray::Int32(v) => write_list(f, v, |f, v| write!(f, "{v}")),
            ControlArray::Int64(v) => write_list(f, v, |f, v| write!(f, "{v}")),
            ControlArray::Float(v) => write_list(f, v, |f, v| write_float(f, *v)),
            ControlArray::Rectangle(v) => write_list(f, v, |f, v| write!(f, "{v}")),
            ControlArray::Size(v) => write_list(f, v, |f, v| write!(f, "{v}")),
        }
    }
}

/// Renders like libcamera's `ControlValue::toString()`.
impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::None => f.write_str("<ValueType Error>"),
            ControlValue::Scalar(s) => write!(f, "{s}"),
            ControlValue::Array(a) => write!(f, "{a}"),
            ControlValue::String(s) => f.write_str(s),
            ControlValue::StringArray(v) => write_list(f, v, |f, v| f.write_str(v)),
        }
    }
}

/// Element types a control value can hold.
pub trait ControlElement: Sized + Clone + 'static {
    const TYPE: ControlType;

    fn from_scalar(scalar: &ControlScalar) -> Option<Self>;
    fn into_scalar(self) -> ControlScalar;
    fn slice(array: &ControlArray) -> Option<&[Self]>;
    fn into_array(values: Vec<Self>) -> ControlArray;
}

/// Rust types that convert to and from a [`ControlValue`].
///
/// Implemented for every element type `T`, for `Vec<T>` and `[T; N]` arrays,
/// for `String` and for `Vec<String>`.
pub trait ControlValueType: Sized {
    const KIND: ControlKind;

    fn from_value(value: &ControlValue) -> Result<Self>;
    fn into_value(self) -> ControlValue;
}

macro_rules! control_element {
    ($t:ty, $variant:ident) => {
        impl ControlElement for $t {
            const TYPE: ControlType = ControlType::$variant;

            fn from_scalar(scalar: &ControlScalar) -> Option<Self> {
                match scalar {
                    ControlScalar::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn into_scalar(self) -> ControlScalar {
                ControlScalar::$variant(self)
            }

            fn slice(array: &ControlArray) -> Option<&[Self]> {
                match array {
                    ControlArray::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_array(values: Vec<Self>) -> ControlArray {
                ControlArray::$variant(values)
            }
        }

        impl ControlValueType for $t {
            const KIND: ControlKind = ControlKind::scalar(ControlType::$variant);

            fn from_value(value: &ControlValue) -> Result<Self> {
                let scalar = match value {
                    ControlValue::Scalar(s) => <$t as ControlElement>::from_scalar(s),
                    _ => None,
                };
                scalar.ok_or_else(|| value.wrong_variant(Self::KIND))
            }

            fn into_value(self) -> ControlValue {
                ControlValue::Scalar(self.into_scalar())
            }
        }

        impl ControlValueType for Vec<$t> {
            const KIND: ControlKind = ControlKind::array(ControlType::$variant);

            fn from_value(value: &ControlValue) -> Result<Self> {
                value.get_array::<$t>().map(|s| s.to_vec())
            }

            fn into_value(self) -> ControlValue {
                ControlValue::Array(<$t as ControlElement>::into_array(self))
            }
        }

        impl<const N: usize> ControlValueType for [$t; N] {
            const KIND: ControlKind = ControlKind::array(ControlType::$variant);

            fn from_value(value: &ControlValue) -> Result<Self> {
                let slice = value.get_array::<$t>()?;
                <[$t; N]>::try_from(slice).map_err(|_| {
                    Error::InvalidArgument(format!(
                        "expected {} elements, found {}",
                        N,
                        slice.len()
                    ))
                })
            }

            fn into_value(self) -> ControlValue {
                ControlValue::Array(<$t as ControlElement>::into_array(self.to_vec()))
            }
        }

        impl From<$t> for ControlValue {
            fn from(value: $t) -> Self {
                value.into_value()
            }
        }

        impl From<Vec<$t>> for ControlValue {
            fn from(value: Vec<$t>) -> Self {
                value.into_value()
            }
        }
    };
}

control_element!(bool, Bool);
control_element!(u8, Byte);
control_element!(i32, Int32);
control_element!(i64, Int64);
control_element!(f32, Float);
control_element!(Rectangle, Rectangle);
control_element!(Size, Size);

impl ControlValueType for String {
    const KIND: ControlKind = ControlKind::scalar(ControlType::String);

    fn from_value(value: &ControlValue) -> Result<Self> {
        value.get_string().map(str::to_owned)
    }

    fn into_value(self) -> ControlValue {
        ControlValue::String(self)
    }
}

impl ControlValueType for Vec<String> {
    const KIND: ControlKind = ControlKind::array(ControlType::String);

    fn from_value(value: &ControlValue) -> Result<Self> {
        value.get_string_array().map(<[String]>::to_vec)
    }

    fn into_value(self) -> ControlValue {
        ControlValue::StringArray(self)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::String(value.to_owned())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        ControlValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut value = ControlValue::None;
        value.set(42i32);
        assert_eq!(value.get::<i32>().unwrap(), 42);
        assert_eq!(value.num_elements(), 1);
        assert!(!value.is_array());

        value.set([1.0f32, 2.0]);
        assert_eq!(value.control_type(), ControlType::Float);
        assert_eq!(value.get::<[f32; 2]>().unwrap(), [1.0, 2.0]);
        assert_eq!(value.get_array::<f32>().unwrap(), &[1.0, 2.0]);
        assert!(value.get::<[f32; 3]>().is_err());

        value.set_string("imx219");
        assert_eq!(value.get::<String>().unwrap(), "imx219");
    }

    #[test]
    fn wrong_variant_reports_kinds() {
        let value = ControlValue::from(vec![1i32, 2, 3]);
        match value.get::<i32>() {
            Err(Error::WrongVariant { expected, found }) => {
                assert_eq!(expected, ControlKind::scalar(ControlType::Int32));
                assert_eq!(found, ControlKind::array(ControlType::Int32));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = ControlValue::from(true).get::<f32>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "control value type mismatch: expected float, found bool"
        );
        assert!(ControlValue::None.get_string().is_err());
    }

    #[test]
    fn renders_like_libcamera() {
        assert_eq!(ControlValue::from(true).to_string(), "true");
        assert_eq!(ControlValue::from(7u8).to_string(), "7");
        assert_eq!(ControlValue::from(1.5f32).to_string(), "1.500000");
        assert_eq!(
            ControlValue::from(vec![1i64, -2, 3]).to_string(),
            "[ 1, -2, 3 ]"
        );
        assert_eq!(
            ControlValue::from(Rectangle::new(0, 0, 640, 480)).to_string(),
            "(0, 0)/640x480"
        );
        assert_eq!(ControlValue::from("ov5640").to_string(), "ov5640");
        assert_eq!(ControlValue::None.to_string(), "<ValueType Error>");
    }
}

//! Rejects values JSON cannot carry.
//!
//! `serde_json` writes `NaN` and the infinities as `null`, which would hand a
//! consumer different arguments than the producer passed. [`ensure_finite`]
//! walks a value through a serializer that only looks at floats.

use serde::Serialize;
use serde::ser;
use std::fmt;

/// A non-finite float (or a custom serialization error) found in a value.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NotRepresentable(String);

impl ser::Error for NotRepresentable {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Fail if `value` contains a `NaN` or infinite `f32`/`f64` anywhere.
pub fn ensure_finite<T: ?Sized + Serialize>(value: &T) -> Result<(), NotRepresentable> {
    value.serialize(FiniteCheck)
}

struct FiniteCheck;

fn check_float(value: f64) -> Result<(), NotRepresentable> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NotRepresentable(format!(
            "{} cannot be represented in JSON",
            value
        )))
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_i128(self, _v: i128) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_u128(self, _v: u128) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), NotRepresentable> {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), NotRepresentable> {
        check_float(v)
    }
    fn serialize_char(self, _v: char) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), NotRepresentable> {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), NotRepresentable> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), NotRepresentable> {
        value.serialize(self)
    }
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, NotRepresentable> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), NotRepresentable> {
        key.serialize(FiniteCheck)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = NotRepresentable;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), NotRepresentable> {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> Result<(), NotRepresentable> {
        Ok(())
    }
}

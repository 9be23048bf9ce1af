//! A convenience layer on top of [`Writer`]/[`Reader`]: a `Parcelable`
//! trait plus blanket impls for the types that show up in practically
//! every parcel, so a derive-generated struct doesn't have to hand-roll
//! scalar plumbing. Generalized from the teacher's `parcelable.rs`, split
//! across the writer/reader pair instead of a single read/write `Parcel`.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::Error;
use crate::reader::Reader;
use crate::writer::Writer;

pub trait Parcelable: Sized {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error>;
    fn serialize(&self, writer: &mut Writer);
}

/// The legacy narrow AIDL string: NUL-scanned, no length prefix, no null
/// encoding. Most callers want plain [`String`], which rides the
/// length-prefixed, nullable `string16` wire format instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct String8(pub String);

macro_rules! implement_byte_sized {
    ($ty:ty) => {
        impl Parcelable for $ty {
            fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
                Ok(reader.read_byte()? as $ty)
            }
            fn serialize(&self, writer: &mut Writer) {
                writer.write_byte(*self as u8);
            }
        }
    };
}

implement_byte_sized!(u8);
implement_byte_sized!(i8);

macro_rules! implement_via_i32 {
    ($ty:ty) => {
        impl Parcelable for $ty {
            fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
                Ok(reader.read_i32()? as $ty)
            }
            fn serialize(&self, writer: &mut Writer) {
                writer.write_i32(*self as i32);
            }
        }
    };
}

// Binder parcels pad everything smaller than a word to 4 bytes; there is
// no distinct 2-byte wire primitive to ride instead.
implement_via_i32!(u16);
implement_via_i32!(i16);
implement_via_i32!(i32);

impl Parcelable for u32 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(reader.read_u32()?)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_u32(*self);
    }
}

impl Parcelable for i64 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(reader.read_i64()?)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_i64(*self);
    }
}

impl Parcelable for u64 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(reader.read_u64()?)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_u64(*self);
    }
}

impl Parcelable for f32 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(f32::from_bits(reader.read_u32()?))
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_u32(self.to_bits());
    }
}

impl Parcelable for f64 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(f64::from_bits(reader.read_u64()?))
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_u64(self.to_bits());
    }
}

impl Parcelable for bool {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(reader.read_bool()?)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }
}

impl Parcelable for String {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        reader.read_string16()?.ok_or(Error::DeserializationError)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.append_string16(Some(self));
    }
}

impl Parcelable for String8 {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(String8(reader.read_string8()?.to_string()))
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.append_string8(Some(&self.0));
    }
}

impl<T: Parcelable> Parcelable for Option<T> {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let present = reader.read_i32()?;
        if present != 0 {
            Ok(Some(T::deserialize(reader)?))
        } else {
            Ok(None)
        }
    }
    fn serialize(&self, writer: &mut Writer) {
        match self {
            Some(inner) => {
                writer.write_i32(1);
                inner.serialize(writer);
            }
            None => writer.write_i32(0),
        }
    }
}

impl<T: Parcelable> Parcelable for Box<T> {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        Ok(Box::new(T::deserialize(reader)?))
    }
    fn serialize(&self, writer: &mut Writer) {
        self.as_ref().serialize(writer);
    }
}

impl<T: Parcelable> Parcelable for Vec<T> {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let len = reader.read_i32()? as usize;
        let mut res = Vec::with_capacity(len);
        for _ in 0..len {
            res.push(T::deserialize(reader)?);
        }
        Ok(res)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_i32(self.len() as i32);
        for val in self {
            val.serialize(writer);
        }
    }
}

impl<K: Parcelable + Eq + Hash, V: Parcelable> Parcelable for HashMap<K, V> {
    fn deserialize(reader: &mut Reader) -> Result<Self, Error> {
        let len = reader.read_i32()?;
        let mut res = HashMap::new();
        for _ in 0..len {
            res.insert(K::deserialize(reader)?, V::deserialize(reader)?);
        }
        Ok(res)
    }
    fn serialize(&self, writer: &mut Writer) {
        writer.write_i32(self.len() as i32);
        for (k, v) in self {
            k.serialize(writer);
            v.serialize(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Io64;

    fn round_trip<T: Parcelable + PartialEq + std::fmt::Debug>(value: T) {
        let io = Io64;
        let mut w = Writer::new(&io);
        value.serialize(&mut w);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(T::deserialize(&mut r).unwrap(), value);
    }

    #[test]
    fn primitives_round_trip() {
        round_trip(42u8);
        round_trip(-7i8);
        round_trip(1234u16);
        round_trip(-1234i16);
        round_trip(-100_000i32);
        round_trip(100_000u32);
        round_trip(-1i64);
        round_trip(1u64);
        round_trip(true);
        round_trip(false);
    }

    #[test]
    fn float_round_trip() {
        round_trip(1.5f32);
        round_trip(-2.25f64);
    }

    #[test]
    fn string_round_trip() {
        round_trip("hello".to_string());
    }

    #[test]
    fn string8_round_trip() {
        round_trip(String8("legacy".to_string()));
    }

    #[test]
    fn option_round_trip() {
        round_trip(Some(5i32));
        round_trip(None::<i32>);
    }

    #[test]
    fn vec_round_trip() {
        round_trip(vec![1i32, 2, 3]);
    }

    #[test]
    fn hash_map_round_trip() {
        let io = Io64;
        let mut map = HashMap::new();
        map.insert(1i32, "one".to_string());
        map.insert(2i32, "two".to_string());

        let mut w = Writer::new(&io);
        map.serialize(&mut w);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        let decoded = HashMap::<i32, String>::deserialize(&mut r).unwrap();
        assert_eq!(decoded, map);
    }
}

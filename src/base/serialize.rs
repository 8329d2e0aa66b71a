// This file is part of TRINCI.
//
// Copyright (C) 2021 Affidaty Spa.
//
// TRINCI is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// TRINCI is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with TRINCI. If not, see <https://www.gnu.org/licenses/>.

use crate::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Serialize using MessagePack format (without field names).
///
/// # Error
///
/// If the data cannot be serialized a `MalformedData` error kind is returned.
pub fn rmp_serialize<T>(val: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    rmp_serde::to_vec(val).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Deserialize using MessagePack format.
///
/// # Error
///
/// If the data cannot be deserialized a `MalformedData` error kind is returned.
pub fn rmp_deserialize<'a, T>(buf: &'a [u8]) -> Result<T>
where
    T: Deserialize<'a>,
{
    rmp_serde::from_slice(buf).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Serialize using JSON format, used by the REST transport.
pub fn json_serialize<T>(val: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    serde_json::to_vec(val).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Deserialize using JSON format.
pub fn json_deserialize<'a, T>(buf: &'a [u8]) -> Result<T>
where
    T: Deserialize<'a>,
{
    serde_json::from_slice(buf).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Decodes an hex string, the `0x` prefix is optional.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Encodes bytes as a `0x` prefixed hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

struct BytesVisitor;

impl<'de> serde::de::Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "expecting byte array or hex string.")
    }

    fn visit_str<E>(self, s: &str) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        decode_hex(s).map_err(|_err| E::custom("invalid hex string"))
    }

    fn visit_bytes<E>(self, bytes: &[u8]) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(bytes.to_vec())
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(byte) = seq.next_element::<u8>()? {
            buf.push(byte);
        }
        Ok(buf)
    }
}

/// Variable length bytes: `0x` hex string for human readable formats, raw
/// bytes otherwise. Use with `#[serde(with = "hex_bytes")]`.
pub mod hex_bytes {
    use super::{encode_hex, BytesVisitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]> + ?Sized,
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&encode_hex(bytes.as_ref()))
        } else {
            serializer.serialize_bytes(bytes.as_ref())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(BytesVisitor)
    }
}

/// Fixed length bytes, same encoding rules of [hex_bytes].
pub mod hex_array {
    use super::BytesVisitor;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::hex_bytes::serialize(&bytes[..], serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(
        deserializer: D,
    ) -> std::result::Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = deserializer.deserialize_any(BytesVisitor)?;
        let len = buf.len();
        buf.try_into()
            .map_err(|_| D::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
    struct Anchor {
        height: u64,
        #[serde(with = "hex_array")]
        root: [u8; 4],
        #[serde(with = "hex_bytes")]
        extra: Vec<u8>,
    }

    fn anchor() -> Anchor {
        Anchor {
            height: 42,
            root: [0xde, 0xad, 0xbe, 0xef],
            extra: vec![0x01, 0xff],
        }
    }

    const ANCHOR_HEX: &str = "932ac404deadbeefc40201ff";

    #[test]
    fn anchor_rmp_serialize() {
        let buf = rmp_serialize(&anchor()).unwrap();

        assert_eq!(hex::encode(&buf), ANCHOR_HEX);
    }

    #[test]
    fn anchor_rmp_deserialize() {
        let buf = hex::decode(ANCHOR_HEX).unwrap();

        let val: Anchor = rmp_deserialize(&buf).unwrap();

        assert_eq!(val, anchor());
    }

    #[test]
    fn anchor_json_uses_hex_strings() {
        let buf = json_serialize(&anchor()).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            r#"{"height":42,"root":"0xdeadbeef","extra":"0x01ff"}"#
        );
    }

    #[test]
    fn json_hex_prefix_is_optional() {
        let val: Anchor =
            json_deserialize(br#"{"height":42,"root":"deadbeef","extra":"0x01ff"}"#).unwrap();

        assert_eq!(val, anchor());
    }

    #[test]
    fn json_wrong_array_length() {
        let err = json_deserialize::<Anchor>(br#"{"height":1,"root":"0xdead","extra":"0x"}"#)
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::MalformedData);
    }
}

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

//! SHA-256 digests.

use crate::{
    base::serialize::{self, encode_hex, hex_array},
    Error, ErrorKind, Result,
};
use ring::digest;
use std::fmt::{Display, Formatter};

/// Digest length in bytes.
pub const HASH_LEN: usize = 32;

/// SHA-256 digest.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Wraps precomputed digest bytes.
    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    /// Construct from a bytes slice holding exactly one digest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_LEN {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("expected {} bytes digest, got {}", HASH_LEN, bytes.len()),
            ));
        }
        let mut hash = Hash::default();
        hash.0.copy_from_slice(bytes);
        Ok(hash)
    }

    /// Compute hash from arbitrary data.
    pub fn from_data(data: &[u8]) -> Self {
        let digest = digest::digest(&digest::SHA256, data);
        let mut hash = Hash::default();
        hash.0.copy_from_slice(digest.as_ref());
        hash
    }

    /// Creates a new instance from a hex string (optionally `0x` prefixed).
    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_bytes(&serialize::decode_hex(hex)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl serde::Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        hex_array::serialize(&self.0, serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        hex_array::deserialize(deserializer).map(Hash)
    }
}

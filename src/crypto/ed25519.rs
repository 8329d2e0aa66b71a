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

//! Ed25519 sequencer keys.

use crate::{base::serialize::hex_bytes, Error, ErrorKind, Result};
use ed25519_dalek::{
    Keypair as KeyPairImpl, PublicKey as PublicKeyImpl, Signer as _, Verifier as _,
};
use rand::rngs::OsRng;
use serde::{self, Deserialize, Serialize};
use std::convert::TryFrom;

/// Multihash identity tag used by the textual sequencer identifier.
const MULTIHASH_TYPE_IDENTITY: u8 = 0x00;

pub struct KeyPair(KeyPairImpl);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    imp: PublicKeyImpl,
}

impl KeyPair {
    pub fn from_bytes(bytes: &[u8]) -> Result<KeyPair> {
        let internal = KeyPairImpl::from_bytes(bytes)
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        Ok(KeyPair(internal))
    }

    pub fn from_random() -> KeyPair {
        let mut csprng = OsRng {};
        let internal = KeyPairImpl::generate(&mut csprng);
        KeyPair(internal)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let sig = self.0.sign(data).to_bytes().to_vec();
        Ok(sig)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey { imp: self.0.public }
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<PublicKey> {
        let internal = PublicKeyImpl::from_bytes(bytes)
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        Ok(PublicKey { imp: internal })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.imp.to_bytes().to_vec()
    }

    pub fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
        ed25519_dalek::Signature::try_from(sig)
            .and_then(|s| self.imp.verify(data, &s))
            .is_ok()
    }

    /// Base58 identifier, used in logs.
    pub fn to_sequencer_id(&self) -> String {
        let key = add_protobuf_header(self.to_bytes());
        let mut buf = vec![MULTIHASH_TYPE_IDENTITY, key.len() as u8];
        buf.extend_from_slice(&key);
        bs58::encode(buf).into_string()
    }
}

#[rustfmt::skip]
fn add_protobuf_header(mut buf: Vec<u8>) -> Vec<u8> {
    let mut res: Vec<u8> = vec![
        // Algorithm type tag.
        0x08,
        // Ed25519.
        0x01,
        // Length tag.
        0x12,
        // Payload length.
        buf.len() as u8,
    ];
    res.append(&mut buf);
    res
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        hex_bytes::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = hex_bytes::deserialize(deserializer)?;
        PublicKey::from_bytes(&bytes)
            .map_err(|_err| serde::de::Error::custom("invalid ed25519 public key"))
    }
}

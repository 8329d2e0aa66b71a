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

//! Library error codes and results.
//!
//! Two families live here:
//! - the ambient [Error], carried by the execution engine collaborator, the
//!   serialization helpers and the service channels;
//! - the closed soft-block enumerations ([ValidationError], [AdmitError],
//!   [RollbackError], [TrackerError]). Callers match on the variant, never on
//!   the message text.

use crate::crypto::Hash;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Project-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Max string length when the error is converted to string using `to_string_full`.
const MAX_ERROR_SOURCE_STRING_LENGTH: usize = 128;

/// Error kind to better contextualize the returned error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    MalformedData,
    InvalidSignature,
    EngineFault,
    ResourceNotFound,
    ServiceUnavailable,
    Other,
}

/// Error kind strings.
pub(super) mod error_kind_str {
    pub const MALFORMED_DATA: &str = "malformed data";
    pub const INVALID_SIGNATURE: &str = "invalid signature";
    pub const ENGINE_FAULT: &str = "engine fault";
    pub const RESOURCE_NOT_FOUND: &str = "resource not found";
    pub const SERVICE_UNAVAILABLE: &str = "service unavailable";
    pub const OTHER: &str = "other";
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        let kind_str = match self {
            MalformedData => error_kind_str::MALFORMED_DATA,
            InvalidSignature => error_kind_str::INVALID_SIGNATURE,
            EngineFault => error_kind_str::ENGINE_FAULT,
            ResourceNotFound => error_kind_str::RESOURCE_NOT_FOUND,
            ServiceUnavailable => error_kind_str::SERVICE_UNAVAILABLE,
            Other => error_kind_str::OTHER,
        };
        write!(f, "{}", kind_str)
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let kind = match deserializer.deserialize_str(StringVisitor)?.as_str() {
            error_kind_str::MALFORMED_DATA => ErrorKind::MalformedData,
            error_kind_str::INVALID_SIGNATURE => ErrorKind::InvalidSignature,
            error_kind_str::ENGINE_FAULT => ErrorKind::EngineFault,
            error_kind_str::RESOURCE_NOT_FOUND => ErrorKind::ResourceNotFound,
            error_kind_str::SERVICE_UNAVAILABLE => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Other,
        };
        Ok(kind)
    }
}

struct StringVisitor;

impl<'de> Visitor<'de> for StringVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<R>(self, value: &str) -> std::result::Result<String, R> {
        Ok(value.to_string())
    }
}

/// Project-wide error type.
/// Contains a kind enumerate and a `source` to identify the subsystem that may
/// have propagated the error.
#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    /// Error kind.
    pub kind: ErrorKind,
    /// Only the source message survives serialization.
    #[serde(serialize_with = "source_se", deserialize_with = "source_de")]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

fn source_se<S: Serializer>(
    source: &Option<Box<dyn std::error::Error + Send + Sync>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match source {
        Some(b) => s.serialize_str(&b.to_string()),
        None => s.serialize_unit(),
    }
}

fn source_de<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<Box<dyn std::error::Error + Send + Sync>>, D::Error> {
    let source: Option<String> = Option::deserialize(d)?;
    Ok(source.map(|s| s.into()))
}

impl Clone for Error {
    fn clone(&self) -> Self {
        // The boxed source is not clonable, keep its message.
        Error {
            kind: self.kind,
            source: self
                .source
                .as_ref()
                .map(|source| source.to_string().into()),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::new_ext(ErrorKind::Other, s)
    }
}

impl<T> From<ErrorKind> for Result<T> {
    fn from(kind: ErrorKind) -> Self {
        Err(kind.into())
    }
}

impl Error {
    pub fn new_ext<E>(kind: ErrorKind, error: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error {
            kind,
            source: Some(error.into()),
        }
    }

    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub fn to_string_full(&self) -> String {
        let mut err_string = self.to_string();
        if let Some(ref source) = self.source {
            let detail = format!(": {}", source);
            let max_len = std::cmp::min(detail.len(), MAX_ERROR_SOURCE_STRING_LENGTH);
            let mut cut = max_len;
            while !detail.is_char_boundary(cut) {
                cut -= 1;
            }
            err_string.push_str(&detail[..cut]);
        }
        err_string
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match (&self.source, &other.source) {
            (None, None) => true,
            (Some(a), Some(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.source {
            None => None,
            Some(ref source) => Some(source.as_ref()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Reasons for rejecting a transaction group before it touches the tracker.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum ValidationError {
    /// The preconfirmation epoch has been closed by an end-of-preconf group.
    EpochClosed,
    /// No block is open and the group does not target the next soft height.
    UnexpectedBlockId { expected: u64, got: u64 },
    /// A different block is still accumulating groups.
    BlockNotClosed { open_block_id: u64, got: u64 },
    /// Block parameters differ from the ones fixed by the first group.
    ParamsMismatch {
        block_id: u64,
        fields: Vec<String>,
    },
    /// Group identifier is not the next expected one.
    OutOfOrderGroup { expected: u64, got: u64 },
    /// Transaction already present in the open block or repeated in the group.
    DuplicateTransaction { hash: Hash },
    /// Transaction failed the shape or engine checks.
    InvalidTransaction { index: usize, reason: String },
    /// Missing signature or signer different from the expected sequencer.
    BadSignature,
}

impl ValidationError {
    /// Stable identifier, used by the transport error body.
    pub fn code(&self) -> &'static str {
        use ValidationError::*;
        match self {
            EpochClosed => "EpochClosed",
            UnexpectedBlockId { .. } => "UnexpectedBlockId",
            BlockNotClosed { .. } => "BlockNotClosed",
            ParamsMismatch { .. } => "ParamsMismatch",
            OutOfOrderGroup { .. } => "OutOfOrderGroup",
            DuplicateTransaction { .. } => "DuplicateTransaction",
            InvalidTransaction { .. } => "InvalidTransaction",
            BadSignature => "BadSignature",
        }
    }

    /// The group skips one or more identifiers.
    pub fn is_gap(&self) -> bool {
        match self {
            ValidationError::OutOfOrderGroup { expected, got } => got > expected,
            _ => false,
        }
    }

    /// The group was already accepted (or belongs to the past).
    pub fn is_stale(&self) -> bool {
        match self {
            ValidationError::OutOfOrderGroup { expected, got } => got < expected,
            _ => false,
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ValidationError::*;
        match self {
            EpochClosed => write!(f, "preconfirmation epoch is closed"),
            UnexpectedBlockId { expected, got } => {
                write!(f, "unexpected block {}, next soft block is {}", got, expected)
            }
            BlockNotClosed { open_block_id, got } => write!(
                f,
                "block {} is still open, cannot start block {}",
                open_block_id, got
            ),
            ParamsMismatch { block_id, fields } => write!(
                f,
                "block {} parameters mismatch: {}",
                block_id,
                fields.join(", ")
            ),
            OutOfOrderGroup { expected, got } => {
                write!(f, "out of order group {}, expected {}", got, expected)
            }
            DuplicateTransaction { hash } => write!(f, "duplicate transaction {}", hash),
            InvalidTransaction { index, reason } => {
                write!(f, "invalid transaction at index {}: {}", index, reason)
            }
            BadSignature => write!(f, "bad sequencer signature"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Admission failure.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "error", rename_all = "camelCase")]
pub enum AdmitError {
    /// The group was rejected, the tracker is untouched.
    Validation(ValidationError),
    /// The engine failed to build the closed block, the group may be resent.
    BuildFailed(Error),
}

impl AdmitError {
    pub fn code(&self) -> &'static str {
        match self {
            AdmitError::Validation(err) => err.code(),
            AdmitError::BuildFailed(_) => "BuildFailed",
        }
    }
}

impl From<ValidationError> for AdmitError {
    fn from(err: ValidationError) -> Self {
        AdmitError::Validation(err)
    }
}

impl Display for AdmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmitError::Validation(err) => write!(f, "{}", err),
            AdmitError::BuildFailed(err) => write!(f, "build failed: {}", err.to_string_full()),
        }
    }
}

impl std::error::Error for AdmitError {}

/// Soft blocks truncation failure.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "error", rename_all = "camelCase")]
pub enum RollbackError {
    /// The first block to remove has already been finalized.
    CannotRemoveFinalized { block_id: u64, finalized_height: u64 },
    /// The engine refused or failed the removal, the tracker is untouched.
    EngineFailure(Error),
}

impl RollbackError {
    pub fn code(&self) -> &'static str {
        match self {
            RollbackError::CannotRemoveFinalized { .. } => "CannotRemoveFinalized",
            RollbackError::EngineFailure(_) => "EngineFailure",
        }
    }
}

impl Display for RollbackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackError::CannotRemoveFinalized {
                block_id,
                finalized_height,
            } => write!(
                f,
                "cannot remove block {}, finalized up to {}",
                block_id, finalized_height
            ),
            RollbackError::EngineFailure(err) => {
                write!(f, "engine failure: {}", err.to_string_full())
            }
        }
    }
}

impl std::error::Error for RollbackError {}

/// Guards of the tracker's own state transitions.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TrackerError {
    AlreadyOpen { block_id: u64 },
    NotOpen,
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::AlreadyOpen { block_id } => write!(f, "block {} already open", block_id),
            TrackerError::NotOpen => write!(f, "no open block"),
        }
    }
}

impl std::error::Error for TrackerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::serialize::{rmp_deserialize, rmp_serialize};
    use std::io;
    use ErrorKind::*;

    #[test]
    fn generic_error_type() {
        let src1 = io::Error::new(io::ErrorKind::PermissionDenied, "oh no!");
        let src2 = io::Error::new(io::ErrorKind::TimedOut, "oh no?");
        let err1 = Error::new_ext(EngineFault, src1);
        let err2 = Error::new_ext(EngineFault, src2);

        assert_ne!(err1, err2);
    }

    #[test]
    fn external_engine_failure() {
        let source = io::Error::new(io::ErrorKind::PermissionDenied, "oh no!");

        let error = Error::new_ext(EngineFault, source);

        assert_eq!(error.to_string(), "engine fault");
        assert_eq!(error.to_string_full(), "engine fault: oh no!");
        let source = std::error::Error::source(&error)
            .unwrap()
            .downcast_ref::<io::Error>()
            .unwrap();
        assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn clone_keeps_source_message() {
        let error = Error::new_ext(EngineFault, "connection reset");

        let cloned = error.clone();

        assert_eq!(cloned, error);
        assert_eq!(cloned.to_string_full(), "engine fault: connection reset");
    }

    #[test]
    fn error_serialize_deserialize() {
        let error = Error::new_ext(EngineFault, "oh no!");

        let buf = rmp_serialize(&error).unwrap();
        let err: Error = rmp_deserialize(&buf).unwrap();

        assert_eq!(err, error);
    }

    #[test]
    fn error_no_source_serialize_deserialize() {
        let error = Error::new(ResourceNotFound);

        let buf = rmp_serialize(&error).unwrap();
        let err: Error = rmp_deserialize(&buf).unwrap();

        assert_eq!(err, error);
    }

    #[test]
    fn out_of_order_direction() {
        let gap = ValidationError::OutOfOrderGroup {
            expected: 2,
            got: 4,
        };
        let stale = ValidationError::OutOfOrderGroup {
            expected: 2,
            got: 1,
        };

        assert!(gap.is_gap() && !gap.is_stale());
        assert!(stale.is_stale() && !stale.is_gap());
        assert_eq!(gap.code(), stale.code());
    }

    #[test]
    fn validation_error_json_shape() {
        let err = ValidationError::BlockNotClosed {
            open_block_id: 5,
            got: 6,
        };

        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["code"], "blockNotClosed");
        assert_eq!(json["open_block_id"], 5);
    }

    #[test]
    fn admit_error_codes() {
        let err: AdmitError = ValidationError::EpochClosed.into();
        assert_eq!(err.code(), "EpochClosed");

        let err = AdmitError::BuildFailed(Error::new(EngineFault));
        assert_eq!(err.code(), "BuildFailed");
        assert_eq!(err.to_string(), "build failed: engine fault");
    }
}

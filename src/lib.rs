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

//! Soft blocks sequencing core.
//!
//! Transaction groups streamed by the sequencer are validated, accumulated
//! into the open soft block and handed to the execution engine when a group
//! closes the block. Soft blocks can be truncated above a given height until
//! they are finalized.

// External crates macros.
#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// Public modules.
pub mod base;
pub mod channel;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod softblocks;

// Optional public modules.
#[cfg(feature = "rest")]
pub mod rest;

pub use base::{BlockParams, GroupMarker, Header, RawTransaction, RemovedSummary, TransactionGroup};
pub use crypto::{KeyPair, PublicKey};
pub use engine::ExecutionEngine;
pub use error::{AdmitError, Error, ErrorKind, Result, RollbackError, ValidationError};
pub use softblocks::{Message, SoftBlockConfig, SoftBlockService};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const VERSION_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");
pub const VERSION_PRE: &str = env!("CARGO_PKG_VERSION_PRE");

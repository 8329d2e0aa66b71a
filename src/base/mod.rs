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

//! Soft blocks data model and serialization helpers.

pub mod schema;
pub mod serialize;

pub use schema::{
    Address, BlockParams, Bytes32, GroupMarker, Header, RawTransaction, RemovedSummary,
    TransactionGroup,
};

/// Mutex used across the crate.
pub type Mutex<T> = parking_lot::Mutex<T>;

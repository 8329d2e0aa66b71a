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

//! Soft blocks service components.
//!
//! This module admits the transaction groups streamed by the sequencer and
//! turns them into soft blocks, i.e. blocks inserted in the execution engine
//! but not yet finalized on the settlement layer.
//!
//! The service exploits several sub-modules:
//! - tracker: cursor over the currently open block and the last soft height.
//! - validator: pure checks of an incoming group against the tracker.
//! - admitter: validates, accumulates and triggers the block construction.
//! - rollback: truncates soft blocks above a given height.
//! - worker: drains the request queue, one request at a time.
//! - service: owns the worker thread and the request channel.
//! - message: requests and responses exchanged through that channel.
//!
//! Admitter and rollback coordinator share a single [SoftChain] behind one
//! mutex: every admission and truncation runs in that critical section, the
//! engine calls included.
//!
//! External components interact with the service via message passing.

pub mod admitter;
pub mod message;
pub mod rollback;
pub mod service;
pub mod tracker;
pub mod validator;
pub mod worker;

pub use admitter::{BatchOutcome, BatchRejection, SoftBlockAdmitter};
pub use message::{Message, SoftBlockRequestReceiver, SoftBlockRequestSender};
pub use rollback::RollbackCoordinator;
pub use service::{SoftBlockConfig, SoftBlockService};
pub use tracker::{AbandonedBlock, OpenBlock, SoftBlockTracker, TrackerStatus};
pub use validator::{GroupValidator, ValidatedGroup};

use crate::{base::Mutex, engine::ExecutionEngine, Result};
use std::sync::Arc;

/// Tracker and engine, mutated together under the same lock.
pub struct SoftChain<E: ExecutionEngine> {
    pub(crate) tracker: SoftBlockTracker,
    pub(crate) engine: E,
}

impl<E: ExecutionEngine> SoftChain<E> {
    /// Rebuilds the tracker cursor from the engine head.
    pub fn new(engine: E) -> Result<Self> {
        let tracker = SoftBlockTracker::from_engine(&engine)?;
        Ok(SoftChain { tracker, engine })
    }

    pub fn tracker(&self) -> &SoftBlockTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// Soft chain shared by admitter and rollback coordinator.
pub type SharedChain<E> = Arc<Mutex<SoftChain<E>>>;

/// Wraps a soft chain for sharing.
pub fn shared_chain<E: ExecutionEngine>(chain: SoftChain<E>) -> SharedChain<E> {
    Arc::new(Mutex::new(chain))
}

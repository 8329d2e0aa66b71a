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

//! Soft blocks truncation.

use super::{SharedChain, SoftChain};
use crate::{
    base::{Header, RemovedSummary},
    engine::ExecutionEngine,
    error::RollbackError,
    Error, ErrorKind,
};

/// Removes soft blocks from the top of the chain.
pub struct RollbackCoordinator<E: ExecutionEngine> {
    /// Soft chain shared with the admitter.
    chain: SharedChain<E>,
}

impl<E: ExecutionEngine> RollbackCoordinator<E> {
    pub fn new(chain: SharedChain<E>) -> Self {
        RollbackCoordinator { chain }
    }

    /// Removes every block above `height`.
    ///
    /// Truncating above the soft head is a successful no-op. The open block,
    /// if any, is discarded together with the removed blocks. The epoch state
    /// is never touched.
    pub fn remove_above(&self, height: u64) -> Result<RemovedSummary, RollbackError> {
        let mut chain = self.chain.lock();
        let SoftChain { tracker, engine } = &mut *chain;

        let last = tracker.last_soft_block_height();
        let open_beyond = tracker.open_block_id().map_or(false, |id| id > height);
        if height >= last && !open_beyond {
            debug!("nothing to remove above {}, soft head is {}", height, last);
            let current_head = Self::header_at(engine, last)?;
            return Ok(RemovedSummary {
                current_head,
                head_removed: 0,
            });
        }

        let first_removed = height.saturating_add(1);
        let finalized_height = engine
            .finalized_height()
            .map_err(RollbackError::EngineFailure)?;
        if first_removed <= finalized_height {
            warn!(
                "refused to remove block {}, finalized up to {}",
                first_removed, finalized_height
            );
            return Err(RollbackError::CannotRemoveFinalized {
                block_id: first_removed,
                finalized_height,
            });
        }

        let head_removed = match engine.remove_blocks_above(height) {
            Ok(count) => count,
            Err(err) => {
                warn!("removal above {} failed: {}", height, err.to_string_full());
                return Err(RollbackError::EngineFailure(err));
            }
        };
        let discarded = tracker.open_block_id();
        tracker.reset(height);
        info!(
            "removed {} soft blocks above {} (open block discarded: {:?})",
            head_removed, height, discarded
        );

        let current_head = engine.head().map_err(RollbackError::EngineFailure)?;
        Ok(RemovedSummary {
            current_head,
            head_removed,
        })
    }

    fn header_at(engine: &E, height: u64) -> Result<Header, RollbackError> {
        match engine.header_at(height) {
            Ok(Some(header)) => Ok(header),
            Ok(None) => Err(RollbackError::EngineFailure(Error::new_ext(
                ErrorKind::ResourceNotFound,
                format!("header at height {} not found", height),
            ))),
            Err(err) => Err(RollbackError::EngineFailure(err)),
        }
    }
}

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

//! Transaction groups admission.
//!
//! Every call validates the incoming group against the tracker, accumulates it
//! into the open block and, when the group carries a closing marker, asks the
//! execution engine to build the block. The whole sequence runs while holding
//! the soft chain lock, engine call included.

use super::{
    tracker::AbandonedBlock, GroupValidator, SharedChain, SoftChain, TrackerStatus,
};
use crate::{
    base::{Header, TransactionGroup},
    crypto::SequencerSchedule,
    engine::ExecutionEngine,
    error::{AdmitError, TrackerError},
    Error, ErrorKind,
};
use std::sync::Arc;

/// Groups batch admission result.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Headers of the blocks built by the batch, in order.
    pub headers: Vec<Header>,
    /// First rejected group, the following ones have not been submitted.
    pub rejected: Option<BatchRejection>,
}

/// Rejected group of a batch.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct BatchRejection {
    /// Position of the group within the batch.
    pub index: usize,
    pub error: AdmitError,
}

/// Soft blocks admitter.
pub struct SoftBlockAdmitter<E: ExecutionEngine, S: SequencerSchedule> {
    /// Soft chain shared with the rollback coordinator.
    chain: SharedChain<E>,
    /// Group validation rules.
    validator: GroupValidator,
    /// Expected sequencer for each block.
    schedule: Arc<S>,
}

/// Tracker guards are never hit after a successful validation.
fn tracker_fault(err: TrackerError) -> AdmitError {
    AdmitError::BuildFailed(Error::new_ext(ErrorKind::Other, err))
}

impl<E: ExecutionEngine, S: SequencerSchedule> SoftBlockAdmitter<E, S> {
    pub fn new(chain: SharedChain<E>, validator: GroupValidator, schedule: Arc<S>) -> Self {
        SoftBlockAdmitter {
            chain,
            validator,
            schedule,
        }
    }

    /// Admits a single group.
    /// Returns the header of the built block if the group closed it.
    pub fn admit(&self, group: TransactionGroup) -> Result<Option<Header>, AdmitError> {
        let mut chain = self.chain.lock();
        self.admit_locked(&mut chain, group)
    }

    /// Admits the groups in order, stopping at the first rejection.
    /// The soft chain lock is held for the whole batch.
    pub fn admit_batch(&self, groups: Vec<TransactionGroup>) -> BatchOutcome {
        let mut chain = self.chain.lock();
        let mut outcome = BatchOutcome::default();
        for (index, group) in groups.into_iter().enumerate() {
            match self.admit_locked(&mut chain, group) {
                Ok(Some(header)) => outcome.headers.push(header),
                Ok(None) => (),
                Err(error) => {
                    debug!("batch stopped at group #{}: {}", index, error);
                    outcome.rejected = Some(BatchRejection { index, error });
                    break;
                }
            }
        }
        outcome
    }

    /// Discards the open block, if any.
    /// Used to recover from a sequencer that will never send the missing groups.
    pub fn abandon_open_block(&self) -> Option<AbandonedBlock> {
        let mut chain = self.chain.lock();
        let block = chain.tracker.abandon()?;
        let summary = AbandonedBlock::from(&block);
        warn!(
            "abandoned open block {} ({} groups, {} transactions)",
            summary.block_id, summary.groups, summary.transactions
        );
        Some(summary)
    }

    /// Reopens the preconfirmation epoch.
    /// Returns false if it was already open.
    pub fn reopen_epoch(&self) -> bool {
        let reopened = self.chain.lock().tracker.reopen_epoch();
        if reopened {
            info!("preconfirmation epoch reopened");
        }
        reopened
    }

    pub fn status(&self) -> TrackerStatus {
        self.chain.lock().tracker.status()
    }

    /// Get a shared reference to the soft chain.
    pub fn chain_arc(&self) -> SharedChain<E> {
        self.chain.clone()
    }

    fn admit_locked(
        &self,
        chain: &mut SoftChain<E>,
        group: TransactionGroup,
    ) -> Result<Option<Header>, AdmitError> {
        let SoftChain { tracker, engine } = chain;

        let validated = match self
            .validator
            .validate(group, tracker, engine, self.schedule.as_ref())
        {
            Ok(validated) => validated,
            Err(err) => {
                warn!("group rejected: {}", err);
                return Err(err.into());
            }
        };
        let (block_id, group_id, marker) = {
            let group = validated.group();
            (group.block_id, group.group_id, group.marker)
        };

        let was_open = tracker.is_open();
        if !was_open {
            let params = validated.group().block_params.clone();
            tracker.open(block_id, params).map_err(tracker_fault)?;
        }
        tracker.append(validated).map_err(tracker_fault)?;
        debug!("admitted group {}/{} ({:?})", block_id, group_id, marker);

        if !marker.closes_block() {
            return Ok(None);
        }

        let mut block = tracker.close().map_err(tracker_fault)?;
        match engine.build_block(block_id, block.params(), block.groups(), marker.closes_epoch()) {
            Ok(header) => {
                tracker.set_last_soft_block_height(block_id);
                if marker.closes_epoch() {
                    tracker.close_epoch();
                    info!("preconfirmation epoch closed by block {}", block_id);
                }
                info!(
                    "soft block {} built ({} groups, {} txs)",
                    block_id,
                    block.groups().len(),
                    header.transactions_count
                );
                Ok(Some(header))
            }
            Err(err) => {
                warn!("soft block {} build failed: {}", block_id, err.to_string_full());
                // Only the closing group is undone, the block was open before it.
                if was_open {
                    block.pop();
                    tracker.restore(block).map_err(tracker_fault)?;
                }
                Err(AdmitError::BuildFailed(err))
            }
        }
    }
}

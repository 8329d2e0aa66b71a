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

//! In-memory cursor over the soft chain.
//!
//! The tracker knows which block is currently accumulating groups, the next
//! group identifier it accepts, the height of the last built soft block and
//! whether the preconfirmation epoch is still open.
//!
//! It holds no lock: mutations are reserved to the admitter and the rollback
//! coordinator, which access it from within the soft chain critical section.
//! It is never authoritative, on restart it is rebuilt from the engine head.

use crate::{
    base::{schema::FIRST_GROUP_ID, BlockParams, TransactionGroup},
    crypto::Hash,
    engine::ExecutionEngine,
    error::TrackerError,
    softblocks::validator::ValidatedGroup,
    Result,
};
use std::collections::HashSet;

/// Block currently accumulating groups.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBlock {
    block_id: u64,
    /// Canonical parameters, fixed by the first group.
    params: BlockParams,
    /// Accepted groups, in execution order.
    groups: Vec<TransactionGroup>,
    /// The only group identifier acceptable next.
    next_group_id: u64,
    /// Fingerprints of every accumulated transaction.
    tx_hashes: HashSet<Hash>,
}

impl OpenBlock {
    fn new(block_id: u64, params: BlockParams) -> Self {
        OpenBlock {
            block_id,
            params,
            groups: vec![],
            next_group_id: FIRST_GROUP_ID,
            tx_hashes: HashSet::new(),
        }
    }

    pub fn block_id(&self) -> u64 {
        self.block_id
    }

    pub fn params(&self) -> &BlockParams {
        &self.params
    }

    pub fn groups(&self) -> &[TransactionGroup] {
        &self.groups
    }

    pub fn next_group_id(&self) -> u64 {
        self.next_group_id
    }

    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.tx_hashes.contains(hash)
    }

    pub fn transactions_count(&self) -> usize {
        self.groups.iter().map(|g| g.transactions.len()).sum()
    }

    pub fn into_groups(self) -> Vec<TransactionGroup> {
        self.groups
    }

    fn push(&mut self, group: ValidatedGroup) {
        let (group, hashes) = group.into_parts();
        self.tx_hashes.extend(hashes);
        self.next_group_id = group.group_id + 1;
        self.groups.push(group);
    }

    /// Drops the most recent group.
    pub(crate) fn pop(&mut self) -> Option<TransactionGroup> {
        let group = self.groups.pop()?;
        for tx in group.transactions.iter() {
            self.tx_hashes.remove(&tx.hash());
        }
        self.next_group_id = group.group_id;
        Some(group)
    }
}

/// Summary of an open block discarded without being built.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AbandonedBlock {
    pub block_id: u64,
    pub groups: usize,
    pub transactions: usize,
}

impl From<&OpenBlock> for AbandonedBlock {
    fn from(block: &OpenBlock) -> Self {
        AbandonedBlock {
            block_id: block.block_id,
            groups: block.groups.len(),
            transactions: block.transactions_count(),
        }
    }
}

/// Point in time view of the tracker.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub open_block_id: Option<u64>,
    pub expected_next_group_id: u64,
    pub accumulated_groups: usize,
    pub accumulated_transactions: usize,
    pub last_soft_block_height: u64,
    pub preconf_epoch_open: bool,
}

/// Soft chain cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftBlockTracker {
    open: Option<OpenBlock>,
    last_soft_block_height: u64,
    preconf_epoch_open: bool,
}

impl SoftBlockTracker {
    /// Tracker with no open block on top of `last_soft_block_height`.
    pub fn new(last_soft_block_height: u64) -> Self {
        SoftBlockTracker {
            open: None,
            last_soft_block_height,
            preconf_epoch_open: true,
        }
    }

    /// Tracker positioned on the engine head.
    pub fn from_engine<E: ExecutionEngine + ?Sized>(engine: &E) -> Result<Self> {
        let head = engine.head()?;
        debug!("soft blocks tracker starting from height {}", head.number);
        Ok(Self::new(head.number))
    }

    pub fn open_block(&self) -> Option<&OpenBlock> {
        self.open.as_ref()
    }

    pub fn open_block_id(&self) -> Option<u64> {
        self.open.as_ref().map(|block| block.block_id)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Next acceptable group identifier. With no open block only a block
    /// opener is acceptable.
    pub fn expected_next_group_id(&self) -> u64 {
        self.open
            .as_ref()
            .map(|block| block.next_group_id)
            .unwrap_or(FIRST_GROUP_ID)
    }

    /// Block the next group must target when no block is open.
    pub fn next_block_id(&self) -> u64 {
        self.last_soft_block_height.saturating_add(1)
    }

    pub fn accumulated_groups(&self) -> &[TransactionGroup] {
        self.open
            .as_ref()
            .map(|block| block.groups())
            .unwrap_or_default()
    }

    pub fn last_soft_block_height(&self) -> u64 {
        self.last_soft_block_height
    }

    pub fn is_preconf_epoch_open(&self) -> bool {
        self.preconf_epoch_open
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            open_block_id: self.open_block_id(),
            expected_next_group_id: self.expected_next_group_id(),
            accumulated_groups: self.accumulated_groups().len(),
            accumulated_transactions: self
                .open
                .as_ref()
                .map(OpenBlock::transactions_count)
                .unwrap_or_default(),
            last_soft_block_height: self.last_soft_block_height,
            preconf_epoch_open: self.preconf_epoch_open,
        }
    }

    /// Begins the accumulation of `block_id` with its canonical parameters.
    pub(crate) fn open(&mut self, block_id: u64, params: BlockParams) -> std::result::Result<(), TrackerError> {
        if let Some(block) = &self.open {
            return Err(TrackerError::AlreadyOpen {
                block_id: block.block_id,
            });
        }
        self.open = Some(OpenBlock::new(block_id, params));
        Ok(())
    }

    /// Appends a validated group to the open block.
    pub(crate) fn append(&mut self, group: ValidatedGroup) -> std::result::Result<(), TrackerError> {
        match self.open.as_mut() {
            Some(block) if block.block_id == group.group().block_id => {
                block.push(group);
                Ok(())
            }
            _ => Err(TrackerError::NotOpen),
        }
    }

    /// Takes the open block out, leaving nothing open.
    pub(crate) fn close(&mut self) -> std::result::Result<OpenBlock, TrackerError> {
        self.open.take().ok_or(TrackerError::NotOpen)
    }

    /// Puts back a block taken by `close`.
    pub(crate) fn restore(&mut self, block: OpenBlock) -> std::result::Result<(), TrackerError> {
        if let Some(open) = &self.open {
            return Err(TrackerError::AlreadyOpen {
                block_id: open.block_id,
            });
        }
        self.open = Some(block);
        Ok(())
    }

    /// Records a successfully built soft block.
    pub(crate) fn set_last_soft_block_height(&mut self, height: u64) {
        self.last_soft_block_height = height;
    }

    /// Discards the open block, if any.
    pub(crate) fn abandon(&mut self) -> Option<OpenBlock> {
        self.open.take()
    }

    /// Used by rollback: nothing open, soft chain ends at `to_height`.
    pub(crate) fn reset(&mut self, to_height: u64) {
        self.open = None;
        self.last_soft_block_height = to_height;
    }

    pub(crate) fn close_epoch(&mut self) {
        self.preconf_epoch_open = false;
    }

    /// Returns true if the epoch was closed.
    pub(crate) fn reopen_epoch(&mut self) -> bool {
        !std::mem::replace(&mut self.preconf_epoch_open, true)
    }
}

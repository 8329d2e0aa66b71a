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

//! Transaction group validation.
//!
//! The validator has no side effects: it compares an incoming group with a
//! snapshot of the tracker and asks the collaborators (engine and sequencer
//! schedule) for the checks it cannot perform by itself.
//!
//! Checks are performed in a fixed order, the first failure is returned:
//! 1. the preconfirmation epoch is open;
//! 2. the group targets the open block, or the next soft height if none is open;
//! 3. the block parameters match the canonical ones of the open block;
//! 4. the group identifier is the next expected one;
//! 5. no transaction is a duplicate;
//! 6. every transaction is well formed;
//! 7. the signature comes from the expected sequencer.

use crate::{
    base::TransactionGroup,
    crypto::{Hash, SequencerSchedule},
    engine::ExecutionEngine,
    error::ValidationError,
    softblocks::{service::SoftBlockConfig, tracker::SoftBlockTracker},
};
use std::collections::HashSet;

/// Group that passed every check against a tracker snapshot.
/// Only the validator creates it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGroup {
    group: TransactionGroup,
    /// Transactions fingerprints, in group order.
    hashes: Vec<Hash>,
}

impl ValidatedGroup {
    pub fn group(&self) -> &TransactionGroup {
        &self.group
    }

    pub fn into_parts(self) -> (TransactionGroup, Vec<Hash>) {
        (self.group, self.hashes)
    }
}

/// Group validation rules.
#[derive(Debug, Clone)]
pub struct GroupValidator {
    max_transactions_per_group: usize,
    max_transaction_size: usize,
}

impl GroupValidator {
    pub fn new(config: &SoftBlockConfig) -> Self {
        GroupValidator {
            max_transactions_per_group: config.max_transactions_per_group,
            max_transaction_size: config.max_transaction_size,
        }
    }

    pub fn validate<E, S>(
        &self,
        group: TransactionGroup,
        tracker: &SoftBlockTracker,
        engine: &E,
        schedule: &S,
    ) -> Result<ValidatedGroup, ValidationError>
    where
        E: ExecutionEngine + ?Sized,
        S: SequencerSchedule + ?Sized,
    {
        if !tracker.is_preconf_epoch_open() {
            return Err(ValidationError::EpochClosed);
        }
        self.check_position(&group, tracker)?;
        let hashes = self.check_duplicates(&group, tracker)?;
        self.check_transactions(&group, engine)?;
        Self::check_signature(&group, schedule)?;
        Ok(ValidatedGroup { group, hashes })
    }

    /// Block membership, parameters and ordering (checks 2 to 4).
    fn check_position(
        &self,
        group: &TransactionGroup,
        tracker: &SoftBlockTracker,
    ) -> Result<(), ValidationError> {
        match tracker.open_block() {
            Some(open) if open.block_id() != group.block_id => {
                return Err(ValidationError::BlockNotClosed {
                    open_block_id: open.block_id(),
                    got: group.block_id,
                });
            }
            Some(open) => {
                let fields = open.params().diff(&group.block_params);
                if !fields.is_empty() {
                    return Err(ValidationError::ParamsMismatch {
                        block_id: group.block_id,
                        fields,
                    });
                }
            }
            None if group.block_id != tracker.next_block_id() => {
                return Err(ValidationError::UnexpectedBlockId {
                    expected: tracker.next_block_id(),
                    got: group.block_id,
                });
            }
            // The group opens the block, its parameters become canonical.
            None => (),
        }
        let expected = tracker.expected_next_group_id();
        if group.group_id != expected {
            return Err(ValidationError::OutOfOrderGroup {
                expected,
                got: group.group_id,
            });
        }
        Ok(())
    }

    fn check_duplicates(
        &self,
        group: &TransactionGroup,
        tracker: &SoftBlockTracker,
    ) -> Result<Vec<Hash>, ValidationError> {
        let open = tracker.open_block();
        let mut seen = HashSet::with_capacity(group.transactions.len());
        let hashes = group.transactions_hashes();
        for hash in hashes.iter() {
            let known = open.map_or(false, |block| block.contains_transaction(hash));
            if known || !seen.insert(*hash) {
                return Err(ValidationError::DuplicateTransaction { hash: *hash });
            }
        }
        Ok(hashes)
    }

    /// Shape checks here, deep checks delegated to the engine.
    fn check_transactions<E>(&self, group: &TransactionGroup, engine: &E) -> Result<(), ValidationError>
    where
        E: ExecutionEngine + ?Sized,
    {
        if group.transactions.len() > self.max_transactions_per_group {
            return Err(ValidationError::InvalidTransaction {
                index: self.max_transactions_per_group,
                reason: format!(
                    "too many transactions ({} > {})",
                    group.transactions.len(),
                    self.max_transactions_per_group
                ),
            });
        }
        for (index, tx) in group.transactions.iter().enumerate() {
            let reason = if tx.as_bytes().is_empty() {
                Some("empty transaction".to_owned())
            } else if tx.as_bytes().len() > self.max_transaction_size {
                Some(format!(
                    "transaction too large ({} > {} bytes)",
                    tx.as_bytes().len(),
                    self.max_transaction_size
                ))
            } else {
                engine.check_transaction(tx).err().map(|err| err.to_string_full())
            };
            if let Some(reason) = reason {
                return Err(ValidationError::InvalidTransaction { index, reason });
            }
        }
        Ok(())
    }

    fn check_signature<S>(group: &TransactionGroup, schedule: &S) -> Result<(), ValidationError>
    where
        S: SequencerSchedule + ?Sized,
    {
        if group.signature.is_empty() {
            return Err(ValidationError::BadSignature);
        }
        match schedule.sequencer_for(group.block_id) {
            Some(sequencer) if group.verify(&sequencer) => Ok(()),
            Some(sequencer) => {
                debug!(
                    "group {}/{} not signed by {}",
                    group.block_id,
                    group.group_id,
                    sequencer.to_sequencer_id()
                );
                Err(ValidationError::BadSignature)
            }
            None => {
                debug!("no sequencer scheduled for block {}", group.block_id);
                Err(ValidationError::BadSignature)
            }
        }
    }
}

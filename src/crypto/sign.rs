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

//! Sequencer identities.
//!
//! Every transaction group is signed by the sequencer entitled to propose the
//! block it contributes to. A [SequencerSchedule] tells who that is.

pub use super::ed25519::{KeyPair, PublicKey};
use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

/// Resolves the sequencer expected to sign the groups of a given block.
#[cfg_attr(test, automock)]
pub trait SequencerSchedule: Send + Sync + 'static {
    /// Returns `None` when no sequencer is entitled for `block_id`.
    fn sequencer_for(&self, block_id: u64) -> Option<PublicKey>;
}

/// Single sequencer for every block.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedSequencer(pub PublicKey);

impl SequencerSchedule for FixedSequencer {
    fn sequencer_for(&self, _block_id: u64) -> Option<PublicKey> {
        Some(self.0.clone())
    }
}

/// Sequencers handing over at given block heights.
///
/// Each key is in charge from its starting block up to (excluded) the next
/// entry starting block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequencerRotation {
    handovers: BTreeMap<u64, PublicKey>,
}

impl SequencerRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` as the sequencer starting from `from_block`.
    pub fn handover(mut self, from_block: u64, key: PublicKey) -> Self {
        self.handovers.insert(from_block, key);
        self
    }
}

impl SequencerSchedule for SequencerRotation {
    fn sequencer_for(&self, block_id: u64) -> Option<PublicKey> {
        self.handovers
            .range(..=block_id)
            .next_back()
            .map(|(_, key)| key.clone())
    }
}

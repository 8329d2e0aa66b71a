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

//! Execution engine collaborator.
//!
//! The engine is the only component mutating the canonical chain state: it
//! applies the transactions of closed soft blocks, keeps the headers and knows
//! which blocks have already been finalized on the settlement layer.
//! The soft blocks core only drives it through this trait.

use crate::{
    base::{BlockParams, Header, RawTransaction, TransactionGroup},
    Result,
};

#[cfg(test)]
use mockall::automock;

/// Execution engine trait.
#[cfg_attr(test, automock)]
pub trait ExecutionEngine: Send + 'static {
    /// Deep well-formedness check of an encoded transaction.
    fn check_transaction(&self, tx: &RawTransaction) -> Result<()>;

    /// Applies the groups of a closed soft block, in order, on top of the
    /// current head and returns the new head header.
    fn build_block(
        &mut self,
        block_id: u64,
        params: &BlockParams,
        groups: &[TransactionGroup],
        end_of_preconf: bool,
    ) -> Result<Header>;

    /// Current head header.
    fn head(&self) -> Result<Header>;

    /// Header of the block at `height`, `None` if above the head.
    fn header_at(&self, height: u64) -> Result<Option<Header>>;

    /// Height of the last block finalized on the settlement layer.
    fn finalized_height(&self) -> Result<u64>;

    /// Removes every block above `height`, returns how many were removed.
    fn remove_blocks_above(&mut self, height: u64) -> Result<u64>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{base::schema::tests::create_test_header, Error, ErrorKind};

    /// In-memory engine keeping one header per height.
    #[derive(Default)]
    pub struct TestEngine {
        /// Header at index `i` has height `i`.
        pub headers: Vec<Header>,
        /// Last finalized height.
        pub finalized: u64,
        /// Groups received by each successful build.
        pub built: Vec<(u64, Vec<TransactionGroup>)>,
        /// Next build calls fail.
        pub fail_build: bool,
        /// Next remove calls fail.
        pub fail_remove: bool,
        /// Transaction refused by `check_transaction`.
        pub rejected_tx: Option<RawTransaction>,
    }

    impl TestEngine {
        /// Engine with blocks `0..=head`, finalized up to genesis.
        pub fn with_head(head: u64) -> Self {
            TestEngine {
                headers: (0..=head).map(create_test_header).collect(),
                ..Default::default()
            }
        }

        pub fn head_height(&self) -> u64 {
            self.headers.len() as u64 - 1
        }
    }

    impl ExecutionEngine for TestEngine {
        fn check_transaction(&self, tx: &RawTransaction) -> Result<()> {
            match &self.rejected_tx {
                Some(rejected) if rejected == tx => {
                    Err(Error::new_ext(ErrorKind::MalformedData, "rlp decoding failed"))
                }
                _ => Ok(()),
            }
        }

        fn build_block(
            &mut self,
            block_id: u64,
            params: &BlockParams,
            groups: &[TransactionGroup],
            _end_of_preconf: bool,
        ) -> Result<Header> {
            if self.fail_build {
                return Err(Error::new_ext(ErrorKind::EngineFault, "engine unreachable"));
            }
            if block_id != self.head_height() + 1 {
                return Err(Error::new_ext(ErrorKind::EngineFault, "not on top of head"));
            }
            let mut header = create_test_header(block_id);
            header.timestamp = params.timestamp;
            header.coinbase = params.coinbase;
            header.transactions_count =
                groups.iter().map(|g| g.transactions.len() as u32).sum();
            self.headers.push(header.clone());
            self.built.push((block_id, groups.to_vec()));
            Ok(header)
        }

        fn head(&self) -> Result<Header> {
            self.headers
                .last()
                .cloned()
                .ok_or_else(|| ErrorKind::ResourceNotFound.into())
        }

        fn header_at(&self, height: u64) -> Result<Option<Header>> {
            Ok(self.headers.get(height as usize).cloned())
        }

        fn finalized_height(&self) -> Result<u64> {
            Ok(self.finalized)
        }

        fn remove_blocks_above(&mut self, height: u64) -> Result<u64> {
            if self.fail_remove {
                return Err(Error::new_ext(ErrorKind::EngineFault, "engine unreachable"));
            }
            let keep = (height as usize + 1).min(self.headers.len());
            let removed = self.headers.len() - keep;
            self.headers.truncate(keep);
            Ok(removed as u64)
        }
    }

    #[test]
    fn test_engine_build_and_remove() {
        let mut engine = TestEngine::with_head(4);
        let params = crate::base::schema::tests::create_test_params();

        engine.build_block(5, &params, &[], false).unwrap();
        engine.build_block(6, &params, &[], false).unwrap();

        assert_eq!(engine.head().unwrap().number, 6);
        assert_eq!(engine.remove_blocks_above(4).unwrap(), 2);
        assert_eq!(engine.head().unwrap().number, 4);
        assert_eq!(engine.remove_blocks_above(10).unwrap(), 0);
    }
}

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

//! Soft blocks service worker.
//!
//! The worker is the single consumer of the service request queue: requests
//! are handled one at a time, in arrival order, and each one is answered
//! before the next is dequeued.

use super::{
    message::{Message, SoftBlockRequestReceiver},
    GroupValidator, RollbackCoordinator, SharedChain, SoftBlockAdmitter, SoftBlockConfig,
};
use crate::{crypto::SequencerSchedule, engine::ExecutionEngine, Error, ErrorKind};
use async_std::task;
use futures::StreamExt;
use std::sync::Arc;

/// Soft blocks worker.
pub struct SoftBlockWorker<E: ExecutionEngine, S: SequencerSchedule> {
    /// Groups admission.
    admitter: SoftBlockAdmitter<E, S>,
    /// Soft blocks truncation.
    rollback: RollbackCoordinator<E>,
    /// Requests queue.
    rx_chan: SoftBlockRequestReceiver,
}

impl<E: ExecutionEngine, S: SequencerSchedule> SoftBlockWorker<E, S> {
    pub fn new(
        config: &SoftBlockConfig,
        chain: SharedChain<E>,
        schedule: Arc<S>,
        rx_chan: SoftBlockRequestReceiver,
    ) -> Self {
        let validator = GroupValidator::new(config);
        SoftBlockWorker {
            admitter: SoftBlockAdmitter::new(chain.clone(), validator, schedule),
            rollback: RollbackCoordinator::new(chain),
            rx_chan,
        }
    }

    /// Produces the response of a single request.
    pub fn handle_message(&self, req: Message) -> Message {
        match req {
            Message::AdmitGroupRequest { group } => match self.admitter.admit(group) {
                Ok(header) => Message::AdmitGroupResponse { header },
                Err(error) => Message::AdmitRejected { error },
            },
            Message::AdmitBatchRequest { groups } => Message::AdmitBatchResponse {
                outcome: self.admitter.admit_batch(groups),
            },
            Message::RemoveAboveRequest { height } => match self.rollback.remove_above(height) {
                Ok(summary) => Message::RemoveAboveResponse { summary },
                Err(error) => Message::RollbackRejected { error },
            },
            Message::AbandonOpenBlockRequest => Message::AbandonOpenBlockResponse {
                abandoned: self.admitter.abandon_open_block(),
            },
            Message::ReopenEpochRequest => Message::ReopenEpochResponse {
                reopened: self.admitter.reopen_epoch(),
            },
            Message::GetStatusRequest => Message::GetStatusResponse {
                status: self.admitter.status(),
            },
            req => {
                debug!("unexpected soft blocks request: {:?}", req);
                Message::Exception(Error::new_ext(
                    ErrorKind::MalformedData,
                    "unexpected request",
                ))
            }
        }
    }

    /// Soft blocks worker asynchronous task.
    /// This can be stopped by submitting a `Stop` message to its input channel.
    pub async fn run(&mut self) {
        while let Some((req, res_chan)) = self.rx_chan.next().await {
            if let Message::Stop = req {
                debug!("soft blocks worker stop requested");
                break;
            }
            let res = self.handle_message(req);
            if res_chan.send(res).await.is_err() {
                warn!("soft blocks response send error");
            }
        }
    }

    /// Soft blocks worker synchronous task.
    /// This can be stopped by submitting a `Stop` message to its input channel.
    pub fn run_sync(&mut self) {
        task::block_on(self.run());
    }
}

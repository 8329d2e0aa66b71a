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

use super::{
    message::{Message, SoftBlockRequestSender},
    shared_chain,
    worker::SoftBlockWorker,
    SharedChain, SoftChain,
};
use crate::{
    base::serialize::json_deserialize,
    channel::confirmed_channel,
    crypto::SequencerSchedule,
    engine::ExecutionEngine,
    Result,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default max number of transactions within a group.
const DEFAULT_MAX_TRANSACTIONS_PER_GROUP: usize = 4096;

/// Default max size of a single encoded transaction.
const DEFAULT_MAX_TRANSACTION_SIZE: usize = 128 * 1024;

/// Soft blocks service configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SoftBlockConfig {
    /// Max number of transactions within a group.
    pub max_transactions_per_group: usize,
    /// Max size in bytes of a single encoded transaction.
    pub max_transaction_size: usize,
}

impl Default for SoftBlockConfig {
    fn default() -> Self {
        SoftBlockConfig {
            max_transactions_per_group: DEFAULT_MAX_TRANSACTIONS_PER_GROUP,
            max_transaction_size: DEFAULT_MAX_TRANSACTION_SIZE,
        }
    }
}

impl SoftBlockConfig {
    /// Loads the configuration from a JSON document, missing fields take
    /// their default value.
    pub fn from_json(buf: &[u8]) -> Result<Self> {
        json_deserialize(buf)
    }
}

/// Soft blocks service data.
pub struct SoftBlockService<E: ExecutionEngine, S: SequencerSchedule> {
    /// Worker object.
    worker: Option<SoftBlockWorker<E, S>>,
    /// Threads data.
    handler: Option<JoinHandle<SoftBlockWorker<E, S>>>,
    /// To send messages to worker.
    tx_chan: SoftBlockRequestSender,
    /// Soft chain shared reference.
    chain: SharedChain<E>,
    /// To check if the worker thread is still alive.
    canary: Arc<()>,
}

impl<E: ExecutionEngine, S: SequencerSchedule> SoftBlockService<E, S> {
    /// Create a new soft blocks service instance.
    /// The tracker is positioned on the current engine head.
    pub fn new(config: SoftBlockConfig, engine: E, schedule: S) -> Result<Self> {
        let (tx_chan, rx_chan) = confirmed_channel::<Message, Message>();

        let chain = shared_chain(SoftChain::new(engine)?);
        let worker = SoftBlockWorker::new(&config, chain.clone(), Arc::new(schedule), rx_chan);

        Ok(SoftBlockService {
            worker: Some(worker),
            handler: None,
            tx_chan,
            chain,
            canary: Arc::new(()),
        })
    }

    /// Start soft blocks service.
    pub fn start(&mut self) {
        debug!("Starting soft blocks service");
        let mut worker = match self.worker.take() {
            Some(worker) => worker,
            None => {
                warn!("service was already running");
                return;
            }
        };

        let mut canary = Arc::clone(&self.canary);
        let handle = thread::spawn(move || {
            let _ = Arc::get_mut(&mut canary);
            worker.run_sync();
            worker
        });
        self.handler = Some(handle);
    }

    /// Stop soft blocks service.
    pub fn stop(&mut self) {
        debug!("Stopping soft blocks service");
        match self.handler.take() {
            Some(handle) => {
                if let Err(err) = self.tx_chan.send_sync(Message::Stop) {
                    error!("Error stopping soft blocks service thread: {:?}", err);
                }
                match handle.join() {
                    Ok(worker) => self.worker = Some(worker),
                    Err(_) => error!("soft blocks worker thread panicked"),
                }
            }
            None => {
                debug!("service was not running");
            }
        };
    }

    /// Check if service is running.
    pub fn is_running(&self) -> bool {
        // Hack to intercept crashed subthreads.
        Arc::strong_count(&self.canary) == 2 && self.worker.is_none()
    }

    /// Get a clone of soft blocks service input channel.
    pub fn request_channel(&self) -> SoftBlockRequestSender {
        self.tx_chan.clone()
    }

    /// Get a shared reference to the soft chain.
    pub fn chain_arc(&self) -> SharedChain<E> {
        self.chain.clone()
    }
}

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

use super::worker;
use crate::softblocks::SoftBlockRequestSender;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Default max wait for a soft blocks service response.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST service configuration.
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// IP address (e.g. 127.0.0.1 for localhost)
    pub addr: String,
    /// TCP port.
    pub port: u16,
    /// Max wait for the soft blocks service response.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        RestConfig {
            addr: "127.0.0.1".to_owned(),
            port: 8000,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// REST service data.
pub struct RestService {
    /// Server configuration.
    config: RestConfig,
    /// Worker thread handler.
    handle: Option<JoinHandle<()>>,
    /// Message queue sender to send messages to soft blocks service.
    chan: SoftBlockRequestSender,
    /// To check if the worker thread is alive.
    canary: Arc<()>,
}

impl RestService {
    pub fn new(config: RestConfig, chan: SoftBlockRequestSender) -> Self {
        RestService {
            config,
            handle: None,
            chan,
            canary: Arc::new(()),
        }
    }

    /// Start the service.
    pub fn start(&mut self) {
        debug!("Starting REST service");
        if self.is_running() {
            warn!("service was already running");
            return;
        }
        let chan = self.chan.clone();
        let config = self.config.clone();
        let mut canary = Arc::clone(&self.canary);
        let handle = thread::spawn(move || {
            let _ = Arc::get_mut(&mut canary);
            worker::run(config, chan);
        });
        self.handle = Some(handle);
    }

    /// Stop the service.
    /// The listener thread is detached, it ends with the process.
    pub fn stop(&mut self) {
        debug!("Stopping REST service");
        match self.handle.take() {
            Some(_handle) => (),
            None => debug!("service was not running"),
        };
    }

    /// Check if service is running.
    pub fn is_running(&self) -> bool {
        // Hack to intercept crashed subthreads.
        Arc::strong_count(&self.canary) == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    fn create_rest_service() -> RestService {
        let config = RestConfig {
            addr: "localhost".to_owned(),
            port: 8100,
            ..Default::default()
        };

        let (tx_chan, _rx_chan) = channel::confirmed_channel();
        RestService::new(config, tx_chan)
    }

    #[test]
    fn start_stop() {
        let mut svc = create_rest_service();

        svc.start();
        assert!(svc.is_running());

        svc.stop();
    }

    #[test]
    fn default_config() {
        let config = RestConfig::default();

        assert_eq!(config.port, 8000);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}

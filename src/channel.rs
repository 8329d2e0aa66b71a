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

//! Request/response channel on top of async-std channels.
//!
//! A [RequestSender] pushes a request together with a one-shot style
//! [Sender] that the single [RequestReceiver] consumer uses to answer.
//! The soft blocks worker is that consumer: requests are answered strictly in
//! arrival order, one at a time.

use async_std::{
    channel::{self as async_channel, Receiver as AsyncReceiver, Sender as AsyncSender},
    future, task,
};
use std::{fmt::Display, pin::Pin, time::Duration};

/// Upper bound to outstanding channel elements.
const CHANNEL_BOUND: usize = 1000;

/// Errors which can be triggered by a channel.
#[derive(Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// Error during send. Broken channel.
    SendError,
    /// Error during receive. Broken channel.
    RecvError,
    /// Timeout during receive.
    RecvTimeout,
}

impl std::error::Error for ChannelError {}

impl Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ChannelError::SendError => "channel send error",
            ChannelError::RecvError => "channel recv error",
            ChannelError::RecvTimeout => "channel recv timeout",
        };
        write!(f, "{}", msg)
    }
}

/// Creates a simple bounded channel.
pub fn simple_channel<T>() -> (Sender<T>, Receiver<T>) {
    let (sender, receiver) = async_channel::bounded::<T>(CHANNEL_BOUND);
    (Sender(sender), Receiver(receiver))
}

/// Channel sender side.
#[derive(Clone)]
pub struct Sender<T>(AsyncSender<T>);

impl<T> Sender<T> {
    pub async fn send(&self, value: T) -> Result<(), ChannelError> {
        self.0.send(value).await.map_err(|_| ChannelError::SendError)
    }

    /// Synchronous wrapper of `send`.
    pub fn send_sync(&self, value: T) -> Result<(), ChannelError> {
        task::block_on(self.send(value))
    }

    /// Returns true if the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Channel receiver side.
#[derive(Clone)]
pub struct Receiver<T>(AsyncReceiver<T>);

impl<T> Receiver<T> {
    pub async fn recv(&self) -> Result<T, ChannelError> {
        self.0.recv().await.map_err(|_| ChannelError::RecvError)
    }

    /// Gives up after `timeout`.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<T, ChannelError> {
        match future::timeout(timeout, self.0.recv()).await {
            Ok(res) => res.map_err(|_| ChannelError::RecvError),
            Err(_) => Err(ChannelError::RecvTimeout),
        }
    }

    /// Synchronous wrapper of `recv`.
    pub fn recv_sync(&self) -> Result<T, ChannelError> {
        task::block_on(self.recv())
    }

    /// Synchronous wrapper of `recv_timeout`.
    pub fn recv_timeout_sync(&self, timeout: Duration) -> Result<T, ChannelError> {
        task::block_on(self.recv_timeout(timeout))
    }
}

/// Create a [RequestSender] and a [RequestReceiver] with a channel between them.
///
/// The [RequestSender] can be cloned to submit requests from multiple
/// threads to the same consumer.
pub fn confirmed_channel<Req, Res>() -> (RequestSender<Req, Res>, RequestReceiver<Req, Res>) {
    let (request_sender, request_receiver) =
        async_channel::bounded::<(Req, Sender<Res>)>(CHANNEL_BOUND);
    (
        RequestSender(request_sender),
        RequestReceiver(request_receiver),
    )
}

/// Producer side of a confirmed channel.
#[derive(Clone)]
pub struct RequestSender<Req, Res>(AsyncSender<(Req, Sender<Res>)>);

impl<Req, Res> RequestSender<Req, Res> {
    /// Enqueues a request, the returned receiver yields the response.
    pub async fn send(&self, request: Req) -> Result<Receiver<Res>, ChannelError> {
        let (response_sender, response_receiver) = simple_channel();
        self.0
            .send((request, response_sender))
            .await
            .map_err(|_| ChannelError::SendError)
            .map(|_| response_receiver)
    }

    /// Synchronous wrapper of `send`.
    pub fn send_sync(&self, request: Req) -> Result<Receiver<Res>, ChannelError> {
        task::block_on(self.send(request))
    }

    /// Returns true if the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Consumer side of a confirmed channel.
pub struct RequestReceiver<Req, Res>(AsyncReceiver<(Req, Sender<Res>)>);

impl<Req, Res> RequestReceiver<Req, Res> {
    /// Waits for the next request and its response sender.
    pub async fn recv(&self) -> Result<(Req, Sender<Res>), ChannelError> {
        self.0.recv().await.map_err(|_| ChannelError::RecvError)
    }

    /// Synchronous wrapper of `recv`.
    pub fn recv_sync(&self) -> Result<(Req, Sender<Res>), ChannelError> {
        task::block_on(self.recv())
    }
}

/// Type alias for the response sender handed to the consumer.
pub type ResponseSender<Res> = Sender<Res>;

/// Type alias for the response receiver returned to the producer.
pub type ResponseReceiver<Res> = Receiver<Res>;

impl<Req, Res> futures::Stream for RequestReceiver<Req, Res> {
    type Item = (Req, ResponseSender<Res>);

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        futures::Stream::poll_next(Pin::new(&mut self.0), cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT_DURATION: Duration = Duration::from_millis(200);

    #[test]
    fn send_recv() {
        let (tx_chan, rx_chan) = simple_channel::<u32>();

        tx_chan.send_sync(3).unwrap();
        let val = rx_chan.recv_sync().unwrap();

        assert_eq!(val, 3);
    }

    #[test]
    fn send_closed_receiver() {
        let (tx_chan, _) = simple_channel::<()>();

        let err = tx_chan.send_sync(()).unwrap_err();

        assert_eq!(err, ChannelError::SendError);
    }

    #[test]
    fn recv_closed_sender() {
        let (_, rx_chan) = simple_channel::<()>();

        let err = rx_chan.recv_sync().unwrap_err();

        assert_eq!(err, ChannelError::RecvError);
    }

    #[test]
    fn recv_with_timeout() {
        let (_tx_chan, rx_chan) = simple_channel::<()>();

        let err = rx_chan.recv_timeout_sync(TIMEOUT_DURATION).unwrap_err();

        assert_eq!(err, ChannelError::RecvTimeout);
    }

    #[test]
    fn send_confirmed_request() {
        let (req_tx_chan, req_rx_chan) = confirmed_channel::<u32, u8>();

        let res_rx_chan = req_tx_chan.send_sync(3).unwrap();
        let (req, res_tx_chan) = req_rx_chan.recv_sync().unwrap();

        res_tx_chan.send_sync(9).unwrap();
        let res = res_rx_chan.recv_sync().unwrap();

        assert_eq!(req, 3);
        assert_eq!(res, 9);
    }

    #[test]
    fn requests_are_received_in_order() {
        let (req_tx_chan, req_rx_chan) = confirmed_channel::<u32, u8>();

        for i in 0..5 {
            req_tx_chan.send_sync(i).unwrap();
        }

        for i in 0..5 {
            let (req, _) = req_rx_chan.recv_sync().unwrap();
            assert_eq!(req, i);
        }
    }

    #[test]
    fn send_confirmed_request_dropped_responder() {
        let (req_tx_chan, req_rx_chan) = confirmed_channel::<u32, u8>();

        let res_rx_chan = req_tx_chan.send_sync(3).unwrap();
        let (req, _) = req_rx_chan.recv_sync().unwrap();

        let err = res_rx_chan.recv_sync().unwrap_err();

        assert_eq!(req, 3);
        assert_eq!(err, ChannelError::RecvError);
    }
}

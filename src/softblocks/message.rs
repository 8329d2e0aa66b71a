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

//! Messages used to interact with the soft blocks service.

use super::{AbandonedBlock, BatchOutcome, TrackerStatus};
use crate::{
    base::{Header, RemovedSummary, TransactionGroup},
    channel,
    error::{AdmitError, RollbackError},
    Error,
};

/// Message types enumeration.
///
/// Enum variants are internally tagged with their numeric identifier.
/// Variants carrying a domain error wrap it in a field: the error enums have
/// their own tag.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum Message {
    /// Exception response used for the full set of messages.
    #[serde(rename = "0")]
    Exception(Error),
    /// Admit a single transaction group.
    #[serde(rename = "1")]
    AdmitGroupRequest { group: TransactionGroup },
    /// Group admitted.
    #[serde(rename = "2")]
    AdmitGroupResponse {
        /// Header of the block closed by the group, if any.
        header: Option<Header>,
    },
    /// Admit a list of groups in order.
    #[serde(rename = "3")]
    AdmitBatchRequest { groups: Vec<TransactionGroup> },
    /// Batch processed, possibly partially.
    #[serde(rename = "4")]
    AdmitBatchResponse { outcome: BatchOutcome },
    /// Group rejected or block construction failure.
    #[serde(rename = "5")]
    AdmitRejected { error: AdmitError },
    /// Remove the soft blocks above a given height.
    #[serde(rename = "6")]
    RemoveAboveRequest { height: u64 },
    /// Soft blocks removed.
    #[serde(rename = "7")]
    RemoveAboveResponse { summary: RemovedSummary },
    /// Removal refused or failed.
    #[serde(rename = "8")]
    RollbackRejected { error: RollbackError },
    /// Discard the open block.
    #[serde(rename = "9")]
    AbandonOpenBlockRequest,
    /// Open block discarded, `None` if no block was open.
    #[serde(rename = "10")]
    AbandonOpenBlockResponse { abandoned: Option<AbandonedBlock> },
    /// Reopen the preconfirmation epoch.
    #[serde(rename = "11")]
    ReopenEpochRequest,
    /// Epoch open, `reopened` is false if it was already open.
    #[serde(rename = "12")]
    ReopenEpochResponse { reopened: bool },
    /// Get the tracker status.
    #[serde(rename = "13")]
    GetStatusRequest,
    /// Tracker status.
    #[serde(rename = "14")]
    GetStatusResponse { status: TrackerStatus },
    /// Stop soft blocks service.
    #[serde(rename = "254")]
    Stop,
}

/// Soft blocks request sender alias.
pub type SoftBlockRequestSender = channel::RequestSender<Message, Message>;

/// Soft blocks request receiver alias.
pub type SoftBlockRequestReceiver = channel::RequestReceiver<Message, Message>;

/// Soft blocks response sender alias.
pub type SoftBlockResponseSender = channel::Sender<Message>;

/// Soft blocks response receiver alias.
pub type SoftBlockResponseReceiver = channel::Receiver<Message>;

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

use crate::{
    base::serialize::{hex_array, hex_bytes, rmp_serialize},
    crypto::{Hash, KeyPair, PublicKey},
    Result,
};

/// 32 bytes opaque value (roots, randomness, block hashes).
pub type Bytes32 = [u8; 32];

/// 20 bytes account address.
pub type Address = [u8; 20];

/// First group identifier of every block.
pub const FIRST_GROUP_ID: u64 = 1;

/// Tells whether a group closes its block, its preconfirmation epoch or neither.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum GroupMarker {
    /// More groups follow for the same block.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Last group of the block.
    #[serde(rename = "endOfBlock", alias = "finalBlockGroup")]
    EndOfBlock,
    /// Last group of the block and of the preconfirmation epoch.
    #[serde(rename = "endOfPreconf", alias = "finalPreconfGroup")]
    EndOfPreconf,
}

impl GroupMarker {
    /// The group triggers the block construction.
    pub fn closes_block(&self) -> bool {
        matches!(self, GroupMarker::EndOfBlock | GroupMarker::EndOfPreconf)
    }

    /// The group terminates the preconfirmation epoch.
    pub fn closes_epoch(&self) -> bool {
        matches!(self, GroupMarker::EndOfPreconf)
    }
}

/// Block level parameters, shared by every group of the same block.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockParams {
    /// Block timestamp (seconds).
    pub timestamp: u64,
    /// Randomness value.
    #[serde(with = "hex_array")]
    pub prev_randao: Bytes32,
    /// Suggested fee recipient.
    #[serde(with = "hex_array")]
    pub suggested_fee_recipient: Address,
    /// Base fee per gas.
    pub base_fee_per_gas: u64,
    /// Settlement layer block the soft block is anchored to.
    pub anchor_block_id: u64,
    /// State root of the anchor block.
    #[serde(with = "hex_array")]
    pub anchor_state_root: Bytes32,
    /// Block coinbase.
    #[serde(with = "hex_array")]
    pub coinbase: Address,
}

impl BlockParams {
    /// Names of the fields whose value differs from `other`.
    pub fn diff(&self, other: &BlockParams) -> Vec<String> {
        let mut fields = vec![];
        let mut check = |differs: bool, name: &str| {
            if differs {
                fields.push(name.to_owned());
            }
        };
        check(self.timestamp != other.timestamp, "timestamp");
        check(self.prev_randao != other.prev_randao, "prevRandao");
        check(
            self.suggested_fee_recipient != other.suggested_fee_recipient,
            "suggestedFeeRecipient",
        );
        check(
            self.base_fee_per_gas != other.base_fee_per_gas,
            "baseFeePerGas",
        );
        check(self.anchor_block_id != other.anchor_block_id, "anchorBlockId");
        check(
            self.anchor_state_root != other.anchor_state_root,
            "anchorStateRoot",
        );
        check(self.coinbase != other.coinbase, "coinbase");
        fields
    }
}

/// Opaque encoded transaction. Order within a group is execution order.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct RawTransaction(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl RawTransaction {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Fingerprint used for duplicates detection.
    pub fn hash(&self) -> Hash {
        Hash::from_data(&self.0)
    }
}

impl From<Vec<u8>> for RawTransaction {
    fn from(buf: Vec<u8>) -> Self {
        RawTransaction(buf)
    }
}

impl AsRef<[u8]> for RawTransaction {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Batch of transactions submitted by the sequencer for a soft block.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionGroup {
    /// Soft block this group contributes to.
    pub block_id: u64,
    /// Position of the group within the block, starting from `FIRST_GROUP_ID`.
    pub group_id: u64,
    /// Transactions, in execution order.
    pub transactions: Vec<RawTransaction>,
    /// Terminal marker.
    #[serde(default, rename = "groupStatus")]
    pub marker: GroupMarker,
    /// Block parameters, identical for all the groups of a block.
    pub block_params: BlockParams,
    /// Sequencer signature of the group payload.
    #[serde(default, with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// Signed part of a group.
#[derive(Serialize)]
struct UnsignedGroup<'a> {
    block_id: u64,
    group_id: u64,
    transactions: &'a [RawTransaction],
    marker: GroupMarker,
    block_params: &'a BlockParams,
}

impl TransactionGroup {
    /// Builds an unsigned group.
    pub fn new(
        block_id: u64,
        group_id: u64,
        transactions: Vec<RawTransaction>,
        marker: GroupMarker,
        block_params: BlockParams,
    ) -> Self {
        TransactionGroup {
            block_id,
            group_id,
            transactions,
            marker,
            block_params,
            signature: vec![],
        }
    }

    /// Bytes covered by the sequencer signature (MessagePack encoded).
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        rmp_serialize(&UnsignedGroup {
            block_id: self.block_id,
            group_id: self.group_id,
            transactions: &self.transactions,
            marker: self.marker,
            block_params: &self.block_params,
        })
    }

    /// Signs the group payload, replacing any previous signature.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let payload = self.signing_payload()?;
        self.signature = keypair.sign(&payload)?;
        Ok(())
    }

    /// Checks the signature against the given sequencer key.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        match self.signing_payload() {
            Ok(payload) => public_key.verify(&payload, &self.signature),
            Err(_) => false,
        }
    }

    /// Transactions fingerprints, in group order.
    pub fn transactions_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(RawTransaction::hash).collect()
    }
}

/// Header of a block built by the execution engine.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Block height.
    pub number: u64,
    #[serde(with = "hex_array")]
    pub hash: Bytes32,
    #[serde(with = "hex_array")]
    pub parent_hash: Bytes32,
    #[serde(with = "hex_array")]
    pub state_root: Bytes32,
    pub timestamp: u64,
    pub base_fee_per_gas: u64,
    #[serde(with = "hex_array")]
    pub coinbase: Address,
    /// Number of transactions in the block.
    pub transactions_count: u32,
}

/// Outcome of a soft blocks truncation.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RemovedSummary {
    /// Engine head after the truncation.
    pub current_head: Header,
    /// Number of removed blocks.
    pub head_removed: u64,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{
        base::serialize::{json_deserialize, json_serialize, rmp_deserialize},
        crypto::{
            ed25519::tests::ed25519_other_keypair, sign::tests::create_test_keypair,
        },
    };

    pub fn create_test_params() -> BlockParams {
        BlockParams {
            timestamp: 1_700_000_000,
            prev_randao: [0x11; 32],
            suggested_fee_recipient: [0x22; 20],
            base_fee_per_gas: 1_000_000_000,
            anchor_block_id: 42,
            anchor_state_root: [0x33; 32],
            coinbase: [0x44; 20],
        }
    }

    /// Transaction bytes unique for the given block, group and position.
    pub fn create_test_tx(block_id: u64, group_id: u64, index: u8) -> RawTransaction {
        let mut buf = vec![0x02, index];
        buf.extend_from_slice(&block_id.to_be_bytes());
        buf.extend_from_slice(&group_id.to_be_bytes());
        RawTransaction(buf)
    }

    /// Signed group with two transactions.
    pub fn create_test_group(block_id: u64, group_id: u64, marker: GroupMarker) -> TransactionGroup {
        let txs = vec![
            create_test_tx(block_id, group_id, 0),
            create_test_tx(block_id, group_id, 1),
        ];
        create_test_group_with(block_id, group_id, marker, txs, create_test_params())
    }

    pub fn create_test_group_with(
        block_id: u64,
        group_id: u64,
        marker: GroupMarker,
        transactions: Vec<RawTransaction>,
        params: BlockParams,
    ) -> TransactionGroup {
        let mut group = TransactionGroup::new(block_id, group_id, transactions, marker, params);
        group.sign(&create_test_keypair()).unwrap();
        group
    }

    pub fn create_test_header(number: u64) -> Header {
        Header {
            number,
            hash: [number as u8; 32],
            parent_hash: [number.wrapping_sub(1) as u8; 32],
            state_root: [0xaa; 32],
            timestamp: 1_700_000_000 + number,
            base_fee_per_gas: 1_000_000_000,
            coinbase: [0x44; 20],
            transactions_count: 0,
        }
    }

    #[test]
    fn marker_closing_semantics() {
        assert!(!GroupMarker::None.closes_block());
        assert!(GroupMarker::EndOfBlock.closes_block());
        assert!(!GroupMarker::EndOfBlock.closes_epoch());
        assert!(GroupMarker::EndOfPreconf.closes_block());
        assert!(GroupMarker::EndOfPreconf.closes_epoch());
    }

    #[test]
    fn params_diff_reports_every_field() {
        let params = create_test_params();
        let mut other = params.clone();
        other.timestamp += 1;
        other.coinbase = [0; 20];

        assert!(params.diff(&params).is_empty());
        assert_eq!(params.diff(&other), vec!["timestamp", "coinbase"]);
    }

    #[test]
    fn group_sign_verify() {
        let group = create_test_group(5, 1, GroupMarker::None);

        assert!(group.verify(&create_test_keypair().public_key()));
        assert!(!group.verify(&ed25519_other_keypair().public_key()));
    }

    #[test]
    fn group_tampering_breaks_signature() {
        let mut group = create_test_group(5, 1, GroupMarker::None);
        group.marker = GroupMarker::EndOfBlock;

        assert!(!group.verify(&create_test_keypair().public_key()));
    }

    #[test]
    fn unsigned_group_never_verifies() {
        let group = TransactionGroup::new(5, 1, vec![], GroupMarker::None, create_test_params());

        assert!(!group.verify(&create_test_keypair().public_key()));
    }

    #[test]
    fn group_json_wire_format() {
        let json = r#"{
            "blockId": 5,
            "groupId": 2,
            "transactions": ["0x02f8", "0x02aa"],
            "groupStatus": "finalBlockGroup",
            "blockParams": {
                "timestamp": 1700000000,
                "prevRandao": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "suggestedFeeRecipient": "0x2222222222222222222222222222222222222222",
                "baseFeePerGas": 1000000000,
                "anchorBlockId": 42,
                "anchorStateRoot": "0x3333333333333333333333333333333333333333333333333333333333333333",
                "coinbase": "0x4444444444444444444444444444444444444444"
            },
            "signature": "0xabcd"
        }"#;

        let group: TransactionGroup = json_deserialize(json.as_bytes()).unwrap();

        assert_eq!(group.block_id, 5);
        assert_eq!(group.group_id, 2);
        assert_eq!(
            group.transactions,
            vec![RawTransaction(vec![0x02, 0xf8]), RawTransaction(vec![0x02, 0xaa])]
        );
        assert_eq!(group.marker, GroupMarker::EndOfBlock);
        assert_eq!(group.block_params, create_test_params());
        assert_eq!(group.signature, vec![0xab, 0xcd]);
    }

    #[test]
    fn group_json_marker_defaults_to_none() {
        let mut value = serde_json::to_value(create_test_group(5, 1, GroupMarker::EndOfBlock))
            .unwrap();
        value.as_object_mut().unwrap().remove("groupStatus");

        let group: TransactionGroup = serde_json::from_value(value).unwrap();

        assert_eq!(group.marker, GroupMarker::None);
    }

    #[test]
    fn group_rmp_carries_raw_bytes() {
        let group = create_test_group(5, 1, GroupMarker::EndOfPreconf);

        let buf = crate::base::serialize::rmp_serialize(&group).unwrap();
        let json = json_serialize(&group).unwrap();

        assert!(buf.len() < json.len());
        assert_eq!(rmp_deserialize::<TransactionGroup>(&buf).unwrap(), group);
    }
}

//! Proposal snapshots
//!
//! A [`MultisigTransaction`] is what the coordinator observed on the
//! contract at a point in time. It is never used as the basis for a
//! state-changing decision; those always re-read the contract.

use super::contract::ProposalRecord;
use crate::core::{to_display_units, transaction::hex_bytes, Address, Wei};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a proposal
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum ProposalState {
    /// Submitted, no confirmations recorded
    Proposed,
    /// Some confirmations, below the threshold
    PartiallyConfirmed,
    /// Enough confirmations to execute
    QuorumReached,
    Executed,
}

impl ProposalState {
    pub fn derive(confirmations: u64, threshold: u64, executed: bool) -> Self {
        if executed {
            ProposalState::Executed
        } else if confirmations >= threshold {
            ProposalState::QuorumReached
        } else if confirmations > 0 {
            ProposalState::PartiallyConfirmed
        } else {
            ProposalState::Proposed
        }
    }
}

/// Observed state of one proposal
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MultisigTransaction {
    pub index: u64,
    pub to: Address,
    /// Base units
    pub value: Wei,
    /// Display units, e.g. "1.5"
    pub value_display: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub executed: bool,
    pub confirmations: u64,
    pub threshold: u64,
    /// Owners observed as having confirmed
    pub confirmed_by: Vec<Address>,
    pub state: ProposalState,
    pub observed_at: DateTime<Utc>,
}

impl MultisigTransaction {
    /// Build a snapshot from what the contract returned
    pub fn observe(
        index: u64,
        record: ProposalRecord,
        threshold: u64,
        confirmed_by: Vec<Address>,
    ) -> Self {
        let state = ProposalState::derive(record.confirmations, threshold, record.executed);
        Self {
            index,
            to: record.to,
            value_display: to_display_units(&record.value),
            value: record.value,
            data: record.data,
            executed: record.executed,
            confirmations: record.confirmations,
            threshold,
            confirmed_by,
            state,
            observed_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.executed
    }

    pub fn can_execute(&self) -> bool {
        self.state == ProposalState::QuorumReached
    }

    pub fn missing_confirmations(&self) -> u64 {
        self.threshold.saturating_sub(self.confirmations)
    }
}

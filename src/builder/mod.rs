//! Transaction building
//!
//! This module provides:
//! - Per-sender sequence number allocation
//! - The populate, sign and broadcast pipeline

pub mod pipeline;
pub mod sequencer;

pub use pipeline::{BroadcastReceipt, BuilderConfig, SendError, TransactionBuilder, TransferDraft};
pub use sequencer::{KeyedGuard, KeyedMutex, SenderGuard, SenderSlot, Sequencer, Vacant};

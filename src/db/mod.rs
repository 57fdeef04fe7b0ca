// SPDX-License-Identifier: MIT

//! State storage layer.
//!
//! Persistence is an external concern in this system; the engine only
//! requires the atomicity guarantees `MemoryDb` provides. Swapping in a
//! durable backend means re-implementing this module's surface against a
//! store with equivalent compare-and-swap semantics.

pub mod memory;

pub use memory::{MemoryDb, ParticipantKey, SlotKey};

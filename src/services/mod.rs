//! Transactional wrappers around the state machine
//!
//! Each mutating call opens one transaction, loads a snapshot under row
//! locks, asks `machine` for the effects, applies them and commits. Sink
//! notices go out after commit.

pub mod booking_service;
pub mod effects;
pub mod proposal_service;
pub mod snapshot;
pub mod swap_service;
pub mod sweep_service;
pub mod targeting_service;

//! Networked match loop: phase timers, team scoring and outcome evaluation for
//! small multiplayer rooms, exposed for hosts and the demo binary.

/// File configuration with defaults and validation.
pub mod config;
/// Room platform abstraction and the in-process room.
pub mod dao;
/// Serialisable payloads: notifications and score snapshots.
pub mod dto;
/// Error types shared across the crate.
pub mod error;
/// Match services: driver, scoring, lobby, team assignment and displays.
pub mod services;
/// Match state: phase machine, ledger, timers and transitions.
pub mod state;

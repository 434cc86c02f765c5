//! Real-time planning poker session engine.
//!
//! Clients coordinate exclusively through a shared store ([`store::SharedStore`])
//! that offers linearizable single-row writes and an at-least-once, unordered
//! change feed per room. Each client reconciles that feed into a local
//! projection ([`session::reconcile::RoomProjection`]) and derives everything
//! it shows from it ([`session::view`]); [`services`] holds the join protocol
//! and every state transition a session can perform.

pub mod config;
pub mod dto;
pub mod error;
pub mod services;
pub mod session;
pub mod store;

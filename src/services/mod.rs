//! Business logic layered on top of the session state and the shared store.

pub mod join_service;
pub mod session_service;

//! Core engine: the per-account poll → classify → bet loop.

pub mod bankroll;
pub mod cancellation;
pub mod reporter;
pub mod session;
pub mod status;
pub mod supervisor;

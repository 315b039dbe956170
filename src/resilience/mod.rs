//! Resilience primitives for the store client: per-command retry with
//! exponential backoff.

pub mod retry;

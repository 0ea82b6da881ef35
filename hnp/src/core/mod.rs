//! Deterministic, pure round logic.
//!
//! Core modules must be free of I/O side effects. They take the current
//! documents and a timestamp and return the next documents, so a rejected
//! transition can never leave partial state behind.

pub mod error;
pub mod round;
pub mod timing;

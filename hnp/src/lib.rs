//! Hack-n-Patch: a two-player attack/defend game around a shared service.
//!
//! One player starts a timer, attacks the running service and submits the
//! captured flag. The time it took is added to the opponent's budget for their
//! next patch phase, in which they fix the service, merge and push before the
//! budget runs out.
//!
//! - **[`core`]**: Pure round logic (phase transitions, timing, budget).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (state documents, docker, git,
//!   terminal prompts, clock). Behind traits where tests need fakes.
//!
//! Orchestration modules ([`setup`], [`hack`], [`patch`], [`service`])
//! combine the two to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod hack;
pub mod io;
pub mod logging;
pub mod model;
pub mod patch;
pub mod service;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;

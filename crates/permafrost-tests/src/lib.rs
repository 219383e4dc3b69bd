//! Permafrost integration scenarios.
//!
//! End-to-end flows over real temporary roots, the local backend, the
//! sqlite ledger, and the live task runner: the pieces a unit test mocks
//! away are exactly the ones exercised here.

pub mod harness;

#[cfg(test)]
mod coordination_scenarios;
#[cfg(test)]
mod freeze_scenarios;
#[cfg(test)]
mod pull_scenarios;

//! Budgets and timing constants used by the state machine.
//!
//! None of these values are contracts; every field is tunable from the
//! `[policy]` section of the configuration file.  [`GamePolicy::default`]
//! returns the values shipped in the sample configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePolicy {
    /// Consecutive TRANSPORT_LOST reports that push RUNNING into ERROR.
    pub transport_failure_budget: u32,
    /// How long the transport may stay lost before RUNNING becomes ERROR,
    /// even if fewer than `transport_failure_budget` losses were reported.
    pub transport_grace_ms: u64,
    /// MALFORMED_INPUT events tolerated per round.  Reaching the budget
    /// pushes RUNNING into ERROR.
    pub malformed_budget: u32,
    /// Delay between the final observation of a round and its publication.
    /// A corrected observation inside this window replaces the pending one.
    pub result_confirm_ms: u64,
    /// Time allowed in ERROR before the machine gives up and stops.
    /// `0` disables the escalation.
    pub max_error_secs: u64,
}

impl Default for GamePolicy {
    fn default() -> Self {
        Self {
            transport_failure_budget: 5,
            transport_grace_ms: 15_000,
            malformed_budget: 3,
            result_confirm_ms: 500,
            max_error_secs: 300,
        }
    }
}

impl GamePolicy {
    pub fn transport_grace_us(&self) -> u64 {
        self.transport_grace_ms.saturating_mul(1_000)
    }

    pub fn max_error_us(&self) -> u64 {
        self.max_error_secs.saturating_mul(1_000_000)
    }
}

//! Step state domain types

use serde::{Deserialize, Serialize};

/// Terminal state of a step container
///
/// Produced once per step from the container inspection taken after the
/// container stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub exited: bool,
    pub exit_code: i64,
    pub oom_killed: bool,
}

impl State {
    /// True when the step exited cleanly
    pub fn is_success(&self) -> bool {
        self.exited && self.exit_code == 0 && !self.oom_killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let ok = State {
            exited: true,
            exit_code: 0,
            oom_killed: false,
        };
        assert!(ok.is_success());

        let failed = State { exit_code: 2, ..ok };
        assert!(!failed.is_success());

        let oom = State {
            oom_killed: true,
            exit_code: 137,
            ..ok
        };
        assert!(!oom.is_success());
    }
}

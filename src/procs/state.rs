// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

/// Lifecycle of one supervised process handle
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Stopped
///            ^   |       |                     ^
///            |   v       v                     |
///            +-- Crashed ----------------------+
/// ```
///
/// `Stopped` is terminal, a new supervisor is needed to run the binary again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    /// The process exited, or failed to launch, while it should have been running
    Crashed,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Idle, Stopped)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Stopped)
                | (Running, Crashed)
                | (Running, Stopping)
                | (Crashed, Starting)
                | (Crashed, Stopped)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Stopped
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Crashed => "crashed",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };

        f.write_str(s)
    }
}

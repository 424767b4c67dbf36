// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod backoff;
mod component;
mod scheduler;
mod state;
mod supervisor;

pub use backoff::{BackoffPolicy, RestartBackoff};
pub use component::{BinaryComponent, ComponentSpec, NodeContext};
pub use scheduler::Scheduler;
pub use state::LifecycleState;
pub use supervisor::{Supervisor, SupervisorConfig};

use async_trait::async_trait;

use crate::Error;

/// Group owning every staged binary, and the one the binaries run as
pub const SERVICE_GROUP: &str = "cpvisor";

/// A control plane binary as seen by the orchestrator
///
/// `init` is called once before `run`, `run` at most once. `stop` may be called any number of
///   times, including when `run` was never called or failed.
#[async_trait]
pub trait Component: Send {
    fn name(&self) -> &str;

    /// Resolve the service identity and stage the binary
    async fn init(&mut self) -> Result<(), Error>;

    /// Launch the binary under supervision, returns once it is running
    async fn run(&mut self) -> Result<(), Error>;

    async fn stop(&mut self) -> Result<(), Error>;
}

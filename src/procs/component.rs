// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::args::{build_args, Flags};
use crate::fork::ProcessSpec;
use crate::identity::{IdentityResolver, RunAs};
use crate::procs::{Component, Supervisor, SupervisorConfig};
use crate::stage::BinaryStager;
use crate::Error;

/// Static description of a control plane binary
#[derive(Clone, Debug)]
pub struct ComponentSpec {
    pub name: String,
    /// File name of the binary, staged under `<data_dir>/bin`
    pub binary: String,
    /// Service account the binary runs as
    pub user: String,
    pub group: String,
    /// Flags the component depends on, users may not override these
    pub mandatory_args: Flags,
    /// Flags supplied through configuration
    pub extra_args: Flags,
}

/// Inputs shared by all components on a node, owned by the composition root
#[derive(Clone)]
pub struct NodeContext {
    pub data_dir: PathBuf,
    pub identity: Arc<dyn IdentityResolver>,
    pub stager: Arc<dyn BinaryStager>,
    pub supervisor: SupervisorConfig,
}

struct Staged {
    run_as: RunAs,
    bin_path: PathBuf,
}

/// Runs one staged binary under a [`Supervisor`]
pub struct BinaryComponent {
    spec: ComponentSpec,
    context: NodeContext,
    staged: Option<Staged>,
    supervisor: Option<Supervisor>,
}

impl BinaryComponent {
    pub fn new(spec: ComponentSpec, context: NodeContext) -> Self {
        Self {
            spec,
            context,
            staged: None,
            supervisor: None,
        }
    }

    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    /// Present once `run` has been called
    pub fn supervisor(&self) -> Option<&Supervisor> {
        self.supervisor.as_ref()
    }

    /// The final argument vector, fails if an extra arg overrides a mandatory one
    pub fn args(&self) -> Result<Vec<String>, Error> {
        build_args(
            &self.spec.name,
            &self.spec.mandatory_args,
            &self.spec.extra_args,
        )
    }
}

#[async_trait]
impl Component for BinaryComponent {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn init(&mut self) -> Result<(), Error> {
        let run_as = RunAs::resolve(
            self.context.identity.as_ref(),
            &self.spec.user,
            &self.spec.group,
        );

        let bin_path =
            self.context
                .stager
                .stage(&self.context.data_dir, &self.spec.binary, run_as.gid)?;

        self.staged = Some(Staged { run_as, bin_path });
        Ok(())
    }

    async fn run(&mut self) -> Result<(), Error> {
        if let Some(supervisor) = &self.supervisor {
            return Err(Error::invalid_state(self.name(), supervisor.state()));
        }

        let staged = self
            .staged
            .as_ref()
            .ok_or_else(|| Error::from(format!("{} was not initialized", self.spec.name)))?;

        // before anything is spawned
        let args = self.args()?;

        info!(name = %self.spec.name, "starting {}", self.spec.binary);
        let supervisor = Supervisor::new(
            ProcessSpec {
                name: self.spec.name.clone(),
                bin_path: staged.bin_path.clone(),
                args,
                run_as: staged.run_as,
            },
            self.context.supervisor.clone(),
        );

        let result = supervisor.start().await;
        // kept on failure too, so a second run is refused and stop stays safe
        self.supervisor = Some(supervisor);
        result
    }

    async fn stop(&mut self) -> Result<(), Error> {
        match &self.supervisor {
            Some(supervisor) => supervisor.stop().await,
            None => Ok(()),
        }
    }
}

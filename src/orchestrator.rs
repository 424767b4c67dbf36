// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing::{error, info};

use crate::procs::Component;
use crate::Error;

/// Drives a set of components through init, run and stop
///
/// Components are started in the order they were added and stopped in reverse.
#[derive(Default)]
pub struct Orchestrator {
    components: Vec<Box<dyn Component>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<C: Component + 'static>(&mut self, component: C) {
        self.components.push(Box::new(component));
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub async fn init_all(&mut self) -> Result<(), Error> {
        for component in self.components.iter_mut() {
            info!("Initializing {}", component.name());
            component.init().await?;
        }

        Ok(())
    }

    /// Runs every component, on the first failure the ones already running are stopped
    pub async fn run_all(&mut self) -> Result<(), Error> {
        for idx in 0..self.components.len() {
            let component = &mut self.components[idx];
            info!("Running {}", component.name());

            if let Err(e) = component.run().await {
                error!("Failed to run {}: {}", component.name(), e);
                self.stop_components(idx + 1).await.ok();
                return Err(e);
            }
        }

        Ok(())
    }

    /// Stops every component, even when some of them fail to stop
    pub async fn stop_all(&mut self) -> Result<(), Error> {
        self.stop_components(self.components.len()).await
    }

    async fn stop_components(&mut self, count: usize) -> Result<(), Error> {
        let mut failed = Vec::new();

        for component in self.components[..count].iter_mut().rev() {
            info!("Stopping {}", component.name());
            if let Err(e) = component.stop().await {
                error!("Error stopping {}: {}", component.name(), e);
                failed.push(component.name().to_string());
            }
        }

        if failed.is_empty() {
            info!("All components stopped");
            Ok(())
        } else {
            Err(format!("failed to stop: {}", failed.join(", ")).into())
        }
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::args::flags;
use crate::config::ClusterConfig;
use crate::procs::{BinaryComponent, ComponentSpec, NodeContext, SERVICE_GROUP};

/// The kube-scheduler
///
/// Rules:
///   - talks to the API server only through its kubeconfig under the cert root
///   - only listens on localhost
///   - always takes part in leader election
#[derive(Debug)]
pub struct Scheduler;

impl Scheduler {
    pub const NAME: &'static str = "kube-scheduler";
    pub const USER: &'static str = "kube-scheduler";

    pub fn spec(config: &ClusterConfig) -> ComponentSpec {
        let kubeconfig = config
            .cert_root
            .join("scheduler.conf")
            .to_string_lossy()
            .into_owned();

        ComponentSpec {
            name: Self::NAME.to_string(),
            binary: Self::NAME.to_string(),
            user: Self::USER.to_string(),
            group: SERVICE_GROUP.to_string(),
            mandatory_args: flags(vec![
                ("authentication-kubeconfig", kubeconfig.as_str()),
                ("authorization-kubeconfig", kubeconfig.as_str()),
                ("kubeconfig", kubeconfig.as_str()),
                ("bind-address", "127.0.0.1"),
                ("leader-elect", "true"),
            ]),
            extra_args: config.scheduler.extra_args.clone(),
        }
    }

    pub fn component(config: &ClusterConfig, context: NodeContext) -> BinaryComponent {
        BinaryComponent::new(Self::spec(config), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn test_mandatory_flags() {
        let mut config = ClusterConfig::default();
        config.cert_root = PathBuf::from("/etc/pki");

        let spec = Scheduler::spec(&config);

        assert_eq!(spec.mandatory_args["kubeconfig"], "/etc/pki/scheduler.conf");
        assert_eq!(spec.mandatory_args["authentication-kubeconfig"], "/etc/pki/scheduler.conf");
        assert_eq!(spec.mandatory_args["bind-address"], "127.0.0.1");
        assert_eq!(spec.mandatory_args["leader-elect"], "true");
        assert_eq!(spec.group, SERVICE_GROUP);
    }

    #[test]
    fn test_extra_args_come_from_config() {
        let mut config = ClusterConfig::default();
        config
            .scheduler
            .extra_args
            .insert("v".to_string(), "4".to_string());

        assert_eq!(Scheduler::spec(&config).extra_args["v"], "4");
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::{Gid, Uid};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use cpvisor::args::flags;
use cpvisor::config::ClusterConfig;
use cpvisor::identity::IdentityResolver;
use cpvisor::procs::{
    BackoffPolicy, BinaryComponent, Component, LifecycleState, NodeContext, Scheduler,
    SupervisorConfig,
};
use cpvisor::stage::BundleStager;
use cpvisor::ErrorKind;

/// No service accounts on the test host
struct Invoker;

impl IdentityResolver for Invoker {
    fn resolve_uid(&self, _name: &str) -> (Uid, bool) {
        (Uid::current(), false)
    }

    fn resolve_gid(&self, _name: &str) -> (Gid, bool) {
        (Gid::current(), false)
    }
}

struct Node {
    bundle: TempDir,
    data: TempDir,
    config: ClusterConfig,
}

impl Node {
    fn new() -> Self {
        let bundle = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();

        let mut config = ClusterConfig::default();
        config.data_dir = data.path().to_path_buf();
        config.bundle_dir = bundle.path().to_path_buf();
        config.cert_root = Path::new("/etc/cpvisor/pki").to_path_buf();

        Self {
            bundle,
            data,
            config,
        }
    }

    /// Bundles a stand-in kube-scheduler that ignores its flags
    fn with_scheduler(self) -> Self {
        let path = self.bundle.path().join(Scheduler::NAME);
        fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        self
    }

    fn extra_args(mut self, pairs: Vec<(&str, &str)>) -> Self {
        self.config.scheduler.extra_args = flags(pairs);
        self
    }

    fn scheduler(&self) -> BinaryComponent {
        let context = NodeContext {
            data_dir: self.data.path().to_path_buf(),
            identity: Arc::new(Invoker),
            stager: Arc::new(BundleStager::new(self.bundle.path())),
            supervisor: SupervisorConfig {
                backoff: BackoffPolicy {
                    initial: Duration::from_millis(50),
                    max: Duration::from_millis(500),
                    factor: 2.0,
                    reset_after: Duration::from_secs(10),
                },
                grace_period: Duration::from_secs(2),
                max_restarts: None,
            },
        };

        Scheduler::component(&self.config, context)
    }
}

#[tokio::test]
async fn test_overriding_leader_election_is_a_conflict() {
    let node = Node::new()
        .with_scheduler()
        .extra_args(vec![("leader-elect", "false")]);
    let mut scheduler = node.scheduler();

    scheduler.init().await.unwrap();
    let err = scheduler.run().await.unwrap_err();

    match err.kind() {
        ErrorKind::ConfigConflict { component, flag } => {
            assert_eq!(component, Scheduler::NAME);
            assert_eq!(flag, "leader-elect");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(scheduler.supervisor().is_none(), "nothing may be spawned");

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_every_mandatory_flag_is_protected() {
    let spec = Scheduler::spec(&Node::new().config);

    for (name, _) in spec.mandatory_args.iter() {
        let node = Node::new()
            .with_scheduler()
            .extra_args(vec![(name.as_str(), "override")]);
        let mut scheduler = node.scheduler();

        scheduler.init().await.unwrap();
        let err = scheduler.run().await.unwrap_err();

        assert!(
            matches!(err.kind(), ErrorKind::ConfigConflict { flag, .. } if flag == name),
            "{} was overridable",
            name
        );
        assert!(scheduler.supervisor().is_none());
    }
}

#[tokio::test]
async fn test_run_and_stop() {
    let node = Node::new().with_scheduler().extra_args(vec![("v", "2")]);
    let mut scheduler = node.scheduler();

    scheduler.init().await.unwrap();
    scheduler.run().await.unwrap();

    let supervisor = scheduler.supervisor().expect("supervisor after run");
    assert_eq!(supervisor.state(), LifecycleState::Running);
    assert_eq!(
        supervisor.spec().bin_path,
        node.data.path().join("bin").join(Scheduler::NAME)
    );
    assert_eq!(
        supervisor.spec().args,
        vec![
            "--authentication-kubeconfig=/etc/cpvisor/pki/scheduler.conf",
            "--authorization-kubeconfig=/etc/cpvisor/pki/scheduler.conf",
            "--bind-address=127.0.0.1",
            "--kubeconfig=/etc/cpvisor/pki/scheduler.conf",
            "--leader-elect=true",
            "--v=2",
        ]
    );

    scheduler.stop().await.unwrap();
    assert_eq!(
        scheduler.supervisor().unwrap().state(),
        LifecycleState::Stopped
    );

    // a stopped component is not run again
    assert!(scheduler.run().await.is_err());
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_before_run() {
    let node = Node::new().with_scheduler();
    let mut scheduler = node.scheduler();

    scheduler.stop().await.unwrap();
    scheduler.init().await.unwrap();
    scheduler.stop().await.unwrap();

    assert!(scheduler.supervisor().is_none());
}

#[tokio::test]
async fn test_init_fails_without_bundled_binary() {
    let node = Node::new();
    let mut scheduler = node.scheduler();

    let err = scheduler.init().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Staging { .. }));

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_run_requires_init() {
    let node = Node::new().with_scheduler();
    let mut scheduler = node.scheduler();

    assert!(scheduler.run().await.is_err());
    assert!(scheduler.supervisor().is_none());
}

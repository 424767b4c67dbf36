// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;
use std::process::Stdio;

use nix::unistd::{access, AccessFlags};
use tokio::process::{Child, Command};
use tracing::info;

use crate::identity::RunAs;
use crate::Error;

pub struct StdIoConf {
    pub stdin: Stdio,
    pub stderr: Stdio,
    pub stdout: Stdio,
}

impl Default for StdIoConf {
    /// Control plane binaries log to stderr, which stays attached to the supervisor's
    fn default() -> Self {
        Self {
            stdin: Stdio::null(),
            stderr: Stdio::inherit(),
            stdout: Stdio::inherit(),
        }
    }
}

/// Everything needed to launch one instance of a supervised binary
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    pub name: String,
    pub bin_path: PathBuf,
    pub args: Vec<String>,
    pub run_as: RunAs,
}

/// Checks the binary is there and executable before anything is spawned
pub fn check_binary(spec: &ProcessSpec) -> Result<(), Error> {
    if !spec.bin_path.is_file() {
        return Err(Error::launch(
            &spec.name,
            format!("{} does not exist", spec.bin_path.display()),
        ));
    }

    access(&spec.bin_path, AccessFlags::X_OK).map_err(|e| {
        Error::launch(
            &spec.name,
            format!("{} is not executable: {}", spec.bin_path.display(), e),
        )
    })
}

/// Spawns a new instance of the process described by `spec`
///
/// The child gets its own process group, so signals aimed at the supervisor's terminal don't
///   reach it; stopping it is left to the supervisor.
pub fn new_process(spec: &ProcessSpec, stdio: StdIoConf) -> Result<Child, Error> {
    let mut command = Command::new(&spec.bin_path);
    command
        .args(&spec.args)
        .kill_on_drop(true)
        .process_group(0)
        .stdin(stdio.stdin)
        .stdout(stdio.stdout)
        .stderr(stdio.stderr);

    // setuid/setgid are only needed, and only permitted, when dropping privileges
    if spec.run_as != RunAs::current() {
        command
            .uid(spec.run_as.uid.as_raw())
            .gid(spec.run_as.gid.as_raw());
    }

    let child = command
        .spawn()
        .map_err(|e| Error::launch(&spec.name, e))?;

    info!(
        name = %spec.name,
        pid = child.id(),
        uid = %spec.run_as.uid,
        gid = %spec.run_as.gid,
        "started process"
    );

    Ok(child)
}

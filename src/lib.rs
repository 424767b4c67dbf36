// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Supervision of the binaries making up a node's control plane
//!
//! Each binary is a [`procs::Component`]: it is staged, its flags are built, and it is run under a
//!   [`procs::Supervisor`] which restarts it with backoff when it crashes and stops it within a
//!   bounded grace period.

pub mod args;
pub mod config;
mod error;
pub mod fork;
pub mod identity;
pub mod orchestrator;
pub mod procs;
pub mod stage;

pub use error::{Error, ErrorKind};

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;

use thiserror::Error;

use crate::procs::LifecycleState;

#[derive(Error, Debug)]
pub enum ErrorKind {
    /// A user supplied flag collides with one the component requires
    #[error("cannot override {component} flag: {flag}")]
    ConfigConflict { component: String, flag: String },
    #[error("failed to stage {binary}: {reason}")]
    Staging { binary: String, reason: String },
    #[error("failed to launch {name}: {reason}")]
    Launch { name: String, reason: String },
    /// The forceful kill after the grace period failed as well
    #[error("{name} did not stop and could not be killed")]
    StopTimeout {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("{name} is {state}")]
    InvalidState { name: String, state: LifecycleState },
    #[error("configuration error")]
    Config(#[from] config::ConfigError),
    #[error("io error")]
    IoError(#[from] io::Error),
    #[error("nix error")]
    NixError(#[from] nix::Error),
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub(crate) fn launch(name: &str, reason: impl ToString) -> Self {
        Self::from_kind(ErrorKind::Launch {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    }

    pub(crate) fn staging(binary: &str, reason: impl ToString) -> Self {
        Self::from_kind(ErrorKind::Staging {
            binary: binary.to_string(),
            reason: reason.to_string(),
        })
    }

    pub(crate) fn invalid_state(name: &str, state: LifecycleState) -> Self {
        Self::from_kind(ErrorKind::InvalidState {
            name: name.to_string(),
            state,
        })
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}

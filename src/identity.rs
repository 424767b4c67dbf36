// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Service account lookups

use nix::unistd::{Gid, Group, Uid, User};
use tracing::{debug, warn};

/// The uid/gid a supervised process runs as
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunAs {
    pub uid: Uid,
    pub gid: Gid,
}

impl RunAs {
    /// The identity of this process
    pub fn current() -> Self {
        Self {
            uid: Uid::current(),
            gid: Gid::current(),
        }
    }

    /// Resolves both ids, falling back to the invoking identity for each one that is missing.
    ///
    /// A missing account is only ever a warning, the control plane must come up regardless.
    pub fn resolve<R: IdentityResolver + ?Sized>(resolver: &R, user: &str, group: &str) -> Self {
        let (uid, found) = resolver.resolve_uid(user);
        if !found {
            warn!(user, uid = %uid, "service user not found, running with the invoking identity");
        }

        let (gid, found) = resolver.resolve_gid(group);
        if !found {
            warn!(group, gid = %gid, "service group not found, running with the invoking group");
        }

        Self { uid, gid }
    }
}

/// Maps service account names to numeric ids
pub trait IdentityResolver: Send + Sync {
    /// Returns the uid for `name`, or the invoking uid and `false` if there is none
    fn resolve_uid(&self, name: &str) -> (Uid, bool);

    /// Returns the gid for `name`, or the invoking gid and `false` if there is none
    fn resolve_gid(&self, name: &str) -> (Gid, bool);
}

/// Looks accounts up in the host's user and group databases
#[derive(Clone, Copy, Debug, Default)]
pub struct HostIdentity;

impl IdentityResolver for HostIdentity {
    fn resolve_uid(&self, name: &str) -> (Uid, bool) {
        match User::from_name(name) {
            Ok(Some(user)) => (user.uid, true),
            Ok(None) => (Uid::current(), false),
            Err(e) => {
                debug!(user = name, "user lookup failed: {}", e);
                (Uid::current(), false)
            }
        }
    }

    fn resolve_gid(&self, name: &str) -> (Gid, bool) {
        match Group::from_name(name) {
            Ok(Some(group)) => (group.gid, true),
            Ok(None) => (Gid::current(), false),
            Err(e) => {
                debug!(group = name, "group lookup failed: {}", e);
                (Gid::current(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl IdentityResolver for Fixed {
        fn resolve_uid(&self, name: &str) -> (Uid, bool) {
            match name {
                "svc" => (Uid::from_raw(4242), true),
                _ => (Uid::current(), false),
            }
        }

        fn resolve_gid(&self, name: &str) -> (Gid, bool) {
            match name {
                "svc" => (Gid::from_raw(4343), true),
                _ => (Gid::current(), false),
            }
        }
    }

    #[test]
    fn test_resolved_identity() {
        let run_as = RunAs::resolve(&Fixed, "svc", "svc");
        assert_eq!(run_as.uid, Uid::from_raw(4242));
        assert_eq!(run_as.gid, Gid::from_raw(4343));
    }

    #[test]
    fn test_missing_accounts_fall_back_independently() {
        let run_as = RunAs::resolve(&Fixed, "nobody-here", "svc");
        assert_eq!(run_as.uid, Uid::current());
        assert_eq!(run_as.gid, Gid::from_raw(4343));
    }

    #[test]
    fn test_host_lookup_of_unknown_user() {
        let (uid, found) = HostIdentity.resolve_uid("cpvisor-no-such-user");
        assert!(!found);
        assert_eq!(uid, Uid::current());
    }

    #[test]
    fn test_host_lookup_of_root() {
        let (uid, found) = HostIdentity.resolve_uid("root");
        assert!(found);
        assert!(uid.is_root());
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Command line flags for supervised binaries

use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::Error;

/// Flag name to value, kept sorted so the produced argument vector is stable
pub type Flags = BTreeMap<String, String>;

/// Merges the mandatory flags of a component with the user supplied overrides.
///
/// Mandatory flags are what make the binary safe to run unattended (auth wiring, bind address,
///   leader election), so any override naming one of them is rejected rather than applied.
///
/// # Returns
///
/// `--key=value` tokens ordered by key
pub fn build_args(component: &str, mandatory: &Flags, overrides: &Flags) -> Result<Vec<String>, Error> {
    if let Some(flag) = overrides.keys().find(|name| mandatory.contains_key(*name)) {
        return Err(ErrorKind::ConfigConflict {
            component: component.to_string(),
            flag: flag.clone(),
        }
        .into());
    }

    let merged = mandatory.iter().chain(overrides.iter()).collect::<BTreeMap<_, _>>();

    Ok(merged
        .into_iter()
        .map(|(name, value)| format!("--{}={}", name, value))
        .collect())
}

/// Convenience for building a flag map from literal pairs
pub fn flags<'a, I>(pairs: I) -> Flags
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler_flags() -> Flags {
        flags(vec![("bind-address", "127.0.0.1"), ("leader-elect", "true")])
    }

    #[test]
    fn test_override_of_mandatory_flag_is_rejected() {
        let err = build_args("kube-scheduler", &scheduler_flags(), &flags(vec![("leader-elect", "false")]))
            .unwrap_err();

        match err.kind() {
            ErrorKind::ConfigConflict { component, flag } => {
                assert_eq!(component, "kube-scheduler");
                assert_eq!(flag, "leader-elect");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_disjoint_overrides_are_merged_in_key_order() {
        let args = build_args("kube-scheduler", &scheduler_flags(), &flags(vec![("v", "2")])).unwrap();

        assert_eq!(
            args,
            vec!["--bind-address=127.0.0.1", "--leader-elect=true", "--v=2"]
        );
    }

    #[test]
    fn test_every_key_appears_once() {
        let overrides = flags(vec![("v", "2"), ("profiling", "false"), ("a", "b")]);
        let args = build_args("kube-scheduler", &scheduler_flags(), &overrides).unwrap();

        assert_eq!(args.len(), scheduler_flags().len() + overrides.len());
        for name in scheduler_flags().keys().chain(overrides.keys()) {
            let prefix = format!("--{}=", name);
            assert_eq!(args.iter().filter(|a| a.starts_with(&prefix)).count(), 1);
        }
    }

    #[test]
    fn test_no_overrides() {
        let args = build_args("kube-scheduler", &scheduler_flags(), &Flags::new()).unwrap();
        assert_eq!(args, vec!["--bind-address=127.0.0.1", "--leader-elect=true"]);
    }

    #[test]
    fn test_empty_value_still_conflicts() {
        let mandatory = flags(vec![("kubeconfig", "")]);
        let overrides = flags(vec![("kubeconfig", "/tmp/other.conf")]);

        assert!(build_args("kube-scheduler", &mandatory, &overrides).is_err());
    }
}

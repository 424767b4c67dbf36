// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Placing binaries on disk before they are executed

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid};
use tracing::{debug, info};

use crate::Error;

/// Staged binaries are readable and executable by the owning group only
pub const STAGED_MODE: u32 = 0o750;

pub trait BinaryStager: Send + Sync {
    /// Ensures `binary_name` is present under `target_dir` and owned by `owning_group`
    fn stage(&self, target_dir: &Path, binary_name: &str, owning_group: Gid) -> Result<PathBuf, Error>;

    /// Where `stage` places `binary_name`
    fn staged_path(&self, target_dir: &Path, binary_name: &str) -> PathBuf {
        target_dir.join("bin").join(binary_name)
    }
}

/// Extracts binaries from a bundle directory shipped next to the supervisor.
///
/// Binaries that are already staged are left as they are, only their group is fixed up.
#[derive(Clone, Debug)]
pub struct BundleStager {
    bundle_dir: PathBuf,
}

impl BundleStager {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
        }
    }

    fn extract(&self, binary_name: &str, target: &Path) -> Result<(), Error> {
        let source = self.bundle_dir.join(binary_name);
        if !source.is_file() {
            return Err(Error::staging(
                binary_name,
                format!("not present in bundle {}", self.bundle_dir.display()),
            ));
        }

        let parent = target
            .parent()
            .ok_or_else(|| Error::staging(binary_name, "target has no parent directory"))?;
        fs::create_dir_all(parent).map_err(|e| Error::staging(binary_name, e))?;

        // copy next to the target, then rename, so a half written file is never executed
        let partial = target.with_extension("partial");
        let placed = fs::copy(&source, &partial)
            .and_then(|_| fs::set_permissions(&partial, fs::Permissions::from_mode(STAGED_MODE)))
            .and_then(|()| fs::rename(&partial, target));

        if let Err(e) = placed {
            if let Err(cleanup) = fs::remove_file(&partial) {
                debug!(path = %partial.display(), "no partial file to remove: {}", cleanup);
            }
            return Err(Error::staging(binary_name, e));
        }

        info!(binary = binary_name, path = %target.display(), "extracted binary");
        Ok(())
    }
}

impl BinaryStager for BundleStager {
    fn stage(&self, target_dir: &Path, binary_name: &str, owning_group: Gid) -> Result<PathBuf, Error> {
        let target = self.staged_path(target_dir, binary_name);

        if target.is_file() {
            debug!(binary = binary_name, path = %target.display(), "binary already staged");
        } else {
            self.extract(binary_name, &target)?;
        }

        chown(&target, None, Some(owning_group)).map_err(|e| Error::staging(binary_name, e))?;

        Ok(target)
    }
}

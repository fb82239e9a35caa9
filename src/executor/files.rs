//! File operation handlers: Op::MakeDir, Op::InstallFile

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Handle Op::MakeDir: Create a directory and its parents
pub fn handle_make_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("creating directory {}", path.display()))
}

/// Handle Op::InstallFile: Copy a build artifact into the install tree
///
/// An existing file at `dst` is replaced; permissions are copied from `src`.
pub fn handle_install_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        bail!("artifact not found: {}", src.display());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    // Replace rather than write through: dst may be a running binary or a symlink.
    if dst.is_symlink() || dst.exists() {
        fs::remove_file(dst).with_context(|| format!("removing old {}", dst.display()))?;
    }

    fs::copy(src, dst)
        .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    Ok(())
}

//! Install manifests.
//!
//! After a plan installs its artifacts, a JSON manifest next to them records
//! what was installed, with checksums, so later tooling can tell which
//! build produced a file in the SDK.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub target: String,
    pub installed_at_utc: String,
    pub files: Vec<InstalledFile>,
}

pub fn manifest_path(install_root: &Path, target: &str) -> PathBuf {
    install_root.join(format!(".cheri-crossbuild-{target}.json"))
}

/// Hash `files` and write the manifest under `install_root`.
pub fn write_manifest(install_root: &Path, target: &str, files: &[PathBuf]) -> Result<PathBuf> {
    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let (sha256, size) = sha256_file(path)?;
        entries.push(InstalledFile {
            path: path.clone(),
            sha256,
            size,
        });
    }

    let installed_at_utc = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting install timestamp")?;
    let manifest = InstallManifest {
        target: target.to_string(),
        installed_at_utc,
        files: entries,
    };

    fs::create_dir_all(install_root)
        .with_context(|| format!("creating install root {}", install_root.display()))?;
    let path = manifest_path(install_root, target);
    let json = serde_json::to_vec_pretty(&manifest).context("serializing install manifest")?;
    fs::write(&path, json)
        .with_context(|| format!("writing install manifest {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<InstallManifest> {
    let bytes =
        fs::read(path).with_context(|| format!("reading install manifest {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing install manifest {}", path.display()))
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_records_checksums() {
        let temp = tempfile::tempdir().unwrap();
        let artifact = temp.path().join("bbl");
        fs::write(&artifact, "abc").unwrap();

        let path = write_manifest(temp.path(), "bbl-baremetal-riscv64", &[artifact.clone()]).unwrap();
        assert_eq!(
            path,
            temp.path().join(".cheri-crossbuild-bbl-baremetal-riscv64.json")
        );

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.target, "bbl-baremetal-riscv64");
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, artifact);
        assert_eq!(manifest.files[0].size, 3);
        assert_eq!(
            manifest.files[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(manifest.installed_at_utc.ends_with('Z'));
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("brandelf");
        assert!(write_manifest(temp.path(), "elftoolchain", &[missing]).is_err());
    }
}

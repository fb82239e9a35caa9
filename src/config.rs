//! SDK configuration.
//!
//! [`SdkConfig`] carries every path convention a recipe needs. It is passed
//! explicitly to each recipe call; nothing reads process-wide state after
//! [`SdkConfig::load`] returns.
//!
//! # File format
//!
//! ```toml
//! [sdk]
//! root = "/home/me/cheri"          # base for the defaults below
//! sdk_dir = "output/sdk"           # relative paths resolve against the file
//! build_type = "debug"
//! make_jobs = 8
//!
//! [[bbl_variant]]
//! target = "bbl-cheribsd"
//! build_dir_suffix = "-cheribsd"
//! supported_targets = ["baremetal-riscv64-hybrid"]
//! kernel_recipe = "cheribsd"
//! # {target} expands to each supported target's suffix
//! kernel_image = "output/rootfs-{target}/boot/kernel/kernel"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File looked up in the user config dir when no `--config` is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "cheri-crossbuild.toml";

/// Environment variable overriding the SDK directory.
pub const SDK_DIR_ENV: &str = "CHERI_SDK_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    Debug,
    Release,
    #[default]
    ReleaseWithDebugInfo,
}

impl BuildType {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "release-with-debug-info" | "relwithdebinfo" => Ok(Self::ReleaseWithDebugInfo),
            other => bail!(
                "unsupported build_type '{}' (expected 'debug', 'release' or 'release-with-debug-info')",
                other
            ),
        }
    }

    /// Optimization and debug-info flags for C compilation.
    pub fn optimization_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["-O0", "-g"],
            Self::Release => &["-O2"],
            Self::ReleaseWithDebugInfo => &["-O2", "-g"],
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Release => write!(f, "release"),
            Self::ReleaseWithDebugInfo => write!(f, "release-with-debug-info"),
        }
    }
}

/// A BBL variant declared in the config file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BblVariantDecl {
    pub target: String,
    pub build_dir_suffix: String,
    pub mem_start: Option<u64>,
    pub supported_targets: Vec<String>,
    pub without_payload: bool,
    pub kernel_recipe: Option<String>,
    pub kernel_image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Where cross tools live (`bin/`) and where SDK-wide outputs are installed.
    pub sdk_dir: PathBuf,
    /// Parent of all source checkouts.
    pub source_root: PathBuf,
    /// Parent of all out-of-tree build directories.
    pub build_root: PathBuf,
    /// Install prefix of the native QEMU build.
    pub qemu_install_dir: PathBuf,
    pub make_jobs: usize,
    pub build_type: BuildType,
    pub bbl_variants: Vec<BblVariantDecl>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    sdk: Option<SdkToml>,
    #[serde(default)]
    bbl_variant: Vec<BblVariantToml>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SdkToml {
    root: Option<String>,
    sdk_dir: Option<String>,
    source_root: Option<String>,
    build_root: Option<String>,
    qemu_install_dir: Option<String>,
    make_jobs: Option<usize>,
    build_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BblVariantToml {
    target: String,
    build_dir_suffix: Option<String>,
    mem_start: Option<String>,
    supported_targets: Vec<String>,
    #[serde(default)]
    without_payload: bool,
    kernel_recipe: Option<String>,
    kernel_image: Option<String>,
}

impl SdkConfig {
    /// Default layout rooted at `root`.
    pub fn with_root(root: &Path) -> Self {
        let sdk_dir = root.join("output").join("sdk");
        Self {
            qemu_install_dir: sdk_dir.clone(),
            sdk_dir,
            source_root: root.to_path_buf(),
            build_root: root.join("build"),
            make_jobs: default_make_jobs(),
            build_type: BuildType::default(),
            bbl_variants: Vec::new(),
        }
    }

    /// Load configuration: explicit file, else the default file if present,
    /// else built-in defaults. `CHERI_SDK_DIR` overrides the SDK dir.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with(
            config_path,
            dirs::config_dir().map(|d| d.join(DEFAULT_CONFIG_FILENAME)),
            env::var(SDK_DIR_ENV).ok(),
        )
    }

    /// [`SdkConfig::load`] with the default file location and the value of
    /// `CHERI_SDK_DIR` passed in.
    pub fn load_with(
        config_path: Option<&Path>,
        default_path: Option<PathBuf>,
        sdk_dir_env: Option<String>,
    ) -> Result<Self> {
        let mut config = match (config_path, default_path) {
            (Some(path), _) => Self::from_file(path)?,
            (None, Some(path)) if path.is_file() => Self::from_file(&path)?,
            _ => Self::with_root(&default_root()),
        };

        if let Some(sdk_dir) = sdk_dir_env.filter(|d| !d.trim().is_empty()) {
            // A QEMU dir that defaulted to the SDK dir moves with it.
            if config.qemu_install_dir == config.sdk_dir {
                config.qemu_install_dir = PathBuf::from(&sdk_dir);
            }
            config.sdk_dir = PathBuf::from(sdk_dir);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir)
            .with_context(|| format!("parsing config '{}'", path.display()))
    }

    /// Parse TOML content; relative paths resolve against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let parsed: ConfigToml = toml::from_str(content)?;
        let sdk = parsed.sdk.unwrap_or_default();

        let root = sdk
            .root
            .as_deref()
            .map(|p| resolve_path(base_dir, p))
            .unwrap_or_else(default_root);
        let mut config = Self::with_root(&root);

        if let Some(dir) = &sdk.sdk_dir {
            config.sdk_dir = resolve_path(base_dir, dir);
        }
        config.qemu_install_dir = match &sdk.qemu_install_dir {
            Some(dir) => resolve_path(base_dir, dir),
            None => config.sdk_dir.clone(),
        };
        if let Some(dir) = &sdk.source_root {
            config.source_root = resolve_path(base_dir, dir);
        }
        if let Some(dir) = &sdk.build_root {
            config.build_root = resolve_path(base_dir, dir);
        }
        if let Some(jobs) = sdk.make_jobs {
            if jobs == 0 {
                bail!("make_jobs must be at least 1");
            }
            config.make_jobs = jobs;
        }
        if let Some(raw) = &sdk.build_type {
            config.build_type = BuildType::parse(raw)?;
        }

        for variant in parsed.bbl_variant {
            let mem_start = variant
                .mem_start
                .as_deref()
                .map(parse_address)
                .transpose()
                .with_context(|| format!("bbl_variant '{}'", variant.target))?;
            config.bbl_variants.push(BblVariantDecl {
                target: variant.target,
                build_dir_suffix: variant.build_dir_suffix.unwrap_or_default(),
                mem_start,
                supported_targets: variant.supported_targets,
                without_payload: variant.without_payload,
                kernel_recipe: variant.kernel_recipe,
                kernel_image: variant
                    .kernel_image
                    .as_deref()
                    .map(|p| resolve_path(base_dir, p)),
            });
        }

        Ok(config)
    }

    /// Directory holding the cross tools (clang, llvm-objcopy, ...).
    pub fn sdk_bindir(&self) -> PathBuf {
        self.sdk_dir.join("bin")
    }

    /// `-jN` flag for make.
    pub fn make_j_flag(&self) -> String {
        format!("-j{}", self.make_jobs)
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("cheri")
}

fn default_make_jobs() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            eprintln!("  [WARN] Could not detect CPU count ({}), using 4 jobs", e);
            4
        }
    }
}

pub(crate) fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

/// Parse a memory address written as hex (`0x80000000`) or decimal.
pub fn parse_address(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.replace('_', "").parse::<u64>(),
    };
    parsed.with_context(|| format!("invalid memory address '{}'", raw))
}

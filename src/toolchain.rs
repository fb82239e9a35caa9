//! Cross compiler flags and SDK tool resolution.

use std::path::PathBuf;

use crate::config::SdkConfig;
use crate::target::CompilationTarget;

/// Binary tools a native build may pick up from `PATH` unless overridden.
///
/// Each tuple is (make/configure variable, SDK binary name).
pub const BINUTILS_OVERRIDES: &[(&str, &str)] = &[
    ("OBJCOPY", "llvm-objcopy"),
    ("READELF", "llvm-readelf"),
    ("RANLIB", "llvm-ranlib"),
    ("AR", "llvm-ar"),
];

/// Tools the SDK must provide for a cross build.
pub const REQUIRED_SDK_TOOLS: &[&str] = &[
    "clang",
    "ld.lld",
    "llvm-objcopy",
    "llvm-readelf",
    "llvm-ranlib",
    "llvm-ar",
];

/// Compiler and linker flags, collected per recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerFlags {
    /// Passed to both the compiler and the linker driver.
    pub common: Vec<String>,
    pub warnings: Vec<String>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl CompilerFlags {
    /// Base flags for compiling C for `target` with the SDK clang.
    pub fn for_target(target: CompilationTarget, config: &SdkConfig) -> Self {
        let mut flags = Self::default();
        if let Some(triple) = target.triple() {
            flags.common.push(format!("--target={triple}"));
        }
        if let Some(arch) = target.arch_string() {
            flags.common.push(format!("-march={arch}"));
        }
        if let Some(abi) = target.abi() {
            flags.common.push(format!("-mabi={abi}"));
            // lld does not support linker relaxation for RISC-V.
            flags.common.push("-mno-relax".to_string());
        }
        flags.common.extend(
            config
                .build_type
                .optimization_flags()
                .iter()
                .map(|f| f.to_string()),
        );
        if !target.is_native() {
            flags.ldflags.push("-fuse-ld=lld".to_string());
        }
        flags
    }

    /// Everything the compiler sees, as the value of `CFLAGS`.
    pub fn cflags_value(&self) -> String {
        self.common
            .iter()
            .chain(&self.warnings)
            .chain(&self.cflags)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Everything the linker driver sees, as the value of `LDFLAGS`.
    pub fn ldflags_value(&self) -> String {
        self.common
            .iter()
            .chain(&self.ldflags)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// GNU make as it is named on the host.
pub fn gnu_make() -> &'static str {
    if cfg!(target_os = "linux") {
        "make"
    } else {
        "gmake"
    }
}

/// BSD make as it is named on the host.
pub fn bsd_make() -> &'static str {
    if cfg!(target_os = "linux") {
        "bmake"
    } else {
        "make"
    }
}

/// Path of an SDK binary.
pub fn sdk_tool(config: &SdkConfig, name: &str) -> PathBuf {
    config.sdk_bindir().join(name)
}

/// `(VAR, path)` pairs for [`BINUTILS_OVERRIDES`].
pub fn binutils_env(config: &SdkConfig) -> Vec<(String, String)> {
    BINUTILS_OVERRIDES
        .iter()
        .map(|(var, tool)| {
            (
                var.to_string(),
                sdk_tool(config, tool).display().to_string(),
            )
        })
        .collect()
}

/// Compiler environment for `configure`: CC, CFLAGS, LDFLAGS.
pub fn compiler_env(config: &SdkConfig, flags: &CompilerFlags) -> Vec<(String, String)> {
    vec![
        ("CC".to_string(), sdk_tool(config, "clang").display().to_string()),
        ("CFLAGS".to_string(), flags.cflags_value()),
        ("LDFLAGS".to_string(), flags.ldflags_value()),
    ]
}

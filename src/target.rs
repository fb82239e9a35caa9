//! Cross-compilation targets.
//!
//! A [`CompilationTarget`] is either the build host or a bare-metal RISC-V
//! target with an optional CHERI capability mode. Recipes select their
//! ABI/ISA flags and their directory naming from it.

use anyhow::{bail, Result};
use std::fmt;

/// RISC-V base architecture width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiscvArch {
    Riscv32,
    Riscv64,
}

/// CHERI capability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheriMode {
    /// Plain RISC-V, no capability extension.
    None,
    /// Capability extension enabled, integer pointers by default.
    Hybrid,
    /// Every pointer is a capability.
    Purecap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationTarget {
    /// The build host.
    Native,
    /// Bare-metal newlib RISC-V.
    Baremetal { arch: RiscvArch, cheri: CheriMode },
}

impl CompilationTarget {
    pub const BAREMETAL_RISCV64: Self = Self::Baremetal {
        arch: RiscvArch::Riscv64,
        cheri: CheriMode::None,
    };
    pub const BAREMETAL_RISCV64_HYBRID: Self = Self::Baremetal {
        arch: RiscvArch::Riscv64,
        cheri: CheriMode::Hybrid,
    };
    pub const BAREMETAL_RISCV64_PURECAP: Self = Self::Baremetal {
        arch: RiscvArch::Riscv64,
        cheri: CheriMode::Purecap,
    };
    pub const BAREMETAL_RISCV32: Self = Self::Baremetal {
        arch: RiscvArch::Riscv32,
        cheri: CheriMode::None,
    };
    pub const BAREMETAL_RISCV32_PURECAP: Self = Self::Baremetal {
        arch: RiscvArch::Riscv32,
        cheri: CheriMode::Purecap,
    };

    /// Every known target, in the order used for listings.
    pub const ALL: &'static [Self] = &[
        Self::Native,
        Self::BAREMETAL_RISCV64,
        Self::BAREMETAL_RISCV64_HYBRID,
        Self::BAREMETAL_RISCV64_PURECAP,
        Self::BAREMETAL_RISCV32,
        Self::BAREMETAL_RISCV32_PURECAP,
    ];

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    pub fn is_cheri_purecap(&self) -> bool {
        matches!(
            self,
            Self::Baremetal {
                cheri: CheriMode::Purecap,
                ..
            }
        )
    }

    pub fn is_hybrid_or_purecap_cheri(&self) -> bool {
        matches!(
            self,
            Self::Baremetal {
                cheri: CheriMode::Hybrid | CheriMode::Purecap,
                ..
            }
        )
    }

    /// Name used to suffix target and directory names, e.g. `baremetal-riscv64-purecap`.
    pub fn generic_suffix(&self) -> String {
        match self {
            Self::Native => "native".to_string(),
            Self::Baremetal { arch, cheri } => {
                let arch = match arch {
                    RiscvArch::Riscv32 => "riscv32",
                    RiscvArch::Riscv64 => "riscv64",
                };
                match cheri {
                    CheriMode::None => format!("baremetal-{arch}"),
                    CheriMode::Hybrid => format!("baremetal-{arch}-hybrid"),
                    CheriMode::Purecap => format!("baremetal-{arch}-purecap"),
                }
            }
        }
    }

    /// GNU target triple passed as `--host` and `--target`.
    pub fn triple(&self) -> Option<&'static str> {
        match self {
            Self::Native => None,
            Self::Baremetal {
                arch: RiscvArch::Riscv32,
                ..
            } => Some("riscv32-unknown-elf"),
            Self::Baremetal {
                arch: RiscvArch::Riscv64,
                ..
            } => Some("riscv64-unknown-elf"),
        }
    }

    /// Value for `-mabi=` / `--with-abi=`.
    pub fn abi(&self) -> Option<&'static str> {
        match self {
            Self::Native => None,
            Self::Baremetal { arch, cheri } => {
                let cheri = !matches!(cheri, CheriMode::None);
                Some(match (arch, cheri) {
                    (RiscvArch::Riscv64, true) => "l64pc128",
                    (RiscvArch::Riscv64, false) => "lp64",
                    (RiscvArch::Riscv32, true) => "il32pc64",
                    (RiscvArch::Riscv32, false) => "ilp32",
                })
            }
        }
    }

    /// Value for `-march=` / `--with-arch=`.
    pub fn arch_string(&self) -> Option<String> {
        match self {
            Self::Native => None,
            Self::Baremetal { arch, cheri } => {
                let base = match arch {
                    RiscvArch::Riscv32 => "rv32imafdc",
                    RiscvArch::Riscv64 => "rv64imafdc",
                };
                Some(match cheri {
                    CheriMode::None => base.to_string(),
                    CheriMode::Hybrid | CheriMode::Purecap => format!("{base}xcheri"),
                })
            }
        }
    }

    /// Look up a target by its generic suffix.
    pub fn from_suffix(suffix: &str) -> Result<Self> {
        if let Some(target) = Self::ALL.iter().find(|t| t.generic_suffix() == suffix) {
            return Ok(*target);
        }
        let known = Self::ALL
            .iter()
            .map(|t| t.generic_suffix())
            .collect::<Vec<_>>()
            .join(", ");
        bail!(
            "unknown compilation target '{}'; expected one of: {}",
            suffix,
            known
        )
    }
}

impl fmt::Display for CompilationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.generic_suffix())
    }
}

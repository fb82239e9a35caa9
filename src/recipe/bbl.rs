//! Berkeley Boot Loader (riscv-pk) recipe.
//!
//! All BBL flavours share one source tree and one planning function; what
//! differs between them is data in a [`BblVariant`]:
//!
//! | target     | mem start    | suffix  | install dir                          |
//! |------------|--------------|---------|--------------------------------------|
//! | `bbl`      | `0x80000000` |         | `$SDK/bbl/riscv64{,-purecap}`        |
//! | `bbl-gfe`  | `0xc0000000` | `-gfe`  | `$SDK/bbl-gfe/riscv64{,-purecap}`    |
//! | `bbl-fett` | `0xc0000000` | `-fett` | `$SDK/bbl-fett/baremetal-riscv64...` |
//!
//! The built-in variants are all "fw_jump" style firmware without an
//! embedded kernel. Variants that embed a kernel come from configuration.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::{BblVariantDecl, SdkConfig};
use crate::plan::{Op, Phase, Plan, Recipe, SourceRepository};
use crate::target::CompilationTarget;
use crate::toolchain::{self, CompilerFlags};

pub const BBL_REPOSITORY: SourceRepository = SourceRepository {
    url: "https://github.com/CTSRD-CHERI/riscv-pk",
    branch: "cheri_purecap",
};

/// All variants build from the same checkout.
pub const SOURCE_DIR_NAME: &str = "riscv-pk";
const PROJECT_NAME: &str = "bbl";
const MAKE_TARGET: &str = "bbl";
const ARTIFACT_NAME: &str = "bbl";

pub const DEFAULT_MEM_START: u64 = 0x8000_0000;
/// Memory base of the GFE and FETT FPGA platforms.
pub const GFE_MEM_START: u64 = 0xc000_0000;

/// Name QEMU looks for with `-bios default` on the CHERI virt machine.
pub const QEMU_FIRMWARE_NAME: &str = "bbl-riscv64cheri-virt-fw_jump.bin";

/// Expanded to the target's generic suffix in a kernel image path.
pub const KERNEL_TARGET_PLACEHOLDER: &str = "{target}";

/// Kernel image embedded into BBL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelPayload {
    /// Kernel recipe that produces `image`.
    pub recipe: String,
    /// Installed kernel image; may contain [`KERNEL_TARGET_PLACEHOLDER`].
    pub image: PathBuf,
}

impl KernelPayload {
    fn is_per_target(&self) -> bool {
        self.image
            .to_string_lossy()
            .contains(KERNEL_TARGET_PLACEHOLDER)
    }

    /// Installed kernel image of the `recipe` build for `target`.
    pub fn image_for(&self, target: CompilationTarget) -> PathBuf {
        if !self.is_per_target() {
            return self.image.clone();
        }
        PathBuf::from(
            self.image
                .to_string_lossy()
                .replace(KERNEL_TARGET_PLACEHOLDER, &target.generic_suffix()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBinding {
    /// Build BBL without a payload; it jumps to the next boot stage.
    None,
    Kernel(KernelPayload),
}

/// How the per-target install directory is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallNaming {
    /// Generic suffix without `baremetal-`, e.g. `riscv64-purecap`.
    ShortArch,
    /// The full generic suffix, e.g. `baremetal-riscv64-purecap`.
    GenericSuffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BblVariant {
    /// Target name without target suffix (`bbl`, `bbl-gfe`, ...).
    pub target: String,
    pub mem_start: u64,
    pub payload: PayloadBinding,
    /// Keeps build and install directories of variants apart.
    pub build_dir_suffix: String,
    pub install_naming: InstallNaming,
    /// Also install as QEMU's default BIOS (purecap, unsuffixed only).
    pub exports_qemu_firmware: bool,
    /// First entry is the default when no target suffix is given.
    pub supported_targets: Vec<CompilationTarget>,
}

impl BblVariant {
    pub fn no_payload() -> Self {
        Self {
            target: "bbl".to_string(),
            mem_start: DEFAULT_MEM_START,
            payload: PayloadBinding::None,
            build_dir_suffix: String::new(),
            install_naming: InstallNaming::ShortArch,
            exports_qemu_firmware: true,
            supported_targets: vec![
                CompilationTarget::BAREMETAL_RISCV64_PURECAP,
                CompilationTarget::BAREMETAL_RISCV64,
            ],
        }
    }

    pub fn no_payload_gfe() -> Self {
        Self {
            target: "bbl-gfe".to_string(),
            mem_start: GFE_MEM_START,
            build_dir_suffix: "-gfe".to_string(),
            ..Self::no_payload()
        }
    }

    pub fn no_payload_fett() -> Self {
        Self {
            target: "bbl-fett".to_string(),
            build_dir_suffix: "-fett".to_string(),
            install_naming: InstallNaming::GenericSuffix,
            ..Self::no_payload_gfe()
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![
            Self::no_payload(),
            Self::no_payload_gfe(),
            Self::no_payload_fett(),
        ]
    }

    /// Build a variant from a config declaration.
    ///
    /// `without_payload` must be paired with the absence of a kernel
    /// reference, and a payload build needs both the kernel recipe and its
    /// image.
    pub fn from_decl(decl: &BblVariantDecl) -> Result<Self> {
        if decl.target.trim().is_empty() {
            bail!("bbl_variant target must not be empty");
        }
        if decl.supported_targets.is_empty() {
            bail!(
                "bbl_variant '{}' must list at least one supported target",
                decl.target
            );
        }
        let supported_targets = decl
            .supported_targets
            .iter()
            .map(|s| CompilationTarget::from_suffix(s))
            .collect::<Result<Vec<_>>>()?;
        if let Some(native) = supported_targets.iter().find(|t| t.is_native()) {
            bail!(
                "bbl_variant '{}' cannot target '{}'",
                decl.target,
                native
            );
        }

        let payload = match (
            decl.without_payload,
            decl.kernel_recipe.as_ref(),
            decl.kernel_image.as_ref(),
        ) {
            (true, None, None) => PayloadBinding::None,
            (true, _, _) => bail!(
                "bbl_variant '{}' sets without_payload but also names a kernel",
                decl.target
            ),
            (false, Some(recipe), Some(image)) => PayloadBinding::Kernel(KernelPayload {
                recipe: recipe.clone(),
                image: image.clone(),
            }),
            (false, _, _) => bail!(
                "bbl_variant '{}' embeds a payload and needs both kernel_recipe and kernel_image \
                 (or set without_payload = true)",
                decl.target
            ),
        };

        // Each target depends on its own kernel build, so one fixed image
        // cannot serve several targets.
        if let PayloadBinding::Kernel(kernel) = &payload {
            if supported_targets.len() > 1 && !kernel.is_per_target() {
                bail!(
                    "bbl_variant '{}' lists {} targets; kernel_image must contain '{}'",
                    decl.target,
                    supported_targets.len(),
                    KERNEL_TARGET_PLACEHOLDER
                );
            }
        }

        Ok(Self {
            target: decl.target.clone(),
            mem_start: decl.mem_start.unwrap_or(DEFAULT_MEM_START),
            payload,
            build_dir_suffix: decl.build_dir_suffix.clone(),
            install_naming: InstallNaming::ShortArch,
            exports_qemu_firmware: false,
            supported_targets,
        })
    }

    pub fn supports(&self, target: CompilationTarget) -> bool {
        self.supported_targets.contains(&target)
    }

    pub fn default_target(&self) -> Option<CompilationTarget> {
        self.supported_targets.first().copied()
    }

    pub fn install_dir(&self, config: &SdkConfig, target: CompilationTarget) -> PathBuf {
        let suffix = target.generic_suffix();
        let arch_dir = match self.install_naming {
            InstallNaming::ShortArch => suffix.replace("baremetal-", ""),
            InstallNaming::GenericSuffix => suffix,
        };
        config
            .sdk_dir
            .join(format!("{}{}", PROJECT_NAME, self.build_dir_suffix))
            .join(arch_dir)
    }

    pub fn build_dir(&self, config: &SdkConfig, target: CompilationTarget) -> PathBuf {
        config.build_root.join(format!(
            "{}{}-{}-build",
            PROJECT_NAME,
            self.build_dir_suffix,
            target.generic_suffix()
        ))
    }

    /// The installed BBL image, usable as a kernel by later boot stages.
    pub fn installed_kernel_path(&self, config: &SdkConfig, target: CompilationTarget) -> PathBuf {
        self.install_dir(config, target).join(ARTIFACT_NAME)
    }

    /// Only the unsuffixed purecap build replaces QEMU's default firmware;
    /// GFE/FETT builds must not clobber it.
    pub fn installs_qemu_firmware(&self, target: CompilationTarget) -> bool {
        self.exports_qemu_firmware && target.is_cheri_purecap() && self.build_dir_suffix.is_empty()
    }
}

/// A [`BblVariant`] bound to one compilation target.
#[derive(Debug, Clone)]
pub struct BblRecipe {
    variant: BblVariant,
    target: CompilationTarget,
}

impl BblRecipe {
    pub fn new(variant: BblVariant, target: CompilationTarget) -> Result<Self> {
        if !variant.supports(target) {
            let supported = variant
                .supported_targets
                .iter()
                .map(|t| t.generic_suffix())
                .collect::<Vec<_>>()
                .join(", ");
            bail!(
                "{} does not support target '{}' (supported: {})",
                variant.target,
                target,
                supported
            );
        }
        Ok(Self { variant, target })
    }

    /// Freestanding flags; BBL runs on bare metal with no libc.
    pub fn compiler_flags(&self, config: &SdkConfig) -> CompilerFlags {
        let mut flags = CompilerFlags::for_target(self.target, config);
        flags.common.push("-nostdlib".to_string());
        flags.cflags.extend(
            ["-nostartfiles", "-nostdlib", "-static", "-ffreestanding"]
                .iter()
                .map(|f| f.to_string()),
        );
        flags.ldflags.extend(
            ["-nostartfiles", "-nostdlib", "-static"]
                .iter()
                .map(|f| f.to_string()),
        );
        flags.warnings.extend(
            ["-Werror=undef", "-Werror=return-type", "-Wall"]
                .iter()
                .map(|f| f.to_string()),
        );
        flags
    }

    pub fn configure_args(&self, config: &SdkConfig) -> Result<Vec<String>> {
        let variant = &self.variant;
        let mut args = Vec::new();

        if let Some(triple) = self.target.triple() {
            args.push(format!("--host={triple}"));
        }
        args.push(format!(
            "--prefix={}",
            variant.install_dir(config, self.target).display()
        ));

        let (Some(abi), Some(arch)) = (self.target.abi(), self.target.arch_string()) else {
            bail!("{} cannot be built for '{}'", variant.target, self.target);
        };
        args.push(format!("--with-abi={abi}"));
        args.push(format!("--with-arch={arch}"));
        if self.target.is_hybrid_or_purecap_cheri() {
            args.push(format!("--with-mem-start={:#x}", variant.mem_start));
        }

        if config.build_type == crate::config::BuildType::Debug {
            args.push("--enable-logo".to_string());
        }

        args.push("--disable-fp-emulation".to_string());

        match &variant.payload {
            PayloadBinding::None => args.push("--without-payload".to_string()),
            PayloadBinding::Kernel(kernel) => {
                if kernel.image.as_os_str().is_empty() {
                    bail!(
                        "{} embeds kernel '{}' but its image path is empty",
                        variant.target,
                        kernel.recipe
                    );
                }
                args.push(format!(
                    "--with-payload={}",
                    kernel.image_for(self.target).display()
                ));
            }
        }

        Ok(args)
    }
}

impl Recipe for BblRecipe {
    fn name(&self) -> String {
        format!("{}-{}", self.variant.target, self.target.generic_suffix())
    }

    fn dependencies(&self) -> Vec<String> {
        match &self.variant.payload {
            PayloadBinding::None => Vec::new(),
            PayloadBinding::Kernel(kernel) => {
                vec![format!("{}-{}", kernel.recipe, self.target.generic_suffix())]
            }
        }
    }

    fn plan(&self, config: &SdkConfig) -> Result<Plan> {
        let variant = &self.variant;
        let source_dir = config.source_root.join(SOURCE_DIR_NAME);
        let build_dir = variant.build_dir(config, self.target);
        let install_dir = variant.install_dir(config, self.target);

        let mut plan = Plan::new(self.name(), &source_dir, &build_dir, &install_dir);
        plan.repository = Some(BBL_REPOSITORY);
        plan.lock_dir = config.build_root.clone();
        if let PayloadBinding::Kernel(kernel) = &variant.payload {
            plan.required_inputs.push(kernel.image_for(self.target));
        }

        let flags = self.compiler_flags(config);
        let tool_env = toolchain::binutils_env(config);
        let mut configure_env = toolchain::compiler_env(config, &flags);
        configure_env.extend(tool_env.iter().cloned());

        plan.push(Phase::Configure, Op::MakeDir(build_dir.clone()));
        plan.push(
            Phase::Configure,
            Op::Configure {
                script: source_dir.join("configure"),
                args: self.configure_args(config)?,
                env: configure_env,
                cwd: build_dir.clone(),
            },
        );

        // The objcopy flags BBL uses need GNU objcopy unless the tools are
        // overridden on the make command line too.
        let mut make_args = vec![config.make_j_flag()];
        make_args.extend(tool_env.iter().map(|(k, v)| format!("{k}={v}")));
        plan.push(
            Phase::Compile,
            Op::Make {
                program: toolchain::gnu_make().to_string(),
                args: make_args,
                target: MAKE_TARGET.to_string(),
                cwd: build_dir.clone(),
                log_name: None,
            },
        );

        let installed = install_dir.join(ARTIFACT_NAME);
        plan.push(
            Phase::Install,
            Op::InstallFile {
                src: build_dir.join(ARTIFACT_NAME),
                dst: installed.clone(),
            },
        );

        if variant.installs_qemu_firmware(self.target) {
            let qemu_fw_dir = config.qemu_install_dir.join("share").join("qemu");
            let firmware = qemu_fw_dir.join(QEMU_FIRMWARE_NAME);
            plan.push(Phase::Install, Op::MakeDir(qemu_fw_dir));
            plan.push(
                Phase::Install,
                Op::Run {
                    program: toolchain::sdk_tool(config, "llvm-objcopy"),
                    args: vec![
                        "-S".to_string(),
                        "-O".to_string(),
                        "binary".to_string(),
                        installed.display().to_string(),
                        firmware.display().to_string(),
                    ],
                    cwd: None,
                    outputs: vec![firmware],
                },
            );
        }

        Ok(plan)
    }
}

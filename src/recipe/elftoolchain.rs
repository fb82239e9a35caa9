//! elftoolchain recipe.
//!
//! Builds the libraries `brandelf` needs plus `brandelf` itself, in-tree,
//! with BSD make. `make install` wants root, so the binary is linked
//! statically and copied into the SDK instead.

use anyhow::Result;

use crate::config::SdkConfig;
use crate::plan::{Op, Phase, Plan, Recipe, SourceRepository};
use crate::toolchain;

pub const ELFTOOLCHAIN_REPOSITORY: SourceRepository = SourceRepository {
    url: "https://github.com/emaste/elftoolchain.git",
    branch: "master",
};

pub const TARGET_NAME: &str = "elftoolchain";
const SOURCE_DIR_NAME: &str = "elftoolchain";

/// Subdirectories built, in dependency order.
pub const SUBDIRS: &[&str] = &["common", "libelf", "libelftc", "brandelf"];

/// Make variables passed to every sub-build.
const COMMON_MAKE_ARGS: &[&str] = &["WITH_TESTS=no", "LDSTATIC=-static"];

#[derive(Debug, Clone, Default)]
pub struct ElfToolchainRecipe;

impl ElfToolchainRecipe {
    pub fn new() -> Self {
        Self
    }
}

impl Recipe for ElfToolchainRecipe {
    fn name(&self) -> String {
        TARGET_NAME.to_string()
    }

    fn plan(&self, config: &SdkConfig) -> Result<Plan> {
        let source_dir = config.source_root.join(SOURCE_DIR_NAME);
        // Builds in the source tree.
        let mut plan = Plan::new(self.name(), &source_dir, &source_dir, &config.sdk_dir);
        plan.repository = Some(ELFTOOLCHAIN_REPOSITORY);
        // Keep the lock out of the git checkout.
        plan.lock_dir = config.build_root.clone();

        let mut make_args: Vec<String> = COMMON_MAKE_ARGS.iter().map(|a| a.to_string()).collect();
        make_args.push(config.make_j_flag());

        for subdir in SUBDIRS {
            plan.push(
                Phase::Compile,
                Op::Make {
                    program: toolchain::bsd_make().to_string(),
                    args: make_args.clone(),
                    target: "all".to_string(),
                    cwd: source_dir.join(subdir),
                    log_name: Some(format!("build.{subdir}")),
                },
            );
        }

        plan.push(
            Phase::Install,
            Op::InstallFile {
                src: source_dir.join("brandelf").join("brandelf"),
                dst: config.sdk_bindir().join("brandelf"),
            },
        );

        Ok(plan)
    }
}

//! Recipe registry.
//!
//! Maps target names to recipes. Each BBL variant is reachable by its bare
//! name (first supported target) and by `<variant>-<target suffix>`, e.g.
//! `bbl-gfe-baremetal-riscv64`.

pub mod bbl;
pub mod elftoolchain;

use anyhow::{bail, Result};

use crate::config::SdkConfig;
use crate::plan::Recipe;
use crate::target::CompilationTarget;
use bbl::{BblRecipe, BblVariant};
use elftoolchain::ElfToolchainRecipe;

#[derive(Debug, Clone)]
pub struct Registry {
    bbl_variants: Vec<BblVariant>,
}

impl Registry {
    /// Built-in recipes plus the BBL variants declared in `config`.
    pub fn new(config: &SdkConfig) -> Result<Self> {
        let mut bbl_variants = BblVariant::builtin();
        for decl in &config.bbl_variants {
            let variant = BblVariant::from_decl(decl)?;
            if variant.target == elftoolchain::TARGET_NAME
                || bbl_variants.iter().any(|v| v.target == variant.target)
            {
                bail!("bbl_variant '{}' is already defined", variant.target);
            }
            bbl_variants.push(variant);
        }
        Ok(Self { bbl_variants })
    }

    pub fn bbl_variants(&self) -> &[BblVariant] {
        &self.bbl_variants
    }

    /// Every addressable target name, bare names first.
    pub fn target_names(&self) -> Vec<String> {
        let mut names = vec![elftoolchain::TARGET_NAME.to_string()];
        names.extend(self.bbl_variants.iter().map(|v| v.target.clone()));
        for variant in &self.bbl_variants {
            names.extend(
                variant
                    .supported_targets
                    .iter()
                    .map(|t| format!("{}-{}", variant.target, t.generic_suffix())),
            );
        }
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Box<dyn Recipe>> {
        if name == elftoolchain::TARGET_NAME {
            return Ok(Box::new(ElfToolchainRecipe::new()));
        }

        if let Some(variant) = self.bbl_variants.iter().find(|v| v.target == name) {
            let Some(target) = variant.default_target() else {
                bail!("{} has no supported targets", variant.target);
            };
            return Ok(Box::new(BblRecipe::new(variant.clone(), target)?));
        }

        for variant in &self.bbl_variants {
            let Some(suffix) = name
                .strip_prefix(variant.target.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
            else {
                continue;
            };
            let Ok(target) = CompilationTarget::from_suffix(suffix) else {
                continue;
            };
            return Ok(Box::new(BblRecipe::new(variant.clone(), target)?));
        }

        bail!(
            "unknown target '{}'; available targets:\n  {}",
            name,
            self.target_names().join("\n  ")
        )
    }
}

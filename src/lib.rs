//! Cross-build recipes for CHERI/RISC-V bare-metal components.
//!
//! This crate builds two third-party components with their native
//! `configure`/`make` build systems and installs the results into an SDK tree:
//!
//! - **BBL** - the RISC-V Berkeley Boot Loader, in several firmware variants
//! - **elftoolchain** - only `brandelf` is installed
//!
//! # Architecture
//!
//! ```text
//! SdkConfig ──────────┐  (explicit paths, build type, extra variants)
//!                     │
//! Registry ── resolve(name) ──> Box<dyn Recipe>
//!                     │               │
//!                     │        BblRecipe(BblVariant, CompilationTarget)
//!                     │        ElfToolchainRecipe
//!                     │               │
//!                     └──────> recipe.plan(&config) ──> Plan [Op; phase]
//!                                                        │
//!                                       executor::execute_plan
//! ```
//!
//! Variant differences (memory start, payload, directory suffix) are data in
//! [`recipe::bbl::BblVariant`], not separate types.
//!
//! # Example
//!
//! ```rust
//! use cheri_crossbuild::{Recipe, Registry, SdkConfig};
//! use std::path::Path;
//!
//! let config = SdkConfig::with_root(Path::new("/home/me/cheri"));
//! let registry = Registry::new(&config).unwrap();
//! let plan = registry.resolve("bbl-gfe").unwrap().plan(&config).unwrap();
//! assert_eq!(plan.target, "bbl-gfe-baremetal-riscv64-purecap");
//! ```

pub mod config;
pub mod executor;
pub mod plan;
pub mod preflight;
pub mod process;
pub mod recipe;
pub mod target;
pub mod toolchain;

pub use config::{BuildType, SdkConfig};
pub use executor::{execute_plan, ExecOptions};
pub use plan::{Op, Phase, Plan, Recipe};
pub use recipe::Registry;
pub use target::CompilationTarget;

//! Declarative build plans.
//!
//! A recipe describes WHAT has to happen to build and install its component
//! as a [`Plan`]: an ordered list of [`Op`]s, each tagged with the [`Phase`]
//! it belongs to. The executor interprets plans; recipes never spawn
//! processes themselves.
//!
//! # Example
//!
//! ```rust
//! use cheri_crossbuild::plan::{Op, Phase, Plan};
//!
//! let mut plan = Plan::new("demo", "/src/demo", "/build/demo", "/sdk");
//! plan.push(Phase::Configure, Op::MakeDir("/build/demo".into()));
//! plan.push(
//!     Phase::Install,
//!     Op::InstallFile {
//!         src: "/build/demo/demo".into(),
//!         dst: "/sdk/bin/demo".into(),
//!     },
//! );
//! assert_eq!(plan.ops(Phase::Install).count(), 1);
//! ```

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

use crate::config::SdkConfig;

/// Anything that can be turned into a build plan.
pub trait Recipe {
    /// Full target name, including the target suffix where there is one.
    fn name(&self) -> String;

    /// Targets that must be built before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the plan for the given SDK layout.
    ///
    /// Fails if the recipe's configuration is inconsistent; no command has
    /// been run at that point.
    fn plan(&self, config: &SdkConfig) -> Result<Plan>;
}

/// Build phases, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Create directories, run `configure`.
    Configure = 1,
    /// Run the native build.
    Compile = 2,
    /// Copy artifacts into the install tree.
    Install = 3,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Configure, Phase::Compile, Phase::Install];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Configure => write!(f, "configure"),
            Phase::Compile => write!(f, "compile"),
            Phase::Install => write!(f, "install"),
        }
    }
}

/// A single operation in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a directory (uses create_dir_all).
    MakeDir(PathBuf),

    /// Run a `configure` script in `cwd` with extra environment.
    Configure {
        script: PathBuf,
        args: Vec<String>,
        env: Vec<(String, String)>,
        cwd: PathBuf,
    },

    /// Run `program` (make, bmake, ...) with `args` then `target` in `cwd`.
    ///
    /// With `log_name`, output goes to `<cwd>/<log_name>.log`.
    Make {
        program: String,
        args: Vec<String>,
        target: String,
        cwd: PathBuf,
        log_name: Option<String>,
    },

    /// Copy a file, creating parent directories and replacing any existing file.
    InstallFile { src: PathBuf, dst: PathBuf },

    /// Run an arbitrary tool.
    ///
    /// `outputs` lists the files the tool writes; in the install phase they
    /// count as installed.
    Run {
        program: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        outputs: Vec<PathBuf>,
    },
}

/// Git repository a recipe builds from. Only used for error hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRepository {
    pub url: &'static str,
    pub branch: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub phase: Phase,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Target name the plan builds.
    pub target: String,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Holds the per-target build lock. Defaults to `build_dir`.
    pub lock_dir: PathBuf,
    /// Root of everything the plan installs; the install manifest goes here.
    pub install_root: PathBuf,
    pub repository: Option<SourceRepository>,
    /// Files produced elsewhere that must exist before the plan runs.
    pub required_inputs: Vec<PathBuf>,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(
        target: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        let build_dir = build_dir.into();
        Self {
            target: target.into(),
            source_dir: source_dir.into(),
            lock_dir: build_dir.clone(),
            build_dir,
            install_root: install_root.into(),
            repository: None,
            required_inputs: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, phase: Phase, op: Op) {
        self.steps.push(Step { phase, op });
    }

    /// Operations of one phase, in plan order.
    pub fn ops(&self, phase: Phase) -> impl Iterator<Item = &Op> {
        self.steps
            .iter()
            .filter(move |s| s.phase == phase)
            .map(|s| &s.op)
    }

    /// Destinations of every [`Op::InstallFile`] and the outputs of
    /// install-phase [`Op::Run`]s.
    pub fn installed_files(&self) -> Vec<PathBuf> {
        self.ops(Phase::Install)
            .flat_map(|op| match op {
                Op::InstallFile { dst, .. } => vec![dst.clone()],
                Op::Run { outputs, .. } => outputs.clone(),
                _ => Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(Phase::Configure < Phase::Compile);
        assert!(Phase::Compile < Phase::Install);
        assert_eq!(Phase::ALL.len(), 3);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Configure.to_string(), "configure");
        assert_eq!(Phase::Compile.to_string(), "compile");
        assert_eq!(Phase::Install.to_string(), "install");
    }

    #[test]
    fn test_ops_filters_by_phase_in_order() {
        let mut plan = Plan::new("t", "/s", "/b", "/i");
        plan.push(Phase::Compile, Op::MakeDir("/b/one".into()));
        plan.push(Phase::Configure, Op::MakeDir("/b".into()));
        plan.push(Phase::Compile, Op::MakeDir("/b/two".into()));

        let compile: Vec<_> = plan.ops(Phase::Compile).collect();
        assert_eq!(
            compile,
            vec![
                &Op::MakeDir("/b/one".into()),
                &Op::MakeDir("/b/two".into())
            ]
        );
        assert_eq!(plan.ops(Phase::Install).count(), 0);
    }

    #[test]
    fn test_installed_files() {
        let mut plan = Plan::new("t", "/s", "/b", "/i");
        plan.push(
            Phase::Install,
            Op::InstallFile {
                src: "/b/x".into(),
                dst: "/i/bin/x".into(),
            },
        );
        plan.push(
            Phase::Install,
            Op::Run {
                program: "/i/bin/tool".into(),
                args: vec![],
                cwd: None,
                outputs: vec![],
            },
        );
        plan.push(
            Phase::Install,
            Op::Run {
                program: "/i/bin/objcopy".into(),
                args: vec!["/i/bin/x".into(), "/i/share/x.bin".into()],
                cwd: None,
                outputs: vec!["/i/share/x.bin".into()],
            },
        );
        plan.push(
            Phase::Compile,
            Op::Run {
                program: "sh".into(),
                args: vec![],
                cwd: None,
                outputs: vec!["/b/x".into()],
            },
        );
        assert_eq!(
            plan.installed_files(),
            vec![PathBuf::from("/i/bin/x"), PathBuf::from("/i/share/x.bin")]
        );
        assert_eq!(plan.lock_dir, PathBuf::from("/b"));
    }

    #[test]
    fn test_recipe_trait_implementation() {
        struct TestRecipe;

        impl Recipe for TestRecipe {
            fn name(&self) -> String {
                "test-recipe".to_string()
            }

            fn plan(&self, config: &SdkConfig) -> Result<Plan> {
                let mut plan = Plan::new(
                    self.name(),
                    config.source_root.join("test"),
                    config.build_root.join("test-build"),
                    &config.sdk_dir,
                );
                plan.push(Phase::Configure, Op::MakeDir(plan.build_dir.clone()));
                Ok(plan)
            }
        }

        let config = SdkConfig::with_root(std::path::Path::new("/w"));
        let recipe = TestRecipe;
        assert!(recipe.dependencies().is_empty());
        let plan = recipe.plan(&config).unwrap();
        assert_eq!(plan.target, "test-recipe");
        assert_eq!(plan.steps.len(), 1);
    }
}

//! Plan executor - interprets Op variants and performs the actual work.
//!
//! Plans run phase by phase. Before anything runs, the source tree and every
//! required input must exist and the build directory is locked. After the
//! install phase an install manifest is written.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cheri_crossbuild::executor::{execute_plan, ExecOptions};
//!
//! let plan = recipe.plan(&config)?;
//! execute_plan(&plan, &ExecOptions { pretend: true })?;
//! ```

pub mod files;
pub mod lock;
pub mod manifest;

use anyhow::{bail, Context, Result};

use crate::plan::{Op, Phase, Plan};
use crate::process::Cmd;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Print what would run without touching the filesystem.
    pub pretend: bool,
}

/// The external command an op runs, if any.
pub fn op_command(op: &Op) -> Option<Cmd> {
    match op {
        Op::MakeDir(_) | Op::InstallFile { .. } => None,
        Op::Configure {
            script,
            args,
            env,
            cwd,
        } => Some(
            Cmd::new(script)
                .args(args)
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .dir(cwd)
                .error_msg(format!("configure failed in {}", cwd.display())),
        ),
        Op::Make {
            program,
            args,
            target,
            cwd,
            log_name,
        } => {
            let mut cmd = Cmd::new(program)
                .args(args)
                .arg(target)
                .dir(cwd)
                .error_msg(format!("{} {} failed in {}", program, target, cwd.display()));
            if let Some(log) = log_name {
                cmd = cmd.log_to(cwd.join(format!("{log}.log")));
            }
            Some(cmd)
        }
        Op::Run { program, args, cwd, .. } => {
            let mut cmd = Cmd::new(program).args(args);
            if let Some(cwd) = cwd {
                cmd = cmd.dir(cwd);
            }
            Some(cmd)
        }
    }
}

/// One-line description for progress output.
pub fn describe_op(op: &Op) -> String {
    match op {
        Op::MakeDir(path) => format!("mkdir -p {}", path.display()),
        Op::InstallFile { src, dst } => {
            format!("install {} -> {}", src.display(), dst.display())
        }
        other => op_command(other)
            .map(|cmd| cmd.display())
            .unwrap_or_default(),
    }
}

/// Execute a single operation.
pub fn execute_op(op: &Op) -> Result<()> {
    match op {
        Op::MakeDir(path) => files::handle_make_dir(path),
        Op::InstallFile { src, dst } => files::handle_install_file(src, dst),
        other => match op_command(other) {
            Some(cmd) => cmd.run_interactive(),
            None => Ok(()),
        },
    }
}

/// Check that everything the plan reads from outside exists.
pub fn check_plan_inputs(plan: &Plan) -> Result<()> {
    if !plan.source_dir.is_dir() {
        let hint = plan
            .repository
            .map(|repo| {
                format!(
                    "\nClone it with: git clone -b {} {} {}",
                    repo.branch,
                    repo.url,
                    plan.source_dir.display()
                )
            })
            .unwrap_or_default();
        bail!(
            "Source for {} not found at {}{}",
            plan.target,
            plan.source_dir.display(),
            hint
        );
    }

    let missing: Vec<_> = plan
        .required_inputs
        .iter()
        .filter(|p| !p.exists())
        .map(|p| format!("  {}", p.display()))
        .collect();
    if !missing.is_empty() {
        bail!(
            "Missing inputs for {} (build its dependencies first):\n{}",
            plan.target,
            missing.join("\n")
        );
    }
    Ok(())
}

/// Run every phase of `plan`.
pub fn execute_plan(plan: &Plan, options: &ExecOptions) -> Result<()> {
    println!("Building {}...", plan.target);

    if options.pretend {
        for phase in Phase::ALL {
            for op in plan.ops(phase) {
                println!("  [{}] {}", phase, describe_op(op));
            }
        }
        return Ok(());
    }

    check_plan_inputs(plan)?;
    let _lock = lock::acquire(&plan.lock_dir, &plan.target)?;

    for phase in Phase::ALL {
        for op in plan.ops(phase) {
            println!("  [{}] {}", phase, describe_op(op));
            execute_op(op).with_context(|| format!("{} {} phase", plan.target, phase))?;
        }
    }

    let installed = plan.installed_files();
    if !installed.is_empty() {
        let path = manifest::write_manifest(&plan.install_root, &plan.target, &installed)?;
        println!("  Wrote {}", path.display());
    }

    println!("  {} done", plan.target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SourceRepository;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A plan whose "build" writes an artifact with sh, then installs it.
    fn shell_plan(temp: &TempDir) -> Plan {
        let root = temp.path();
        let source = root.join("src");
        let build = root.join("build");
        let install = root.join("sdk");
        fs::create_dir_all(&source).unwrap();

        let mut plan = Plan::new("demo", &source, &build, &install);
        plan.push(Phase::Configure, Op::MakeDir(build.clone()));
        plan.push(
            Phase::Compile,
            Op::Run {
                program: PathBuf::from("sh"),
                args: vec!["-c".into(), "printf artifact > demo".into()],
                cwd: Some(build.clone()),
                outputs: vec![],
            },
        );
        plan.push(
            Phase::Install,
            Op::InstallFile {
                src: build.join("demo"),
                dst: install.join("bin/demo"),
            },
        );
        plan
    }

    #[test]
    fn test_execute_plan_installs_and_writes_manifest() {
        let temp = TempDir::new().unwrap();
        let plan = shell_plan(&temp);
        execute_plan(&plan, &ExecOptions::default()).unwrap();

        let installed = temp.path().join("sdk/bin/demo");
        assert_eq!(fs::read_to_string(&installed).unwrap(), "artifact");

        let manifest =
            manifest::read_manifest(&manifest::manifest_path(&plan.install_root, "demo"))
                .unwrap();
        assert_eq!(manifest.files[0].path, installed);
    }

    #[test]
    fn test_pretend_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let plan = shell_plan(&temp);
        execute_plan(&plan, &ExecOptions { pretend: true }).unwrap();
        assert!(!temp.path().join("build").exists());
        assert!(!temp.path().join("sdk").exists());
    }

    #[test]
    fn test_failing_step_aborts_plan() {
        let temp = TempDir::new().unwrap();
        let mut plan = shell_plan(&temp);
        plan.steps.insert(
            1,
            crate::plan::Step {
                phase: Phase::Compile,
                op: Op::Run {
                    program: PathBuf::from("false"),
                    args: vec![],
                    cwd: None,
                    outputs: vec![],
                },
            },
        );
        let err = execute_plan(&plan, &ExecOptions::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("demo compile phase"));
        assert!(!temp.path().join("sdk/bin/demo").exists());
    }

    #[test]
    fn test_missing_source_hints_clone() {
        let temp = TempDir::new().unwrap();
        let mut plan = Plan::new(
            "bbl-baremetal-riscv64",
            temp.path().join("riscv-pk"),
            temp.path().join("build"),
            temp.path().join("sdk"),
        );
        plan.repository = Some(SourceRepository {
            url: "https://github.com/CTSRD-CHERI/riscv-pk",
            branch: "cheri_purecap",
        });
        let err = check_plan_inputs(&plan).unwrap_err().to_string();
        assert!(err.contains("git clone -b cheri_purecap https://github.com/CTSRD-CHERI/riscv-pk"));
    }

    #[test]
    fn test_missing_required_input() {
        let temp = TempDir::new().unwrap();
        let mut plan = shell_plan(&temp);
        plan.required_inputs.push(temp.path().join("kernel"));
        let err = execute_plan(&plan, &ExecOptions::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("Missing inputs for demo"));
        assert!(!temp.path().join("build").exists());
    }

    #[test]
    fn test_failing_make_reports_stderr() {
        let temp = TempDir::new().unwrap();
        let op = Op::Make {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo 'bbl.c:12: error: boom' >&2; exit 2".into(),
            ],
            target: "bbl".into(),
            cwd: temp.path().to_path_buf(),
            log_name: None,
        };
        let err = execute_op(&op).unwrap_err().to_string();
        assert!(err.starts_with("sh bbl failed in"));
        assert!(err.contains("Exit code: 2"));
        assert!(err.contains("stderr:\n    bbl.c:12: error: boom"));
    }

    #[test]
    fn test_in_tree_build_keeps_lock_out_of_source() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("elftoolchain");
        let build_root = temp.path().join("build");
        fs::create_dir_all(&source).unwrap();

        let mut plan = Plan::new("elftoolchain", &source, &source, temp.path().join("sdk"));
        plan.lock_dir = build_root.clone();
        plan.push(
            Phase::Compile,
            Op::Run {
                program: PathBuf::from("sh"),
                args: vec!["-c".into(), "ls -A > listing".into()],
                cwd: Some(source.clone()),
                outputs: vec![],
            },
        );
        execute_plan(&plan, &ExecOptions::default()).unwrap();

        assert_eq!(
            fs::read_to_string(source.join("listing")).unwrap().trim(),
            "listing"
        );
        assert!(fs::read_dir(&source)
            .unwrap()
            .all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".lock")));
        assert!(lock::lock_path(&build_root, "elftoolchain").exists());
    }

    #[test]
    fn test_manifest_records_run_outputs() {
        let temp = TempDir::new().unwrap();
        let mut plan = shell_plan(&temp);
        let firmware = temp.path().join("sdk/share/qemu/demo.bin");
        plan.push(
            Phase::Install,
            Op::MakeDir(temp.path().join("sdk/share/qemu")),
        );
        plan.push(
            Phase::Install,
            Op::Run {
                program: PathBuf::from("cp"),
                args: vec![
                    temp.path().join("sdk/bin/demo").display().to_string(),
                    firmware.display().to_string(),
                ],
                cwd: None,
                outputs: vec![firmware.clone()],
            },
        );
        execute_plan(&plan, &ExecOptions::default()).unwrap();

        let manifest =
            manifest::read_manifest(&manifest::manifest_path(&plan.install_root, "demo"))
                .unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![temp.path().join("sdk/bin/demo"), firmware]);
        assert_eq!(manifest.files[1].sha256, manifest.files[0].sha256);
    }

    #[test]
    fn test_make_op_command() {
        let op = Op::Make {
            program: "bmake".into(),
            args: vec!["WITH_TESTS=no".into(), "-j4".into()],
            target: "all".into(),
            cwd: PathBuf::from("/src/elftoolchain/libelf"),
            log_name: Some("build.libelf".into()),
        };
        assert_eq!(describe_op(&op), "bmake WITH_TESTS=no -j4 all");
    }

    #[test]
    fn test_make_logs_to_file() {
        let temp = TempDir::new().unwrap();
        let op = Op::Make {
            program: "sh".into(),
            args: vec!["-c".into(), "echo \"target=$0\"".into()],
            target: "all".into(),
            cwd: temp.path().to_path_buf(),
            log_name: Some("build.common".into()),
        };
        execute_op(&op).unwrap();
        let log = fs::read_to_string(temp.path().join("build.common.log")).unwrap();
        assert_eq!(log.trim(), "target=all");
    }

    #[test]
    fn test_configure_op_runs_with_env() {
        let temp = TempDir::new().unwrap();
        let op = Op::Configure {
            script: PathBuf::from("sh"),
            args: vec!["-c".into(), "printf %s \"$CC\" > configured".into()],
            env: vec![("CC".into(), "/sdk/bin/clang".into())],
            cwd: temp.path().to_path_buf(),
        };
        execute_op(&op).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("configured")).unwrap(),
            "/sdk/bin/clang"
        );
        assert!(describe_op(&op).starts_with("CC=/sdk/bin/clang sh -c "));
    }
}

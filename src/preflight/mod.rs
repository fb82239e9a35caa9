//! Preflight checks for build validation.
//!
//! Validates that the host has the make flavours the plans call and that the
//! SDK provides the cross tools, before any recipe starts building. This
//! prevents cryptic errors half-way through a configure run.
//!
//! # Example
//!
//! ```rust
//! use cheri_crossbuild::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("bmake") {
//!     println!("bmake not installed");
//! }
//!
//! let tools = &[("sh", "coreutils")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::config::SdkConfig;
use crate::plan::{Op, Plan};
use crate::toolchain::{self, REQUIRED_SDK_TOOLS};

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Package that provides a make flavour, for install hints.
fn package_for(tool: &str) -> &'static str {
    match tool {
        "bmake" => "bmake",
        "gmake" | "make" => "make",
        _ => "unknown",
    }
}

/// Host tools `plan` runs by name rather than by path.
pub fn plan_host_tools(plan: &Plan) -> Vec<(String, &'static str)> {
    let mut tools: Vec<(String, &'static str)> = Vec::new();
    for step in &plan.steps {
        if let Op::Make { program, .. } = &step.op {
            if !tools.iter().any(|(t, _)| t == program) {
                tools.push((program.clone(), package_for(program)));
            }
        }
    }
    tools
}

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check that the SDK bin directory holds the cross tools.
pub fn check_sdk_tools(config: &SdkConfig) -> Result<()> {
    let missing = REQUIRED_SDK_TOOLS
        .iter()
        .map(|tool| toolchain::sdk_tool(config, tool))
        .filter(|path| !path.is_file())
        .map(|path| format!("  {}", path.display()))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        bail!(
            "Missing SDK tools (build the LLVM toolchain into {} first):\n{}",
            config.sdk_bindir().display(),
            missing.join("\n")
        );
    }
    Ok(())
}

/// Whether some plan cross-compiles, i.e. has a `configure` step or runs an
/// SDK tool.
pub fn needs_sdk_tools(plans: &[Plan], config: &SdkConfig) -> bool {
    let bindir = config.sdk_bindir();
    plans.iter().flat_map(|p| &p.steps).any(|s| match &s.op {
        Op::Configure { .. } => true,
        Op::Run { program, .. } => program.starts_with(&bindir),
        _ => false,
    })
}

/// Check host and SDK tools for a set of plans.
pub fn check_plans(plans: &[Plan], config: &SdkConfig) -> Result<()> {
    let mut host = Vec::new();
    for plan in plans {
        for tool in plan_host_tools(plan) {
            if !host.contains(&tool) {
                host.push(tool);
            }
        }
    }
    let host_refs: Vec<(&str, &str)> = host.iter().map(|(t, p)| (t.as_str(), *p)).collect();
    check_required_tools(&host_refs)?;

    if needs_sdk_tools(plans, config) {
        check_sdk_tools(config)?;
    }
    Ok(())
}

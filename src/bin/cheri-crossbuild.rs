use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cheri_crossbuild::preflight;
use cheri_crossbuild::{execute_plan, ExecOptions, Plan, Registry, SdkConfig};

fn usage() -> &'static str {
    "Usage:\n  cheri-crossbuild [--config <file>] list\n  cheri-crossbuild [--config <file>] plan <target>...\n  cheri-crossbuild [--config <file>] build [--pretend] <target>...\n  cheri-crossbuild [--config <file>] preflight <target>..."
}

struct GlobalArgs {
    config: Option<PathBuf>,
    pretend: bool,
    rest: Vec<String>,
}

fn parse_global_args(args: Vec<String>) -> Result<GlobalArgs> {
    let mut parsed = GlobalArgs {
        config: None,
        pretend: false,
        rest: Vec::new(),
    };
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = iter.next() else {
                    bail!("--config needs a file argument\n{}", usage());
                };
                parsed.config = Some(PathBuf::from(path));
            }
            "--pretend" | "-p" => parsed.pretend = true,
            "--help" | "-h" => bail!(usage()),
            other if other.starts_with('-') => {
                bail!("unknown option '{}'\n{}", other, usage())
            }
            _ => parsed.rest.push(arg),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    let args = parse_global_args(std::env::args().skip(1).collect())?;
    let config = SdkConfig::load(args.config.as_deref()).context("loading configuration")?;
    let registry = Registry::new(&config).context("registering recipes")?;

    match args.rest.as_slice() {
        [list] if list == "list" => {
            for name in registry.target_names() {
                println!("{name}");
            }
            Ok(())
        }
        [plan, targets @ ..] if plan == "plan" && !targets.is_empty() => {
            for (name, deps, plan) in resolve_plans(&registry, &config, targets)? {
                print_plan(&name, &deps, &plan);
            }
            Ok(())
        }
        [build, targets @ ..] if build == "build" && !targets.is_empty() => {
            let plans: Vec<Plan> = resolve_plans(&registry, &config, targets)?
                .into_iter()
                .map(|(_, _, plan)| plan)
                .collect();
            if !args.pretend {
                preflight::check_plans(&plans, &config).context("preflight failed")?;
            }
            let options = ExecOptions {
                pretend: args.pretend,
            };
            for plan in &plans {
                execute_plan(plan, &options)
                    .with_context(|| format!("building '{}'", plan.target))?;
            }
            Ok(())
        }
        [check, targets @ ..] if check == "preflight" && !targets.is_empty() => {
            let plans: Vec<Plan> = resolve_plans(&registry, &config, targets)?
                .into_iter()
                .map(|(_, _, plan)| plan)
                .collect();
            preflight::check_plans(&plans, &config)?;
            println!("All required tools found");
            Ok(())
        }
        _ => bail!(usage()),
    }
}

fn resolve_plans(
    registry: &Registry,
    config: &SdkConfig,
    targets: &[String],
) -> Result<Vec<(String, Vec<String>, Plan)>> {
    targets
        .iter()
        .map(|name| {
            let recipe = registry.resolve(name)?;
            let plan = recipe
                .plan(config)
                .with_context(|| format!("planning '{}'", recipe.name()))?;
            Ok((recipe.name(), recipe.dependencies(), plan))
        })
        .collect()
}

fn print_plan(name: &str, deps: &[String], plan: &Plan) {
    println!("{name}");
    println!("  source:  {}", plan.source_dir.display());
    println!("  build:   {}", plan.build_dir.display());
    println!("  install: {}", plan.install_root.display());
    if !deps.is_empty() {
        println!("  depends: {}", deps.join(", "));
    }
    for phase in cheri_crossbuild::Phase::ALL {
        for op in plan.ops(phase) {
            println!(
                "  [{}] {}",
                phase,
                cheri_crossbuild::executor::describe_op(op)
            );
        }
    }
}

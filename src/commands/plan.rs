use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{Action, ResourceKind};
use serde_json::Value;
use std::fs;

use crate::Context;
use crate::cli::PlanArgs;
use crate::commands::{api_key, ignore_load_failure, stack_store};
use crate::manifest::Manifest;
use crate::provider::{CloudSnapshot, MemoryCloud};
use crate::stack::StackCoordinator;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let environment = args.target.env.resolve().context("Invalid environment")?;
    let manifest = Manifest::load(&args.target.manifest)?;

    let snapshot: CloudSnapshot = match &args.snapshot {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid snapshot: {}", path.display()))?
        }
        None => CloudSnapshot::default(),
    };
    let cloud = MemoryCloud::from_snapshot(&environment.account_id, &environment.region, snapshot);

    let store = if args.persist {
        Some(stack_store(&manifest, args.state_dir.as_deref())?)
    } else {
        None
    };

    let mut coordinator = StackCoordinator::new(
        manifest.stack_options(api_key(&manifest)),
        environment.clone(),
        &cloud,
        &cloud,
    );
    if let Some(min) = manifest.stack.min_function_tag_upserts {
        coordinator = coordinator.with_min_function_tag_upserts(min);
    }
    if let Some(store) = &store {
        coordinator
            .init(store.as_ref(), ignore_load_failure(&manifest, &environment))
            .context("Failed to load stack")?;
    }

    if !ctx.quiet {
        ui::header(&format!("Plan for {}", coordinator.name()));
    }
    let result = manifest.apply(&mut coordinator);

    let calls = cloud.calls();
    if calls.is_empty() {
        ui::info("No changes needed");
    } else {
        ui::section("Calls");
        for (i, call) in calls.iter().enumerate() {
            ui::step(i + 1, calls.len(), &format!("{} {}", call.operation.bold(), call.target));
        }
    }

    if ctx.verbose > 0 && result.is_ok() {
        ui::section("Roles");
        for role in manifest.role_names() {
            let outcome = coordinator
                .get_action(&Action::key(ResourceKind::Role, role))
                .and_then(|action| action.data.get("outcome"))
                .and_then(Value::as_str)
                .unwrap_or("no recorded action");
            let policies = coordinator.list_all_managed_policies_for_role(role)?;
            let names: Vec<&str> = policies.iter().map(|p| p.policy_name.as_str()).collect();
            ui::kv(role, &format!("{outcome} [{}]", names.join(", ")));
        }
    }

    if ctx.verbose > 0 {
        ui::section("Stack");
        println!("{}", serde_json::to_string_pretty(coordinator.stack())?);
    }

    if let Some(store) = &store {
        coordinator
            .save(store.as_ref())
            .context("Failed to save stack")?;
    }
    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&cloud.snapshot())?;
        fs::write(output, json)
            .with_context(|| format!("Failed to write snapshot: {}", output.display()))?;
        ui::dim(&format!("Snapshot written to {}", output.display()));
    }

    let summary = coordinator.summary();
    println!();
    ui::kv("state", coordinator.state().as_str());
    ui::kv("summary", &ui::summary_line(summary));

    match result {
        Ok(()) => {
            ui::success(&format!("Stack {} converged", coordinator.name()));
            Ok(())
        }
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.kind().advice());
            bail!("Stack {} rolled back", coordinator.name())
        }
    }
}

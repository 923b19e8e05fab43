use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::ManifestArgs;
use crate::manifest::Manifest;
use crate::ui;

pub fn run(ctx: &Context, args: ManifestArgs) -> Result<()> {
    let environment = args.env.resolve().context("Invalid environment")?;
    let manifest = Manifest::load(&args.manifest)?;

    if !ctx.quiet {
        ui::header("Stack Manifest");
        ui::kv("stack", &environment.stack_name(&manifest.stack.name));
        ui::kv("user", &manifest.stack.user);
        ui::kv("region", &environment.region);
        ui::kv("account", &environment.account_id);
        ui::kv(
            "store",
            manifest.stack.store_url.as_deref().unwrap_or("local files"),
        );

        ui::section("Resources");
        ui::kv("roles", &manifest.roles.len().to_string());
        ui::kv("policies", &manifest.policies.len().to_string());
        ui::kv("attachments", &manifest.attachments.len().to_string());
        ui::kv("functions", &manifest.functions.len().to_string());
        ui::kv("lambdas", &manifest.lambdas.len().to_string());
        println!();
    }

    let missing: Vec<_> = manifest
        .functions
        .iter()
        .map(|f| &f.zip_location)
        .chain(manifest.lambdas.iter().map(|l| &l.zip_location))
        .filter(|path| !path.exists())
        .collect();
    for path in &missing {
        ui::warn(&format!("Package not found: {}", path.display()));
    }

    ui::success(&format!(
        "{} is valid ({} resources)",
        args.manifest.display(),
        manifest.resource_count()
    ));
    Ok(())
}

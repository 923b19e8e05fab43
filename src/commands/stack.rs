use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::StackCommand;
use crate::commands::{api_key, stack_store};
use crate::manifest::Manifest;
use crate::ui;

pub fn run(_ctx: &Context, cmd: StackCommand) -> Result<()> {
    match cmd {
        StackCommand::Show { target, state_dir } => {
            let environment = target.env.resolve().context("Invalid environment")?;
            let manifest = Manifest::load(&target.manifest)?;
            let store = stack_store(&manifest, state_dir.as_deref())?;
            let name = environment.stack_name(&manifest.stack.name);

            match store.load(&name, &manifest.stack.user, &api_key(&manifest))? {
                Some(stack) => println!("{}", serde_json::to_string_pretty(&stack)?),
                None => ui::info(&format!("No stack {name} stored for {}", manifest.stack.user)),
            }
            Ok(())
        }
    }
}

//! Tether Runtime
//!
//! Runs one script file inside a bridge Context with a host `console`.

mod console;

use anyhow::{Context as _, Result};
use clap::Parser;
use console::Console;
use std::path::PathBuf;
use std::rc::Rc;
use tether_script::{Context, ContextConfig};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", version, about = "Run a script with host objects bridged in")]
struct Cli {
    /// Script to evaluate
    script: PathBuf,

    /// JSON context configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name reported in script errors (defaults to the script path)
    #[arg(long)]
    file_name: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ContextConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ContextConfig::default(),
    };
    let source = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading {}", cli.script.display()))?;
    let file_name = cli
        .file_name
        .clone()
        .unwrap_or_else(|| cli.script.display().to_string());

    let context = Context::with_config(&config)?;
    context.bind_object("console", Rc::new(Console), &Console::methods())?;
    tracing::info!(context = context.id().0, script = %file_name, "context ready");

    if let Some(debugger) = config.debugger.as_ref().filter(|d| d.wait_on_start) {
        context
            .wait_for_debugger(&debugger.listen)
            .with_context(|| format!("waiting for debugger on {}", debugger.listen))?;
    }

    let result = context.evaluate(&source, &file_name);
    if context.is_debugging() {
        context.cooperate_debugger();
        context.detach_debugger();
    }

    let value = result?;
    if !value.is_null() {
        println!("{}", console::render(&value));
    }
    Ok(())
}

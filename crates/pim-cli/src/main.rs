//! pim - plugin installation manager CLI

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pim_cli::ops::Context;
use pim_cli::ui::{ConsoleReporter, OutputFormat, Tabular, render};
use pim_cli::{Cli, Config, InstallReport, install_plugins};

fn print_section<T: Tabular>(format: OutputFormat, title: &str, items: &[T]) -> Result<()> {
    if format == OutputFormat::Text && !items.is_empty() {
        println!("{title}:");
    }
    print!("{}", render(format, items)?);
    Ok(())
}

fn print_report(config: &Config, report: &InstallReport) -> Result<()> {
    if config.show_plugins {
        print_section(config.output, "Resolved plugins", &report.resolved)?;
    }
    if config.show_available_updates {
        print_section(config.output, "Available updates", &report.available_updates)?;
    }
    if config.show_warnings {
        print_section(config.output, "Security warnings", &report.security_warnings)?;
    }
    if !report.failed.is_empty() {
        print_section(config.output, "Failed plugins", &report.failed)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_cli(cli)?;
    let reporter = Arc::new(ConsoleReporter::new(config.quiet));
    let requested = config.plugins.clone();
    let ctx = Context::new(config, reporter)?;

    let report = install_plugins(&ctx, requested).await?;
    print_report(&ctx.config, &report)?;

    if report.is_success() || ctx.config.skip_failed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

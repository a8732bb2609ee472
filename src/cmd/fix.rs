//! The remediation run: `mend fix`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

use mend::audit::{AgentOutcome, AuditLogger, RemediationRun};
use mend::collab::{CommandBuildRunner, CommandInstaller, GitVersionControl, LocalFileStore};
use mend::config::Config;
use mend::mend_config::{CliOverrides, MendConfig};
use mend::oracle::ClaudeCliOracle;
use mend::orchestrator::Orchestrator;

use super::super::Cli;

pub async fn cmd_fix(cli: &Cli, project_dir: PathBuf, overrides: CliOverrides) -> Result<()> {
    let mend_config = MendConfig::with_cli_args(project_dir, cli.verbose, overrides)?;
    for warning in mend_config.validate() {
        warn!("{}", warning);
    }

    let config = Config::new(mend_config);
    config.ensure_directories()?;
    let ctx = config.project_context()?;
    let settings = config.orchestrator_settings();
    let git_settings = &config.mend_config().toml.git;

    let oracle = Arc::new(ClaudeCliOracle::new(config.claude_cmd.clone()).with_model(config.model.clone()));
    let vcs = GitVersionControl::new(config.project_dir.clone())
        .with_remote(git_settings.remote.clone())
        .with_push(config.mend_config().push())
        .with_author(
            git_settings.author_name.clone(),
            git_settings.author_email.clone(),
        );

    println!();
    println!("{}", console::style("mend").bold().cyan());
    println!("  Project:        {}", config.project_dir.display());
    println!("  Branch:         {}", ctx.branch);
    println!("  Build command:  {}", ctx.build.command);
    println!(
        "  Budget:         {} iteration(s), {} fix(es) per file",
        settings.max_iterations, settings.max_fixes_per_bug
    );
    if let Some(pr) = &ctx.pull_request {
        println!("  Pull request:   #{}", pr.number);
    }
    println!();

    let orchestrator = Orchestrator::new(
        oracle,
        Arc::new(LocalFileStore),
        Arc::new(CommandBuildRunner),
        Arc::new(CommandInstaller),
        Arc::new(vcs),
        settings,
    );

    let logger = AuditLogger::new(&config.mend_dir);
    let run = match orchestrator.run(&ctx).await {
        Ok(run) => run,
        Err(aborted) => {
            error!(error = %aborted.source, "Remediation aborted");
            let run_file = logger.save(&aborted.run)?;
            print_summary(&aborted.run);
            println!("Run recorded at {}", run_file.display());
            println!();
            return Err(aborted.source).context("Remediation aborted");
        }
    };

    let run_file = logger.save(&run)?;

    print_summary(&run);
    println!("Run recorded at {}", run_file.display());
    println!();
    Ok(())
}

fn print_summary(run: &RemediationRun) {
    for iteration in &run.iterations {
        println!(
            "{} {}: {} error(s)",
            console::style("Iteration").bold(),
            iteration.iteration,
            iteration.initial_errors
        );
        if !iteration.packages_installed.is_empty() {
            println!(
                "  {} {}",
                console::style("Installed").green(),
                iteration.packages_installed.join(", ")
            );
        }
        for agent in &iteration.agents {
            let outcome = match &agent.outcome {
                AgentOutcome::BuildFixed => console::style("build fixed".to_string()).green(),
                AgentOutcome::NoCandidates => console::style("no candidates".to_string()).yellow(),
                AgentOutcome::AllCandidatesFailed => {
                    console::style("all candidates failed".to_string()).yellow()
                }
                AgentOutcome::PatchAbandoned { message } => {
                    console::style(format!("patch abandoned: {}", message)).red()
                }
                AgentOutcome::NotAttempted => console::style("not attempted".to_string()).dim(),
            };
            println!(
                "  {:<40} {} ({}/{} candidates tried)",
                agent.file_path, outcome, agent.candidates_tried, agent.candidates_proposed
            );
        }
    }
    println!();

    if run.fixes.is_empty() {
        println!("No fixes applied.");
    } else {
        println!("{}", console::style("Applied fixes:").bold());
        for fix in &run.fixes {
            println!("  - {}", fix);
        }
    }
    println!();

    if let Some(reason) = &run.aborted {
        println!("{} {}", console::style("Aborted:").red().bold(), reason);
    } else if run.build_succeeded {
        println!(
            "{} {} error(s) resolved.",
            console::style("Build is green.").green().bold(),
            run.total_resolved()
        );
    } else {
        println!(
            "{} the build still fails after {} fix(es).",
            console::style("Partial:").yellow().bold(),
            run.fixes.len()
        );
    }
    println!();
}

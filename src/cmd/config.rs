//! Configuration view and validation commands: `mend config`.

use anyhow::Result;
use std::path::Path;

use mend::mend_config::{CONFIG_FILE, MEND_DIR, MendConfig, MendToml};

use super::super::ConfigCommands;

fn print_toml(toml: &MendToml) {
    if toml.project.name.is_some() || toml.project.claude_cmd.is_some() || toml.project.model.is_some()
    {
        println!("[project]");
        if let Some(name) = &toml.project.name {
            println!("  name = \"{}\"", name);
        }
        if let Some(cmd) = &toml.project.claude_cmd {
            println!("  claude_cmd = \"{}\"", cmd);
        }
        if let Some(model) = &toml.project.model {
            println!("  model = \"{}\"", model);
        }
        println!();
    }

    println!("[build]");
    println!("  command = \"{}\"", toml.build.command);
    println!("  install_command = \"{}\"", toml.build.install_command);
    println!();

    println!("[remediation]");
    println!("  max_iterations = {}", toml.remediation.max_iterations);
    println!("  max_fixes_per_bug = {}", toml.remediation.max_fixes_per_bug);
    println!();

    println!("[retry]");
    println!("  max_attempts = {}", toml.retry.max_attempts);
    println!("  initial_delay_ms = {}", toml.retry.initial_delay_ms);
    println!("  max_delay_ms = {}", toml.retry.max_delay_ms);
    println!("  jitter = {}", toml.retry.jitter);
    println!();

    println!("[git]");
    println!("  push = {}", toml.git.push);
    println!("  remote = \"{}\"", toml.git.remote);
    println!(
        "  author = \"{} <{}>\"",
        toml.git.author_name, toml.git.author_email
    );
    println!();

    let hints = &toml.hints;
    if hints.style.is_some()
        || hints.types.is_some()
        || hints.packages.is_some()
        || hints.research_file.is_some()
        || !hints.file_map.is_empty()
    {
        println!("[hints]");
        if let Some(style) = &hints.style {
            println!("  style = \"{}\"", style);
        }
        if let Some(types) = &hints.types {
            println!("  types = \"{}\"", types);
        }
        if let Some(packages) = &hints.packages {
            println!("  packages = \"{}\"", packages);
        }
        if let Some(research) = &hints.research_file {
            println!("  research_file = \"{}\"", research.display());
        }
        if !hints.file_map.is_empty() {
            println!("  file_map = {} entr(ies)", hints.file_map.len());
        }
        println!();
    }
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let mend_dir = project_dir.join(MEND_DIR);
    let config_path = mend_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Mend Configuration");
            println!("==================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&MendToml::load(&config_path)?);
            } else {
                println!("No mend.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                println!();
                print_toml(&MendToml::default());
                println!("Run 'mend config init' to create a mend.toml file.");
                println!();
            }

            println!("Effective values (with env overrides):");
            let config = MendConfig::new(project_dir.to_path_buf())?;
            println!("  claude_cmd = \"{}\"", config.claude_cmd());
            println!("  build_command = \"{}\"", config.build_command());
            if let Some(model) = config.model() {
                println!("  model = \"{}\"", model);
            }
            println!(
                "  github_token = {}",
                if std::env::var("GITHUB_TOKEN").is_ok() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No mend.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = MendToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("mend.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !mend_dir.exists() {
                std::fs::create_dir_all(&mend_dir)?;
            }

            MendToml::default().save(&config_path)?;

            println!("Created mend.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [build] command, install_command");
            println!("  - [remediation] max_iterations, max_fixes_per_bug");
            println!("  - [hints] style, types, packages, research_file, file_map");
            println!();
        }
    }

    Ok(())
}

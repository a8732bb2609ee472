//! Run history: `mend runs`.

use anyhow::Result;
use std::path::Path;

use mend::audit::AuditLogger;
use mend::mend_config::MEND_DIR;

pub fn cmd_runs(project_dir: &Path, limit: usize) -> Result<()> {
    let logger = AuditLogger::new(&project_dir.join(MEND_DIR));
    let runs = logger.list_runs()?;

    println!();
    if runs.is_empty() {
        println!("No remediation runs recorded yet. Run 'mend fix' to start one.");
        println!();
        return Ok(());
    }

    println!(
        "{:<22} {:<10} {:<8} {:<8} {:<9} Branch",
        "Started", "Run", "Iters", "Fixes", "Build"
    );
    println!(
        "{:<22} {:<10} {:<8} {:<8} {:<9} ------",
        "--------------------", "--------", "-----", "-----", "-----"
    );

    for path in runs.iter().take(limit) {
        match logger.load_run(path) {
            Ok(run) => {
                let build = if run.build_succeeded {
                    console::style("green").green()
                } else {
                    console::style("failing").red()
                };
                println!(
                    "{:<22} {:<10} {:<8} {:<8} {:<9} {}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.short_id(),
                    run.iterations.len(),
                    run.fixes.len(),
                    build,
                    run.branch
                );
            }
            Err(e) => {
                println!(
                    "{} {}: {:#}",
                    console::style("Unreadable").yellow(),
                    path.display(),
                    e
                );
            }
        }
    }

    if runs.len() > limit {
        println!();
        println!("({} older run(s) not shown)", runs.len() - limit);
    }
    println!();
    Ok(())
}

//! Reconcile command: finish a native install whose files are still staged.

use console::style;
use std::path::Path;

use ad_core::{Context, Error};
use ad_io::{DirectoryReconciler, FixedPrompt, LockBreaker, Prompt, SystemProcessTable};

use crate::display::ConsolePrompt;

pub fn run(staging: &Path, install_dir: &Path, ctx: &Context, unattended: bool) -> Result<(), Error> {
    if !staging.is_dir() {
        println!(
            "{} Nothing staged in {}",
            style("==>").yellow().bold(),
            staging.display()
        );
        return Ok(());
    }

    let processes = SystemProcessTable::new();
    let prompt: Box<dyn Prompt> = if unattended {
        Box::new(FixedPrompt::unattended())
    } else {
        Box::new(ConsolePrompt::new())
    };
    let locks = LockBreaker::new(&processes, prompt.as_ref())
        .with_settle_delay(ctx.limits.lock_settle_delay);

    let changed = DirectoryReconciler::new(&locks, &ctx.limits).reconcile(staging, install_dir)?;
    if changed {
        println!(
            "{} Moved staged files into {}",
            style("==>").cyan().bold(),
            install_dir.display()
        );
    } else {
        println!("{} Already up to date", style("==>").cyan().bold());
    }
    Ok(())
}

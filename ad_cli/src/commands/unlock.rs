//! Unlock command: release the processes holding files under a path.

use console::style;
use std::path::Path;

use ad_core::Error;
use ad_io::{FixedPrompt, LockBreaker, Prompt, SystemProcessTable};

use crate::display::ConsolePrompt;

pub fn run(path: &Path, force: bool) -> Result<(), Error> {
    let processes = SystemProcessTable::new();
    let prompt: Box<dyn Prompt> = if force {
        Box::new(FixedPrompt::unattended())
    } else {
        Box::new(ConsolePrompt::new())
    };

    let released = LockBreaker::new(&processes, prompt.as_ref()).break_locks(path, force)?;
    if released {
        println!(
            "{} Nothing holds {} anymore",
            style("==>").cyan().bold(),
            path.display()
        );
    } else {
        println!(
            "{} Left {} locked",
            style("==>").yellow().bold(),
            path.display()
        );
    }
    Ok(())
}

//! Install command implementation.

use console::style;
use indicatif::MultiProgress;
use std::path::Path;
use std::time::Instant;
use tracing::warn;

use ad_core::{Context, Error, PackageSpec, SourcesConfig};
use ad_io::{
    Connectivity, FixedPrompt, Platform, Prompt, TcpConnectivity, Transferor, is_reachable,
};

use crate::display::{
    ConsolePrompt, ProgressBars, ProgressStyles, create_progress_callback, finish_progress_bars,
};

/// Downloads repeated after the user chose to retry a checksum mismatch.
const MAX_RETRIES: usize = 3;

/// Run the install command.
pub async fn run(
    package_path: &Path,
    config: &SourcesConfig,
    mut ctx: Context,
    unattended: bool,
    skip_network_check: bool,
) -> Result<(), Error> {
    let package = PackageSpec::load(package_path)?;

    if !skip_network_check {
        let connectivity = TcpConnectivity::new();
        if !is_reachable(&connectivity).await {
            return Err(Error::NetworkFailure {
                message: "no IPv4 or IPv6 connectivity".to_string(),
            });
        }
        ctx.ipv4_available = connectivity.ipv4_available().await;
    }

    println!(
        "{} Installing {}...",
        style("==>").cyan().bold(),
        style(&package.name).bold()
    );
    let start = Instant::now();

    for attempt in 0..=MAX_RETRIES {
        let prompt: Box<dyn Prompt> = if unattended {
            Box::new(FixedPrompt::unattended())
        } else {
            Box::new(ConsolePrompt::new())
        };
        let (callback, bars) =
            create_progress_callback(MultiProgress::new(), ProgressStyles::default());
        let mut transferor = Transferor::new(
            package.clone(),
            config,
            ctx.clone(),
            Platform::system(prompt),
        )
        .with_progress(callback);

        download(&mut transferor, &bars).await?;

        let installed = tokio::task::block_in_place(|| transferor.start_install())?;
        if installed {
            println!(
                "{} Installed {} to {} in {:.2}s",
                style("==>").cyan().bold(),
                style(&package.name).green().bold(),
                package.install_dir.display(),
                start.elapsed().as_secs_f64()
            );
            return Ok(());
        }

        if !transferor.auto_retry() {
            break;
        }
        if attempt < MAX_RETRIES {
            println!(
                "{} Downloading {} again ({}/{})",
                style("==>").cyan().bold(),
                package.name,
                attempt + 1,
                MAX_RETRIES
            );
        }
    }

    println!(
        "{} {} was not installed",
        style("==>").yellow().bold(),
        style(&package.name).bold()
    );
    Ok(())
}

/// Download from the first source that delivers, moving on to the next one
/// whenever a transfer fails.
async fn download(transferor: &mut Transferor, bars: &ProgressBars) -> Result<(), Error> {
    let name = transferor.package().name.clone();
    let tried = transferor.candidates().len();
    if transferor.destination().is_none() {
        return Err(Error::SourceUnavailable { name, tried });
    }

    let result = loop {
        if let Err(e) = transferor.start_download(false).await {
            break Err(e);
        }
        match transferor.wait().await {
            Ok(Some(_)) => break Ok(()),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "transfer failed"),
        }
        if transferor.candidates().iter().all(|c| c.attempted) {
            break Err(Error::SourceUnavailable { name, tried });
        }
    };

    finish_progress_bars(bars);
    result
}

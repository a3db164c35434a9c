//! Sources command: show where a package would be downloaded from.

use console::style;
use std::path::Path;

use ad_core::{
    Context, Error, PackageSpec, RedirectPolicy, ResolvedSources, Selection, SourceResolver,
    SourcesConfig,
};
use ad_io::package_info;

pub fn run(
    package_path: &Path,
    config: &SourcesConfig,
    ctx: &Context,
    json: bool,
) -> Result<(), Error> {
    let package = PackageSpec::load(package_path)?;
    let resolved = resolve(&package, config, ctx);

    if json {
        println!("{}", sources_json(&package, ctx, &resolved));
        return Ok(());
    }

    let Some(key) = resolved.selected_key.as_deref() else {
        println!(
            "No download entry of {} matches locale {}.",
            style(&package.name).bold(),
            ctx.locale
        );
        return Ok(());
    };

    println!(
        "{} {} ({}, {} sources)",
        style("==>").cyan().bold(),
        style(&package.name).bold(),
        key,
        resolved.candidates.len()
    );
    if let Some(file_name) = &resolved.file_name {
        println!(
            "    {} {}",
            style("→").dim(),
            ctx.destination_for(file_name).display()
        );
    }
    if let Some(credentials) = &resolved.credentials {
        println!(
            "    {} authenticated as {}",
            style("→").dim(),
            credentials.username
        );
    }
    for candidate in &resolved.candidates {
        println!("  {}", candidate.url);
        println!(
            "    {} {}",
            style("hash:").dim(),
            if candidate.expected_hash.is_empty() {
                "-"
            } else {
                candidate.expected_hash.as_str()
            }
        );
        if !candidate.user_agent.is_empty() {
            println!("    {} {}", style("agent:").dim(), candidate.user_agent);
        }
    }

    Ok(())
}

fn resolve(package: &PackageSpec, config: &SourcesConfig, ctx: &Context) -> ResolvedSources {
    let installed_version = if ctx.update_mode {
        package_info::installed_version(&package.install_dir)
    } else {
        None
    };
    let selection = Selection {
        locale: &ctx.locale,
        installed_version: installed_version.as_deref(),
        update_mode: ctx.update_mode,
    };
    let policy = RedirectPolicy {
        forced: ctx.force_redirect,
        ipv4_available: ctx.ipv4_available,
    };
    SourceResolver::new(config, policy).resolve(package, &selection)
}

fn sources_json(package: &PackageSpec, ctx: &Context, resolved: &ResolvedSources) -> String {
    let candidates: Vec<_> = resolved
        .candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "url": c.url,
                "hash": c.expected_hash,
                "user_agent": c.user_agent,
            })
        })
        .collect();

    let output = serde_json::json!({
        "name": package.name,
        "key": resolved.selected_key,
        "destination": resolved
            .file_name
            .as_deref()
            .map(|name| ctx.destination_for(name)),
        "authenticated": resolved.credentials.is_some(),
        "candidates": candidates,
    });
    serde_json::to_string_pretty(&output).unwrap_or_default()
}

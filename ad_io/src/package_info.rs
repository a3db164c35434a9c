//! Installed package metadata.

use std::path::{Path, PathBuf};

use tracing::debug;

const INFO_FILES: [&str; 2] = ["appinfo.ini", "plugininstaller.ini"];

/// Metadata files describing the installed copy, in lookup order.
pub fn info_files(install_dir: &Path) -> Vec<PathBuf> {
    let dir = install_dir.join("App").join("AppInfo");
    INFO_FILES.iter().map(|name| dir.join(name)).collect()
}

/// `PackageVersion` from the `[Version]` section of the installed package's
/// metadata, if any.
pub fn installed_version(install_dir: &Path) -> Option<String> {
    for path in info_files(install_dir) {
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(version) = ini_value(&contents, "Version", "PackageVersion") {
            debug!(path = %path.display(), %version, "found installed version");
            return Some(version);
        }
    }
    None
}

/// Look up `key` in `section`; both names are matched case-insensitively.
pub fn ini_value(contents: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case(section);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=')
            && k.trim().eq_ignore_ascii_case(key)
        {
            let value = v.trim().trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

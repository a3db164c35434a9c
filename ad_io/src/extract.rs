//! Unpacking archive packages into the install directory.
//!
//! Zip and tarballs are read natively; 7z and rar go through an external
//! archiver (7-Zip compatible command line).

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use ad_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarXz,
    SevenZip,
    Rar,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".7z") {
            Some(Self::SevenZip)
        } else if name.ends_with(".rar") {
            Some(Self::Rar)
        } else {
            None
        }
    }

    pub fn needs_archiver(&self) -> bool {
        matches!(self, Self::SevenZip | Self::Rar)
    }
}

pub fn is_archive(path: &Path) -> bool {
    ArchiveKind::detect(path).is_some()
}

/// Extract `archive` into `dest`, creating it if needed.
pub fn extract_archive(archive: &Path, dest: &Path, archiver: Option<&Path>) -> Result<(), Error> {
    let kind = ArchiveKind::detect(archive).ok_or_else(|| Error::UnsupportedArchive {
        path: archive.to_path_buf(),
    })?;

    if kind.needs_archiver() {
        match archiver {
            Some(path) if path.is_file() => {}
            other => {
                return Err(Error::MissingArchiver {
                    path: other.map(Path::to_path_buf),
                });
            }
        }
    }

    info!(archive = %archive.display(), dest = %dest.display(), ?kind, "extracting");
    fs::create_dir_all(dest)?;

    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => {
            let reader = BufReader::new(File::open(archive)?);
            extract_tar(flate2::read::GzDecoder::new(reader), dest)
        }
        ArchiveKind::TarXz => {
            let reader = BufReader::new(File::open(archive)?);
            extract_tar(xz2::read::XzDecoder::new(reader), dest)
        }
        ArchiveKind::SevenZip | ArchiveKind::Rar => match archiver {
            Some(archiver) => extract_external(archiver, archive, dest),
            None => Err(Error::MissingArchiver { path: None }),
        },
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), Error> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(|e| Error::Io {
        message: format!("failed to read {}: {e}", archive.display()),
    })?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| Error::Io {
            message: format!("failed to read zip entry: {e}"),
        })?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping zip entry outside the destination");
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    debug!(entries = zip.len(), "zip extracted");
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), Error> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            warn!("skipping link entry in tarball");
            continue;
        }
        // unpack_in refuses paths escaping `dest`
        if !entry.unpack_in(dest)? {
            warn!("skipping tar entry outside the destination");
        }
    }
    Ok(())
}

fn extract_external(archiver: &Path, archive: &Path, dest: &Path) -> Result<(), Error> {
    let output = Command::new(archiver)
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", dest.display()))
        .arg(archive)
        .output()?;

    if !output.status.success() {
        return Err(Error::Io {
            message: format!(
                "{} exited with {}: {}",
                archiver.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

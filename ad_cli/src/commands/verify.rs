//! Verify command: check a file against an expected digest.

use console::style;
use std::path::Path;

use ad_core::{Error, HashAlgorithm, Verdict};
use ad_io::IntegrityVerifier;

pub fn run(file: &Path, expected: &str) -> Result<(), Error> {
    if !file.is_file() {
        return Err(Error::Io {
            message: format!("'{}' is not a file", file.display()),
        });
    }

    let mut verifier = IntegrityVerifier::new(file);
    match verifier.verify(expected)? {
        Verdict::Match => {
            let algorithm = HashAlgorithm::from_expected(expected)
                .map(|a| a.name())
                .unwrap_or_default();
            println!(
                "{} {} matches ({})",
                style("==>").cyan().bold(),
                file.display(),
                algorithm
            );
            Ok(())
        }
        Verdict::Unverifiable => {
            println!(
                "{} {} characters is not a known digest length, nothing to verify",
                style("==>").yellow().bold(),
                expected.trim().len()
            );
            Ok(())
        }
        Verdict::Mismatch { actual } => Err(Error::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
            file_name: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn matching_digest_succeeds() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, b"hello world").unwrap();

        run(&file, HELLO_SHA256).unwrap();
        run(&file, &HELLO_SHA256.to_uppercase()).unwrap();
    }

    #[test]
    fn mismatch_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, b"hello world!").unwrap();

        let err = run(&file, HELLO_SHA256).unwrap_err();
        match err {
            Error::ChecksumMismatch {
                expected,
                file_name,
                ..
            } => {
                assert_eq!(expected, HELLO_SHA256);
                assert_eq!(file_name.as_deref(), Some("hello.txt"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_length_passes() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("hello.txt");
        std::fs::write(&file, b"hello world").unwrap();

        run(&file, "abc").unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            run(&tmp.path().join("absent"), HELLO_SHA256),
            Err(Error::Io { .. })
        ));
    }
}

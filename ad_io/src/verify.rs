use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use ad_core::{Error, HashAlgorithm, SourceCandidate, Verdict};

/// Result of checking a download against the sources it may have come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub verdict: Verdict,
    /// Hash the verdict was reached against
    pub expected: String,
}

/// Checks one downloaded file, hashing it at most once per algorithm.
pub struct IntegrityVerifier {
    path: PathBuf,
    digests: HashMap<HashAlgorithm, String>,
}

impl IntegrityVerifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            digests: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verify(&mut self, expected: &str) -> Result<Verdict, Error> {
        let Some(algorithm) = HashAlgorithm::from_expected(expected) else {
            debug!(len = expected.len(), "no digest of this length, skipping verification");
            return Ok(Verdict::Unverifiable);
        };
        let actual = self.digest(algorithm)?;
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(Verdict::Match)
        } else {
            Ok(Verdict::Mismatch { actual })
        }
    }

    /// Accept the file if any attempted source vouches for it.
    ///
    /// On failure the report carries the first mismatch seen.
    pub fn verify_attempted(
        &mut self,
        candidates: &[SourceCandidate],
    ) -> Result<IntegrityReport, Error> {
        let mut first_mismatch = None;

        for candidate in candidates.iter().filter(|c| c.attempted) {
            let verdict = self.verify(&candidate.expected_hash)?;
            if verdict.is_acceptable() {
                return Ok(IntegrityReport {
                    verdict,
                    expected: candidate.expected_hash.clone(),
                });
            }
            first_mismatch.get_or_insert(IntegrityReport {
                verdict,
                expected: candidate.expected_hash.clone(),
            });
        }

        Ok(first_mismatch.unwrap_or(IntegrityReport {
            verdict: Verdict::Unverifiable,
            expected: String::new(),
        }))
    }

    fn digest(&mut self, algorithm: HashAlgorithm) -> Result<String, Error> {
        if let Some(digest) = self.digests.get(&algorithm) {
            return Ok(digest.clone());
        }
        let file = File::open(&self.path)?;
        let digest = algorithm.digest_reader(&mut BufReader::new(file))?;
        debug!(algorithm = algorithm.name(), path = %self.path.display(), "computed digest");
        self.digests.insert(algorithm, digest.clone());
        Ok(digest)
    }
}

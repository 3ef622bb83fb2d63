//! Compatibility filtering and best-version selection.

use depot_config::config::Config;

/// One installable artifact of a package, before selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCandidate {
    pub version_code: i64,
    pub version_name: String,
    /// Artifact path relative to the repository base URL.
    pub file_name: String,
    pub size: i64,
    pub sha256: String,
    pub min_sdk: i64,
    pub target_sdk: i64,
    pub nativecode: Vec<String>,
    pub changelog: String,
}

/// The platform level and native ABIs of the device packages are selected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    api_level: u32,
    /// Lowercased.
    abis: Vec<String>,
}

impl DeviceProfile {
    pub fn new<I, S>(api_level: u32, abis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            api_level,
            abis: abis
                .into_iter()
                .map(|abi| abi.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_level(), config.abis())
    }

    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    pub fn abis(&self) -> &[String] {
        &self.abis
    }

    /// A candidate is compatible when the device meets its minimum platform level and, if it
    /// ships native code, one of its ABIs is contained in one of the device's ABIs.
    pub fn is_compatible(&self, candidate: &VersionCandidate) -> bool {
        if i64::from(self.api_level) < candidate.min_sdk {
            return false;
        }
        if candidate.nativecode.is_empty() {
            return true;
        }
        candidate.nativecode.iter().any(|listed| {
            let listed = listed.to_ascii_lowercase();
            self.abis.iter().any(|device_abi| device_abi.contains(&listed))
        })
    }
}

/// Whether `candidate` should replace `incumbent`.
///
/// A higher version code always wins. On equal version codes the strictly smaller size wins,
/// but only when both sizes are known (positive); otherwise the incumbent stays.
pub fn is_better(candidate: &VersionCandidate, incumbent: &VersionCandidate) -> bool {
    if candidate.version_code != incumbent.version_code {
        return candidate.version_code > incumbent.version_code;
    }
    candidate.size > 0 && incumbent.size > 0 && candidate.size < incumbent.size
}

/// Incremental reducer over compatible candidates in document order.
#[derive(Debug, Default)]
pub struct BestVersion {
    best: Option<VersionCandidate>,
}

impl BestVersion {
    pub fn offer(&mut self, candidate: VersionCandidate) {
        match &self.best {
            Some(incumbent) if !is_better(&candidate, incumbent) => {}
            _ => self.best = Some(candidate),
        }
    }

    pub fn into_inner(self) -> Option<VersionCandidate> {
        self.best
    }
}

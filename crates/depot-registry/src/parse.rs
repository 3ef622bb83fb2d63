//! Streaming `index-v2.json` parser.
//!
//! The document is consumed straight from a reader. Every package value is captured as a raw
//! JSON fragment and parsed on its own, so a package with an unexpected shape is skipped
//! without aborting the repository. Versions are filtered and reduced to one best candidate as
//! they are read, and finished records leave the parser in batches of bounded size.

use std::{fmt, io::Read, mem};

use depot_config::repository::Repository;
use serde::{
    de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor},
    Deserializer,
};
use serde_json::value::RawValue;
use tracing::{debug, trace, warn};

use crate::{
    error::{RegistryError, Result},
    index::{LocalizedText, RawMetadata, RawVersion, FALLBACK_LOCALE},
    record::{is_absolute_url, join_url, PackageRecord, DEFAULT_CATEGORY},
    select::{BestVersion, DeviceProfile, VersionCandidate},
};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Icon location used for archival mirrors, which don't host current icons themselves.
pub const ARCHIVE_ICON_BASE: &str = "https://f-droid.org/repo/icons";

/// Counters describing one parse run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseSummary {
    /// Records emitted.
    pub packages: usize,
    /// Packages dropped because of a malformed shape.
    pub malformed: usize,
    /// Packages without metadata or without a compatible version.
    pub incompatible: usize,
    pub batches: usize,
}

pub struct IndexParser {
    base_url: String,
    repo_name: String,
    is_archive: bool,
    device: DeviceProfile,
    locale: String,
    batch_size: usize,
}

impl IndexParser {
    pub fn new(repo: &Repository, device: DeviceProfile) -> Self {
        Self {
            base_url: repo.base_url().to_string(),
            repo_name: repo.name.clone(),
            is_archive: repo.is_archive(),
            device,
            locale: FALLBACK_LOCALE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Parses an index from `reader`, handing each full batch to `emit` and flushing the final
    /// partial batch at end of stream.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::JsonError`] if the document itself is truncated or not valid JSON.
    /// * Whatever `emit` returns; parsing stops at the first failed batch.
    pub fn parse<R, F>(&self, reader: R, mut emit: F) -> Result<ParseSummary>
    where
        R: Read,
        F: FnMut(Vec<PackageRecord>) -> Result<()>,
    {
        let mut batcher = Batcher {
            batch: Vec::with_capacity(self.batch_size),
            batch_size: self.batch_size,
            emit: &mut emit,
            summary: ParseSummary::default(),
            failure: None,
        };

        let mut de = serde_json::Deserializer::from_reader(reader);
        let result = IndexSeed {
            parser: self,
            batcher: &mut batcher,
        }
        .deserialize(&mut de)
        .and_then(|()| de.end());

        if let Some(err) = batcher.failure.take() {
            return Err(err);
        }
        result?;
        batcher.flush()?;

        let summary = batcher.summary;
        debug!(
            repo = %self.repo_name,
            packages = summary.packages,
            malformed = summary.malformed,
            incompatible = summary.incompatible,
            batches = summary.batches,
            "index parsed"
        );
        Ok(summary)
    }

    /// Parses a single package fragment. `Ok(None)` means the package has nothing installable.
    fn parse_package(&self, pkg_id: &str, json: &str) -> serde_json::Result<Option<PackageRecord>> {
        let mut de = serde_json::Deserializer::from_str(json);
        let parsed = PackageSeed { parser: self }.deserialize(&mut de)?;

        let (Some(metadata), Some(best)) = (parsed.metadata, parsed.best) else {
            return Ok(None);
        };
        Ok(Some(self.build_record(pkg_id, metadata, best)))
    }

    fn build_record(
        &self,
        pkg_id: &str,
        metadata: RawMetadata,
        best: VersionCandidate,
    ) -> PackageRecord {
        let locale = self.locale.as_str();
        let text = |field: &Option<LocalizedText>| {
            field
                .as_ref()
                .and_then(|text| text.resolve(locale))
                .map(String::from)
        };

        let category = metadata
            .categories
            .and_then(|categories| categories.into_iter().next())
            .filter(|category| !category.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let screenshots = metadata
            .screenshots
            .as_ref()
            .map(|shots| {
                shots
                    .names(locale)
                    .into_iter()
                    .map(|name| self.screenshot_url(name))
                    .collect()
            })
            .unwrap_or_default();

        PackageRecord {
            package_id: pkg_id.to_string(),
            name: text(&metadata.name).unwrap_or_else(|| pkg_id.to_string()),
            summary: text(&metadata.summary).unwrap_or_default(),
            description: text(&metadata.description).unwrap_or_default(),
            icon_url: self.icon_url(
                pkg_id,
                metadata.icon.as_ref().and_then(|icon| icon.resolve(locale)),
            ),
            version_name: best.version_name,
            version_code: best.version_code,
            size: best.size,
            download_url: self.artifact_url(&best.file_name),
            license: metadata.license.unwrap_or_default(),
            category,
            author: metadata.author_name.unwrap_or_default(),
            homepage: metadata.web_site.unwrap_or_default(),
            source_url: metadata.source_code.unwrap_or_default(),
            added: metadata.added.unwrap_or(0),
            last_updated: metadata.last_updated.unwrap_or(0),
            screenshots,
            anti_features: metadata
                .anti_features
                .map(|features| features.into_names())
                .unwrap_or_default(),
            repo_name: self.repo_name.clone(),
            sha256: best.sha256,
            changelog: best.changelog,
        }
    }

    pub fn icon_url(&self, pkg_id: &str, icon_name: Option<&str>) -> String {
        match icon_name {
            Some(name) if is_absolute_url(name) => name.to_string(),
            Some(name) => join_url(&self.base_url, name),
            None if self.is_archive => format!("{ARCHIVE_ICON_BASE}/{pkg_id}.png"),
            None => format!("{}/icons/{pkg_id}.png", self.base_url),
        }
    }

    pub fn screenshot_url(&self, name: &str) -> String {
        if is_absolute_url(name) {
            name.to_string()
        } else {
            join_url(&self.base_url, name)
        }
    }

    pub fn artifact_url(&self, file_name: &str) -> String {
        join_url(&self.base_url, file_name)
    }
}

/// Bounded buffer between the parser and the consumer. Full batches are moved out.
struct Batcher<'e> {
    batch: Vec<PackageRecord>,
    batch_size: usize,
    emit: &'e mut dyn FnMut(Vec<PackageRecord>) -> Result<()>,
    summary: ParseSummary,
    failure: Option<RegistryError>,
}

impl Batcher<'_> {
    fn push(&mut self, record: PackageRecord) -> Result<()> {
        self.batch.push(record);
        self.summary.packages += 1;
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.summary.batches += 1;
        trace!(size = batch.len(), "emitting batch");
        (self.emit)(batch)
    }
}

struct IndexSeed<'p, 'b, 'e> {
    parser: &'p IndexParser,
    batcher: &'b mut Batcher<'e>,
}

impl<'de> DeserializeSeed<'de> for IndexSeed<'_, '_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for IndexSeed<'_, '_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an index-v2 object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(key) = map.next_key::<String>()? {
            if key == "packages" {
                map.next_value_seed(PackagesSeed {
                    parser: self.parser,
                    batcher: &mut *self.batcher,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct PackagesSeed<'p, 'b, 'e> {
    parser: &'p IndexParser,
    batcher: &'b mut Batcher<'e>,
}

impl<'de> DeserializeSeed<'de> for PackagesSeed<'_, '_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for PackagesSeed<'_, '_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of package identifiers to packages")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(pkg_id) = map.next_key::<String>()? {
            let raw: Box<RawValue> = map.next_value()?;

            match self.parser.parse_package(&pkg_id, raw.get()) {
                Ok(Some(record)) => {
                    if let Err(err) = self.batcher.push(record) {
                        self.batcher.failure = Some(err);
                        return Err(de::Error::custom("package batch was not accepted"));
                    }
                }
                Ok(None) => {
                    trace!(pkg_id = %pkg_id, "no installable version");
                    self.batcher.summary.incompatible += 1;
                }
                Err(err) => {
                    warn!(pkg_id = %pkg_id, repo = %self.parser.repo_name, "skipping malformed package: {err}");
                    self.batcher.summary.malformed += 1;
                }
            }
        }
        Ok(())
    }
}

struct ParsedPackage {
    metadata: Option<RawMetadata>,
    best: Option<VersionCandidate>,
}

struct PackageSeed<'p> {
    parser: &'p IndexParser,
}

impl<'de> DeserializeSeed<'de> for PackageSeed<'_> {
    type Value = ParsedPackage;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<ParsedPackage, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for PackageSeed<'_> {
    type Value = ParsedPackage;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a package object with metadata and versions")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<ParsedPackage, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut parsed = ParsedPackage {
            metadata: None,
            best: None,
        };

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "metadata" => parsed.metadata = map.next_value::<Option<RawMetadata>>()?,
                "versions" => parsed.best = map.next_value_seed(VersionsSeed { parser: self.parser })?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(parsed)
    }
}

struct VersionsSeed<'p> {
    parser: &'p IndexParser,
}

impl<'de> DeserializeSeed<'de> for VersionsSeed<'_> {
    type Value = Option<VersionCandidate>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(self)
    }
}

impl<'de> Visitor<'de> for VersionsSeed<'_> {
    type Value = Option<VersionCandidate>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of version hashes to versions")
    }

    fn visit_none<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let device = &self.parser.device;
        let mut best = BestVersion::default();

        while map.next_key::<IgnoredAny>()?.is_some() {
            let version: RawVersion = map.next_value()?;
            let Some(candidate) = version.into_candidate(&self.parser.locale) else {
                continue;
            };
            if device.is_compatible(&candidate) {
                best.offer(candidate);
            } else {
                trace!(
                    version_code = candidate.version_code,
                    min_sdk = candidate.min_sdk,
                    "skipping incompatible version"
                );
            }
        }

        Ok(best.into_inner())
    }
}

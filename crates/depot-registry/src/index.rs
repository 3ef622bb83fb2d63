//! Raw `index-v2.json` structures.
//!
//! These mirror the wire format loosely: optional everywhere, polymorphic where real indexes
//! disagree with each other, and numbers accepted as strings. Conversion into catalog types
//! happens in [`crate::parse`].

use std::{collections::BTreeMap, fmt};

use serde::{
    de::{self, IgnoredAny, Visitor},
    Deserialize, Deserializer,
};

use crate::select::VersionCandidate;

/// Locale consulted when the preferred one has no entry.
pub const FALLBACK_LOCALE: &str = "en-US";

/// Looks up `locale`, then [`FALLBACK_LOCALE`].
pub fn pick_locale<'a, T>(map: &'a BTreeMap<String, T>, locale: &str) -> Option<&'a T> {
    map.get(locale).or_else(|| map.get(FALLBACK_LOCALE))
}

fn flexible_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptI64Visitor;

    impl<'de> Visitor<'de> for OptI64Visitor {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer, numeric string, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(v)
                .map(Some)
                .map_err(|_| E::custom("integer out of range"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v.is_finite().then_some(v as i64))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            v.parse::<i64>()
                .map(Some)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(OptI64Visitor)
}

/// Text that is either a plain string or a map keyed by locale tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedText {
    pub fn resolve(&self, locale: &str) -> Option<&str> {
        match self {
            LocalizedText::Plain(text) => Some(text.as_str()),
            LocalizedText::Localized(map) => pick_locale(map, locale).map(String::as_str),
        }
    }
}

/// A file reference given either as a bare path or as `{ "name": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    Name(String),
    Object { name: String },
}

impl FileRef {
    pub fn name(&self) -> &str {
        match self {
            FileRef::Name(name) | FileRef::Object { name } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Icon {
    Single(FileRef),
    Localized(BTreeMap<String, FileRef>),
}

impl Icon {
    pub fn resolve(&self, locale: &str) -> Option<&str> {
        match self {
            Icon::Single(file) => Some(file.name()),
            Icon::Localized(map) => pick_locale(map, locale).map(FileRef::name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Screenshots {
    List(Vec<FileRef>),
    Localized(BTreeMap<String, Vec<FileRef>>),
    /// Grouped by device class (`phone`, `tenInch`, ...) and then by locale.
    ByDevice(BTreeMap<String, BTreeMap<String, Vec<FileRef>>>),
}

impl Screenshots {
    pub fn names(&self, locale: &str) -> Vec<&str> {
        let files: &[FileRef] = match self {
            Screenshots::List(files) => files,
            Screenshots::Localized(map) => {
                pick_locale(map, locale).map(Vec::as_slice).unwrap_or_default()
            }
            Screenshots::ByDevice(devices) => {
                devices
                    .get("phone")
                    .or_else(|| devices.values().next())
                    .and_then(|map| pick_locale(map, locale))
                    .map(Vec::as_slice)
                    .unwrap_or_default()
            }
        };
        files.iter().map(FileRef::name).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AntiFeatures {
    List(Vec<String>),
    /// Tag mapped to a localized reason, as in current indexes.
    Map(BTreeMap<String, IgnoredAny>),
}

impl AntiFeatures {
    pub fn into_names(self) -> Vec<String> {
        match self {
            AntiFeatures::List(names) => names,
            AntiFeatures::Map(map) => map.into_keys().collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    pub name: Option<LocalizedText>,
    pub summary: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub icon: Option<Icon>,
    pub categories: Option<Vec<String>>,
    pub anti_features: Option<AntiFeatures>,
    pub license: Option<String>,
    pub author_name: Option<String>,
    pub web_site: Option<String>,
    pub source_code: Option<String>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub added: Option<i64>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub last_updated: Option<i64>,
    pub screenshots: Option<Screenshots>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawFile {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub size: Option<i64>,
    pub sha256: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUsesSdk {
    #[serde(default, deserialize_with = "flexible_i64")]
    pub min_sdk_version: Option<i64>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub target_sdk_version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawManifest {
    #[serde(default, deserialize_with = "flexible_i64")]
    pub version_code: Option<i64>,
    pub version_name: Option<String>,
    pub uses_sdk: Option<RawUsesSdk>,
    pub nativecode: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVersion {
    #[serde(default, deserialize_with = "flexible_i64")]
    pub version_code: Option<i64>,
    pub version_name: Option<String>,
    pub file: Option<RawFile>,
    pub manifest: Option<RawManifest>,
    pub whats_new: Option<LocalizedText>,
}

impl RawVersion {
    /// Flattens the version into a candidate. Versions without an artifact file are dropped.
    ///
    /// Manifest values take precedence over the top-level `versionCode`/`versionName`.
    pub fn into_candidate(self, locale: &str) -> Option<VersionCandidate> {
        let file = self.file?;
        let file_name = file.name.filter(|name| !name.trim().is_empty())?;
        let manifest = self.manifest.unwrap_or_default();
        let uses_sdk = manifest.uses_sdk.unwrap_or_default();

        Some(VersionCandidate {
            version_code: manifest.version_code.or(self.version_code).unwrap_or(0),
            version_name: manifest
                .version_name
                .or(self.version_name)
                .unwrap_or_default(),
            file_name,
            size: file.size.unwrap_or(0),
            sha256: file.sha256.unwrap_or_default(),
            min_sdk: uses_sdk.min_sdk_version.unwrap_or(0),
            target_sdk: uses_sdk.target_sdk_version.unwrap_or(0),
            nativecode: manifest.nativecode.unwrap_or_default(),
            changelog: self
                .whats_new
                .as_ref()
                .and_then(|text| text.resolve(locale))
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localized_text_fallback() {
        let text: LocalizedText =
            serde_json::from_str(r#"{"en-US": "App", "de-DE": "Anwendung"}"#).unwrap();
        assert_eq!(text.resolve("de-DE"), Some("Anwendung"));
        assert_eq!(text.resolve("fr-FR"), Some("App"));

        let only_de: LocalizedText = serde_json::from_str(r#"{"de-DE": "Anwendung"}"#).unwrap();
        assert_eq!(only_de.resolve("fr-FR"), None);

        let plain: LocalizedText = serde_json::from_str(r#""What's new""#).unwrap();
        assert_eq!(plain.resolve("fr-FR"), Some("What's new"));
    }

    #[test]
    fn test_icon_shapes() {
        let localized: Icon = serde_json::from_str(
            r#"{"en-US": {"name": "/org.app/en-US/icon.png", "sha256": "ab", "size": 10}}"#,
        )
        .unwrap();
        assert_eq!(localized.resolve("en-US"), Some("/org.app/en-US/icon.png"));

        let object: Icon = serde_json::from_str(r#"{"name": "/icons/org.app.png"}"#).unwrap();
        assert_eq!(object.resolve("de-DE"), Some("/icons/org.app.png"));

        let bare: Icon = serde_json::from_str(r#"{"en-US": "icon.png"}"#).unwrap();
        assert_eq!(bare.resolve("en-US"), Some("icon.png"));
    }

    #[test]
    fn test_screenshot_shapes() {
        let list: Screenshots =
            serde_json::from_str(r#"["a.png", {"name": "b.png"}]"#).unwrap();
        assert_eq!(list.names("en-US"), vec!["a.png", "b.png"]);

        let by_device: Screenshots = serde_json::from_str(
            r#"{"tenInch": {"en-US": ["t.png"]}, "phone": {"en-US": [{"name": "p.png"}]}}"#,
        )
        .unwrap();
        assert_eq!(by_device.names("en-US"), vec!["p.png"]);

        let localized: Screenshots =
            serde_json::from_str(r#"{"en-US": ["1.png", "2.png"]}"#).unwrap();
        assert_eq!(localized.names("de-DE"), vec!["1.png", "2.png"]);
    }

    #[test]
    fn test_anti_feature_shapes() {
        let list: AntiFeatures = serde_json::from_str(r#"["Ads", "Tracking"]"#).unwrap();
        assert_eq!(list.into_names(), vec!["Ads", "Tracking"]);

        let map: AntiFeatures =
            serde_json::from_str(r#"{"NonFreeNet": {"en-US": "uses a service"}, "Ads": {}}"#)
                .unwrap();
        assert_eq!(map.into_names(), vec!["Ads", "NonFreeNet"]);
    }

    #[test]
    fn test_version_manifest_is_authoritative() {
        let version: RawVersion = serde_json::from_str(
            r#"{
                "versionCode": 1,
                "versionName": "old",
                "file": {"name": "/a.apk", "size": "1200", "sha256": "AA"},
                "manifest": {
                    "versionCode": 7,
                    "versionName": "1.7",
                    "usesSdk": {"minSdkVersion": 21, "targetSdkVersion": "33"},
                    "nativecode": ["arm64-v8a"]
                },
                "whatsNew": {"en-US": "Fixes"}
            }"#,
        )
        .unwrap();

        let candidate = version.into_candidate("en-US").unwrap();
        assert_eq!(candidate.version_code, 7);
        assert_eq!(candidate.version_name, "1.7");
        assert_eq!(candidate.size, 1200);
        assert_eq!(candidate.min_sdk, 21);
        assert_eq!(candidate.target_sdk, 33);
        assert_eq!(candidate.nativecode, vec!["arm64-v8a"]);
        assert_eq!(candidate.changelog, "Fixes");
    }

    #[test]
    fn test_version_without_file_is_dropped() {
        let version: RawVersion = serde_json::from_str(r#"{"versionCode": 3}"#).unwrap();
        assert!(version.into_candidate("en-US").is_none());
    }

    #[test]
    fn test_invalid_number_string_is_rejected() {
        assert!(serde_json::from_str::<RawFile>(r#"{"name": "a", "size": "big"}"#).is_err());
        let file: RawFile = serde_json::from_str(r#"{"name": "a", "size": null}"#).unwrap();
        assert_eq!(file.size, None);
    }
}

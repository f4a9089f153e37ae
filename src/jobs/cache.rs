use crate::analysis::statistics::{AnalysisType, ColumnStatistics};
use crate::db::connectors::SampleScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Named sample sizes on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLabel {
    Metadata,
    Full,
}

/// Sample size recorded with a cache entry: a row count, `"metadata"` or `"full"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleSize {
    Rows(u64),
    Label(SampleLabel),
}

impl From<SampleScope> for SampleSize {
    fn from(scope: SampleScope) -> Self {
        match scope {
            SampleScope::Rows(n) => SampleSize::Rows(n),
            SampleScope::Full => SampleSize::Label(SampleLabel::Full),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analyzed_at: DateTime<Utc>,
    pub sample_size: SampleSize,
    pub analysis_type: AnalysisType,
    pub statistics: ColumnStatistics,
}

impl CacheEntry {
    pub fn metadata(statistics: ColumnStatistics, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            analyzed_at,
            sample_size: SampleSize::Label(SampleLabel::Metadata),
            analysis_type: AnalysisType::MetadataOnly,
            statistics,
        }
    }

    pub fn sampled(scope: SampleScope, statistics: ColumnStatistics, analyzed_at: DateTime<Utc>) -> Self {
        let analysis_type = match scope {
            SampleScope::Full => AnalysisType::FullScan,
            SampleScope::Rows(_) => AnalysisType::Sample,
        };
        Self {
            analyzed_at,
            sample_size: scope.into(),
            analysis_type,
            statistics,
        }
    }
}

/// Column statistics keyed by `database.schema.table.column`, persisted as a
/// single JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl AnalysisCache {
    /// Load the cache. A missing file is an empty cache.
    pub fn try_load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the cache, starting empty when the file is unreadable.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(cache) => {
                log::info!("Loaded {} cached analyses from {}", cache.len(), path.display());
                cache
            }
            Err(e) => {
                log::warn!("{}; starting with an empty cache", e);
                Self::default()
            }
        }
    }

    /// Write the whole cache through a temporary file so readers never see a
    /// partial write.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Entry for `key`, when one exists that is at least as strong as `requested`.
    pub fn lookup(&self, key: &str, requested: AnalysisType) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.analysis_type.satisfies(requested))
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn record(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stats() -> ColumnStatistics {
        ColumnStatistics::from_counts(AnalysisType::Sample, 100, 90)
    }

    #[test]
    fn test_lookup_respects_strength() {
        let mut cache = AnalysisCache::default();
        let now = Utc::now();
        cache.record("A.B.C.META", CacheEntry::metadata(stats(), now));
        cache.record("A.B.C.SAMPLED", CacheEntry::sampled(SampleScope::Rows(1000), stats(), now));
        cache.record("A.B.C.FULL", CacheEntry::sampled(SampleScope::Full, stats(), now));

        assert!(cache.lookup("A.B.C.META", AnalysisType::MetadataOnly).is_some());
        assert!(cache.lookup("A.B.C.META", AnalysisType::Sample).is_none());
        assert!(cache.lookup("A.B.C.SAMPLED", AnalysisType::Sample).is_some());
        assert!(cache.lookup("A.B.C.SAMPLED", AnalysisType::FullScan).is_none());
        assert!(cache.lookup("A.B.C.FULL", AnalysisType::Sample).is_some());
        assert!(cache.lookup("A.B.C.MISSING", AnalysisType::MetadataOnly).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata").join("data_analysis_cache.json");
        let mut cache = AnalysisCache::default();
        cache.record("A.B.C.D", CacheEntry::sampled(SampleScope::Rows(10_000), stats(), Utc::now()));
        cache.record("A.B.C.E", CacheEntry::metadata(stats(), Utc::now()));
        cache.save(&path).unwrap();

        let loaded = AnalysisCache::try_load(&path).unwrap();
        assert_eq!(loaded, cache);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_sample_size_wire_format() {
        let entry = CacheEntry::metadata(stats(), Utc::now());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["sample_size"], "metadata");
        assert_eq!(json["analysis_type"], "metadata_only");

        let entry = CacheEntry::sampled(SampleScope::Rows(1000), stats(), Utc::now());
        assert_eq!(serde_json::to_value(&entry).unwrap()["sample_size"], 1000);
        let entry = CacheEntry::sampled(SampleScope::Full, stats(), Utc::now());
        assert_eq!(serde_json::to_value(&entry).unwrap()["sample_size"], "full");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = AnalysisCache::try_load(&dir.path().join("none.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AnalysisCache::try_load(&path), Err(CacheError::Json { .. })));
        assert!(AnalysisCache::load_or_empty(&path).is_empty());
    }
}

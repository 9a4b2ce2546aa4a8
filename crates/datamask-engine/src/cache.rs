use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use datamask_core::Scalar;
use datamask_core::atomic::write_bytes_atomic;

use crate::errors::EngineError;

/// Persisted layout: generator type -> original value -> substitute.
type Snapshot = BTreeMap<String, BTreeMap<String, Scalar>>;

#[derive(Debug, Default, Clone)]
struct Bucket {
    entries: BTreeMap<String, Scalar>,
    issued: HashSet<String>,
}

impl Bucket {
    fn insert(&mut self, key: &str, value: Scalar) {
        if let Some(issued) = value.cache_key() {
            self.issued.insert(issued);
        }
        self.entries.insert(key.to_string(), value);
    }

    fn is_issued(&self, value: &Scalar) -> bool {
        value
            .cache_key()
            .is_some_and(|key| self.issued.contains(&key))
    }
}

/// Memo table mapping `(generator type, original value)` to a substitute.
///
/// Buckets are keyed by generator type, so the same original fed through two
/// generator types is cached twice, independently.
#[derive(Debug, Default, Clone)]
pub struct ConsistencyCache {
    buckets: BTreeMap<String, Bucket>,
    hits: u64,
    misses: u64,
}

impl ConsistencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached substitute, or run `compute` once and remember its result.
    pub fn get_or_create<E, F>(
        &mut self,
        generator: &str,
        key: &str,
        compute: F,
    ) -> Result<Scalar, E>
    where
        F: FnOnce() -> Result<Scalar, E>,
    {
        if let Some(value) = self.lookup(generator, key).cloned() {
            self.hits += 1;
            return Ok(value);
        }
        self.misses += 1;
        let value = compute()?;
        debug!(generator, "consistency cache miss");
        self.bucket_mut(generator).insert(key, value.clone());
        Ok(value)
    }

    /// Like `get_or_create`, but a fresh substitute is never one already issued
    /// for the generator type. After `max_attempts` collisions the last candidate
    /// gets a `_<n>` suffix.
    pub fn get_or_create_unique<E, F>(
        &mut self,
        generator: &str,
        key: &str,
        max_attempts: usize,
        mut compute: F,
    ) -> Result<Scalar, E>
    where
        F: FnMut() -> Result<Scalar, E>,
    {
        if let Some(value) = self.lookup(generator, key).cloned() {
            self.hits += 1;
            return Ok(value);
        }
        self.misses += 1;

        let mut candidate = compute()?;
        let mut attempts = 1;
        while self.is_issued(generator, &candidate) {
            if attempts >= max_attempts.max(1) {
                let fallback = self.suffixed(generator, &candidate);
                warn!(
                    generator,
                    attempts, "unique generator exhausted; suffixing last candidate"
                );
                candidate = fallback;
                break;
            }
            candidate = compute()?;
            attempts += 1;
        }

        debug!(generator, attempts, "consistency cache miss (unique)");
        self.bucket_mut(generator).insert(key, candidate.clone());
        Ok(candidate)
    }

    pub fn lookup(&self, generator: &str, key: &str) -> Option<&Scalar> {
        self.buckets
            .get(generator)
            .and_then(|bucket| bucket.entries.get(key))
    }

    /// Total number of cached substitutes across all generator types.
    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, generator: &str) -> usize {
        self.buckets
            .get(generator)
            .map(|bucket| bucket.entries.len())
            .unwrap_or(0)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Load a persisted cache. A missing file yields an empty cache; an
    /// unreadable or malformed one is reported and also yields an empty cache.
    pub fn load(path: &Path) -> Self {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Self::new(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "cache file unreadable; starting empty"
                );
                return Self::new();
            }
        };
        match Self::read_from(file) {
            Ok(cache) => {
                debug!(path = %path.display(), entries = cache.len(), "cache loaded");
                cache
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache file malformed; starting empty");
                Self::new()
            }
        }
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self, EngineError> {
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        let mut cache = Self::new();
        for (generator, entries) in snapshot {
            let bucket = cache.bucket_mut(&generator);
            for (key, value) in entries {
                bucket.insert(&key, value);
            }
        }
        Ok(cache)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        serde_json::to_writer_pretty(writer, &self.snapshot())?;
        Ok(())
    }

    /// Atomically write the cache as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        bytes.push(b'\n');
        write_bytes_atomic(path, &bytes)?;
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        self.buckets
            .iter()
            .map(|(generator, bucket)| (generator.clone(), bucket.entries.clone()))
            .collect()
    }

    fn bucket_mut(&mut self, generator: &str) -> &mut Bucket {
        self.buckets.entry(generator.to_string()).or_default()
    }

    fn is_issued(&self, generator: &str, value: &Scalar) -> bool {
        self.buckets
            .get(generator)
            .is_some_and(|bucket| bucket.is_issued(value))
    }

    fn suffixed(&self, generator: &str, base: &Scalar) -> Scalar {
        let base = base.render();
        let mut n = 1usize;
        loop {
            let candidate = Scalar::Text(format!("{base}_{n}"));
            if !self.is_issued(generator, &candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("datamask_cache_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir.join(name)
    }

    #[test]
    fn computes_once_per_key() {
        let mut cache = ConsistencyCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let value = cache
                .get_or_create("first_name", "Alice", || {
                    calls += 1;
                    Ok::<_, Infallible>(Scalar::text("Bob"))
                })
                .unwrap();
            assert_eq!(value, Scalar::text("Bob"));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn buckets_are_independent() {
        let mut cache = ConsistencyCache::new();
        cache
            .get_or_create("number", "42", || Ok::<_, Infallible>(Scalar::Integer(7)))
            .unwrap();
        let email = cache
            .get_or_create("email", "42", || {
                Ok::<_, Infallible>(Scalar::text("a@example.com"))
            })
            .unwrap();
        assert_eq!(email, Scalar::text("a@example.com"));
        assert_eq!(cache.bucket_len("number"), 1);
        assert_eq!(cache.bucket_len("email"), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_compute_is_not_cached() {
        let mut cache = ConsistencyCache::new();
        let result = cache.get_or_create("name", "x", || Err::<Scalar, _>("boom"));
        assert!(result.is_err());
        assert!(cache.lookup("name", "x").is_none());
    }

    #[test]
    fn unique_skips_issued_values() {
        let mut cache = ConsistencyCache::new();
        let mut pool = vec!["b", "a", "a"].into_iter();
        cache
            .get_or_create_unique("city", "one", 10, || {
                Ok::<_, Infallible>(Scalar::text(pool.next().unwrap_or("z")))
            })
            .unwrap();
        let mut pool = vec!["b", "c"].into_iter();
        let second = cache
            .get_or_create_unique("city", "two", 10, || {
                Ok::<_, Infallible>(Scalar::text(pool.next().unwrap_or("z")))
            })
            .unwrap();
        assert_eq!(second, Scalar::text("c"));
    }

    #[test]
    fn unique_hits_return_the_cached_value() {
        let mut cache = ConsistencyCache::new();
        let mut calls = 0;
        for _ in 0..2 {
            let value = cache
                .get_or_create_unique("city", "Oslo", 10, || {
                    calls += 1;
                    Ok::<_, Infallible>(Scalar::text("Bergen"))
                })
                .unwrap();
            assert_eq!(value, Scalar::text("Bergen"));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn writer_and_reader_agree() {
        let mut cache = ConsistencyCache::new();
        cache
            .get_or_create("city", "Oslo", || Ok::<_, Infallible>(Scalar::text("Bergen")))
            .unwrap();
        let mut buffer = Vec::new();
        cache.write_to(&mut buffer).unwrap();
        let restored = ConsistencyCache::read_from(buffer.as_slice()).unwrap();
        assert_eq!(restored.lookup("city", "Oslo"), Some(&Scalar::text("Bergen")));
    }

    #[test]
    fn unique_exhaustion_appends_suffix() {
        let mut cache = ConsistencyCache::new();
        let constant = || Ok::<_, Infallible>(Scalar::text("same"));
        let first = cache.get_or_create_unique("word", "1", 3, constant).unwrap();
        let second = cache.get_or_create_unique("word", "2", 3, constant).unwrap();
        let third = cache.get_or_create_unique("word", "3", 3, constant).unwrap();
        assert_eq!(first, Scalar::text("same"));
        assert_eq!(second, Scalar::text("same_1"));
        assert_eq!(third, Scalar::text("same_2"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = temp_path("cache.json");
        let mut cache = ConsistencyCache::new();
        cache
            .get_or_create("number", "42", || Ok::<_, Infallible>(Scalar::Integer(7)))
            .unwrap();
        cache
            .get_or_create("first_name", "Alice", || {
                Ok::<_, Infallible>(Scalar::text("Bob"))
            })
            .unwrap();
        cache.save(&path).unwrap();

        let loaded = ConsistencyCache::load(&path);
        assert_eq!(loaded.lookup("number", "42"), Some(&Scalar::Integer(7)));
        assert_eq!(
            loaded.lookup("first_name", "Alice"),
            Some(&Scalar::text("Bob"))
        );
        assert!(loaded.is_issued("first_name", &Scalar::text("Bob")));
    }

    #[test]
    fn missing_file_loads_empty() {
        let path = temp_path("absent.json");
        assert!(ConsistencyCache::load(&path).is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let path = temp_path("corrupt.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(ConsistencyCache::load(&path).is_empty());
        fs::write(&path, br#"{"number": [1, 2]}"#).unwrap();
        assert!(ConsistencyCache::load(&path).is_empty());
    }

    #[test]
    fn save_under_a_file_fails() {
        let blocker = temp_path("blocker");
        fs::write(&blocker, b"").unwrap();
        let path = blocker.join("cache.json");
        assert!(ConsistencyCache::new().save(&path).is_err());
    }
}

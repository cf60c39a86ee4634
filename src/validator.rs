//! Schema cache and JSON Schema validation
//!
//! Resolves a schema reference URL to a compiled, reusable validator through
//! a pluggable [`SchemaLoader`] (`file://` and `http(s)://`), caches it for
//! the process lifetime, and checks decoded instances against it.
//!
//! Concurrency: a single mutex guards the cache for the whole of every
//! `validate` call (lookup, possible load+compile, and the check). That
//! serializes validation, which is a deliberate simplicity trade — only the
//! ingestion loop validates in steady state — and it gives the observable
//! guarantee that at most one compilation happens per distinct reference
//! even under concurrent first use.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use jsonschema::{JSONSchema, SchemaResolver, SchemaResolverError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::SchemaConfig;
use crate::error::{RelayError, Result};

/// HTTP fetch timeout for schema documents
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Loads schema documents by URL. Implementations are synchronous; callers
/// on the async runtime go through `spawn_blocking`.
pub trait SchemaLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<Value>;
}

/// Loader for `file://` references
pub struct FileLoader;

impl SchemaLoader for FileLoader {
    fn load(&self, url: &str) -> Result<Value> {
        let parsed = Url::parse(url).map_err(|e| RelayError::schema_load(url, e))?;
        let path = parsed
            .to_file_path()
            .map_err(|_| RelayError::schema_load(url, "not a file path"))?;
        let bytes = std::fs::read(&path).map_err(|e| RelayError::schema_load(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| RelayError::schema_load(url, e))
    }
}

/// Loader for `http://` and `https://` references with a bounded timeout.
/// TLS verification is on by default with an explicit insecure opt-out for
/// development setups.
pub struct HttpLoader {
    client: reqwest::blocking::Client,
}

impl HttpLoader {
    pub fn new(insecure: bool) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(HTTP_TIMEOUT);
        if insecure {
            warn!("TLS verification disabled for schema fetches");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::config(format!("failed to build schema HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl SchemaLoader for HttpLoader {
    fn load(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| RelayError::schema_load(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::schema_load(
                url,
                format!("returned status code {status}"),
            ));
        }
        resp.json().map_err(|e| RelayError::schema_load(url, e))
    }
}

/// Dispatches to the right loader by URL scheme
pub struct SchemeLoader {
    file: FileLoader,
    http: HttpLoader,
}

impl SchemeLoader {
    pub fn new(insecure: bool) -> Result<Self> {
        Ok(Self {
            file: FileLoader,
            http: HttpLoader::new(insecure)?,
        })
    }
}

impl SchemaLoader for SchemeLoader {
    fn load(&self, url: &str) -> Result<Value> {
        let parsed = Url::parse(url).map_err(|e| RelayError::schema_load(url, e))?;
        match parsed.scheme() {
            "file" => self.file.load(url),
            "http" | "https" => self.http.load(url),
            scheme => Err(RelayError::schema_load(
                url,
                format!("unsupported scheme '{scheme}'"),
            )),
        }
    }
}

/// Bridges the loader into schema compilation so nested `$ref` dependencies
/// resolve through the same source as top-level references.
struct LoaderResolver {
    loader: Arc<dyn SchemaLoader>,
}

impl SchemaResolver for LoaderResolver {
    fn resolve(
        &self,
        _root_schema: &Value,
        url: &Url,
        _original_reference: &str,
    ) -> std::result::Result<Arc<Value>, SchemaResolverError> {
        self.loader
            .load(url.as_str())
            .map(Arc::new)
            .map_err(|e| anyhow!("{e}"))
    }
}

/// Schema cache and validator.
///
/// The cache grows monotonically and never evicts: schema versions are
/// append-only identifiers and the feed's working set is on the order of
/// tens of schemas.
pub struct SchemaValidator {
    loader: Arc<dyn SchemaLoader>,
    cache: Mutex<HashMap<String, Arc<JSONSchema>>>,
    audit_file: Option<PathBuf>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("audit_file", &self.audit_file)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Build the production validator and eagerly compile the configured
    /// preload set. Any preload failure is fatal: the relay must not accept
    /// traffic without its known schemas compiled.
    pub fn new(config: &SchemaConfig) -> Result<Self> {
        let loader = Arc::new(SchemeLoader::new(config.insecure_tls)?);
        Self::with_loader(loader, &config.preload, config.audit_file.clone())
    }

    /// Build a validator over an arbitrary loader. Seam for tests and for
    /// embedding the validator behind other schema sources.
    pub fn with_loader(
        loader: Arc<dyn SchemaLoader>,
        preload: &[String],
        audit_file: Option<PathBuf>,
    ) -> Result<Self> {
        let validator = Self {
            loader,
            cache: Mutex::new(HashMap::new()),
            audit_file,
        };
        for url in preload {
            validator.get_schema(url)?;
        }
        Ok(validator)
    }

    /// Number of compiled schemas currently cached
    pub fn cached_schemas(&self) -> usize {
        self.cache.lock().len()
    }

    /// Return the compiled schema for a reference, loading and compiling it
    /// on first use. Failures do not poison the cache; a later call with the
    /// same reference retries resolution from scratch.
    pub fn get_schema(&self, url: &str) -> Result<Arc<JSONSchema>> {
        let mut cache = self.cache.lock();
        self.get_or_compile(&mut cache, url)
    }

    fn get_or_compile(
        &self,
        cache: &mut HashMap<String, Arc<JSONSchema>>,
        url: &str,
    ) -> Result<Arc<JSONSchema>> {
        if let Some(schema) = cache.get(url) {
            return Ok(schema.clone());
        }

        let document = self.loader.load(url)?;
        let compiled = JSONSchema::options()
            .with_resolver(LoaderResolver {
                loader: self.loader.clone(),
            })
            .compile(&document)
            .map_err(|e| RelayError::schema_compile(url, e))?;

        let schema = Arc::new(compiled);
        cache.insert(url.to_string(), schema.clone());
        debug!(schema = url, "compiled schema");

        // Best-effort audit trail of every schema the feed referenced
        if let Some(path) = &self.audit_file {
            if let Err(e) = append_line(path, url) {
                warn!(error = %e, file = %path.display(), "could not record schema url");
            }
        }

        Ok(schema)
    }

    /// Validate an instance against the schema named by `url`.
    ///
    /// All-or-nothing: fails with a schema acquisition error propagated from
    /// [`Self::get_schema`], [`RelayError::InstanceParse`] when the bytes are
    /// not JSON, or [`RelayError::SchemaValidation`] when the instance
    /// violates the schema.
    pub fn validate(&self, url: &str, instance: &[u8]) -> Result<()> {
        let mut cache = self.cache.lock();
        let schema = self.get_or_compile(&mut cache, url)?;

        let value: Value = serde_json::from_slice(instance)
            .map_err(|e| RelayError::InstanceParse(e.to_string()))?;

        if let Err(errors) = schema.validate(&value) {
            let reason = errors
                .map(|e| e.to_string())
                .next()
                .unwrap_or_else(|| "instance does not match schema".into());
            return Err(RelayError::SchemaValidation {
                schema: url.to_string(),
                reason,
            });
        }
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JOURNAL: &str = "https://test.invalid/schemas/journal/1";

    fn journal_schema() -> Value {
        json!({
            "type": "object",
            "required": ["$schemaRef", "message"],
            "properties": {
                "$schemaRef": {"type": "string"},
                "message": {
                    "type": "object",
                    "required": ["event"],
                    "properties": {"event": {"type": "string"}}
                }
            }
        })
    }

    /// Loader over a fixed map, counting every load
    struct MapLoader {
        schemas: HashMap<String, Value>,
        loads: AtomicUsize,
    }

    impl MapLoader {
        fn single(url: &str, schema: Value) -> Arc<Self> {
            let mut schemas = HashMap::new();
            schemas.insert(url.to_string(), schema);
            Arc::new(Self {
                schemas,
                loads: AtomicUsize::new(0),
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl SchemaLoader for MapLoader {
        fn load(&self, url: &str) -> Result<Value> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.schemas
                .get(url)
                .cloned()
                .ok_or_else(|| RelayError::schema_load(url, "not found"))
        }
    }

    fn journal_validator() -> (Arc<MapLoader>, SchemaValidator) {
        let loader = MapLoader::single(JOURNAL, journal_schema());
        let validator =
            SchemaValidator::with_loader(loader.clone(), &[JOURNAL.to_string()], None).unwrap();
        (loader, validator)
    }

    #[test]
    fn test_validate_ok() {
        let (_, validator) = journal_validator();
        let instance = json!({"$schemaRef": JOURNAL, "message": {"event": "Scan"}});
        validator
            .validate(JOURNAL, &serde_json::to_vec(&instance).unwrap())
            .unwrap();
    }

    #[test]
    fn test_validate_missing_required_field() {
        let (_, validator) = journal_validator();
        let instance = json!({"$schemaRef": JOURNAL, "message": {}});
        let err = validator
            .validate(JOURNAL, &serde_json::to_vec(&instance).unwrap())
            .unwrap_err();
        assert!(matches!(err, RelayError::SchemaValidation { .. }), "got {err:?}");
    }

    #[test]
    fn test_validate_wrong_type() {
        let (_, validator) = journal_validator();
        let instance = json!({"$schemaRef": JOURNAL, "message": {"event": 42}});
        let err = validator
            .validate(JOURNAL, &serde_json::to_vec(&instance).unwrap())
            .unwrap_err();
        assert!(matches!(err, RelayError::SchemaValidation { .. }));
    }

    #[test]
    fn test_validate_instance_not_json() {
        let (_, validator) = journal_validator();
        let err = validator.validate(JOURNAL, b"{oops").unwrap_err();
        assert!(matches!(err, RelayError::InstanceParse(_)));
    }

    #[test]
    fn test_cache_idempotence() {
        let (loader, validator) = journal_validator();
        assert_eq!(loader.loads(), 1, "preload compiles once");

        let first = validator.get_schema(JOURNAL).unwrap();
        let second = validator.get_schema(JOURNAL).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1, "no re-fetch after preload");
    }

    #[test]
    fn test_at_most_one_compile_under_concurrent_first_use() {
        let loader = MapLoader::single(JOURNAL, journal_schema());
        // No preload: first use races from multiple threads
        let validator =
            Arc::new(SchemaValidator::with_loader(loader.clone(), &[], None).unwrap());

        let instance = serde_json::to_vec(&json!({
            "$schemaRef": JOURNAL,
            "message": {"event": "Scan"}
        }))
        .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let validator = validator.clone();
                let instance = instance.clone();
                std::thread::spawn(move || validator.validate(JOURNAL, &instance))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_preload_failure_is_fatal() {
        let loader = MapLoader::single(JOURNAL, journal_schema());
        let err = SchemaValidator::with_loader(
            loader,
            &["https://test.invalid/schemas/unknown/1".to_string()],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::SchemaLoad { .. }));
    }

    #[test]
    fn test_load_failure_does_not_poison_cache() {
        let loader = MapLoader::single(JOURNAL, journal_schema());
        let validator = SchemaValidator::with_loader(loader.clone(), &[], None).unwrap();

        let missing = "https://test.invalid/schemas/missing/1";
        assert!(validator.get_schema(missing).is_err());
        assert_eq!(validator.cached_schemas(), 0);

        // The known schema still resolves afterwards
        validator.get_schema(JOURNAL).unwrap();
        assert_eq!(validator.cached_schemas(), 1);
    }

    #[test]
    fn test_file_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_vec(&journal_schema()).unwrap().as_slice())
            .unwrap();

        let url = Url::from_file_path(&path).unwrap().to_string();
        let validator = SchemaValidator::with_loader(
            Arc::new(SchemeLoader::new(false).unwrap()),
            &[url.clone()],
            None,
        )
        .unwrap();

        let instance = json!({"$schemaRef": url, "message": {"event": "Scan"}});
        validator
            .validate(&url, &serde_json::to_vec(&instance).unwrap())
            .unwrap();
    }

    #[test]
    fn test_audit_file_records_compiled_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let audit = dir.path().join("var").join("schemas.txt");
        let loader = MapLoader::single(JOURNAL, journal_schema());
        SchemaValidator::with_loader(loader, &[JOURNAL.to_string()], Some(audit.clone())).unwrap();

        let contents = std::fs::read_to_string(&audit).unwrap();
        assert_eq!(contents.trim(), JOURNAL);
    }
}

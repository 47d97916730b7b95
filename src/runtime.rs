//! Process-wide engine runtime
//!
//! A [`Runtime`] is built once: it identifies the platform, extracts the
//! matching engine library, default model and built-in keyword files into
//! the resource cache, and owns the loader that opens engine libraries.
//! Sessions receive it as `Arc<Runtime>` instead of reading hidden globals.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PorcupineError, Result};
use crate::keywords::BuiltinKeyword;
use crate::native::{DynamicLoader, EngineLoader};
use crate::platform::PlatformDescriptor;
use crate::resources::{BundleDirectory, ResourceCache, ResourceSource, CACHE_DIR_NAME};

/// Logical bundle path of the default model
pub const DEFAULT_MODEL_RESOURCE: &str = "lib/common/porcupine_params.pv";

const KEYWORD_FILE_EXTENSION: &str = ".ppn";

/// Where the bundle is read from and where it is extracted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Root of the packaged resource tree (`lib/`, `resources/`)
    pub bundle_dir: PathBuf,

    /// Root of the content-addressed extraction cache
    pub cache_root: PathBuf,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data")),
            cache_root: std::env::temp_dir().join(CACHE_DIR_NAME),
        }
    }
}

impl RuntimeOptions {
    /// Defaults overridden by `PORCUPINE_BUNDLE_DIR` and `PORCUPINE_CACHE_DIR`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bundle_dir: std::env::var_os("PORCUPINE_BUNDLE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bundle_dir),
            cache_root: std::env::var_os("PORCUPINE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_root),
        }
    }
}

static GLOBAL: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Immutable per-process engine context
pub struct Runtime {
    platform: PlatformDescriptor,
    cache: ResourceCache,
    library_path: PathBuf,
    model_path: PathBuf,
    keyword_paths: BTreeMap<BuiltinKeyword, PathBuf>,
    loader: Arc<dyn EngineLoader>,
}

impl Runtime {
    /// Identify the host and materialize the bundle described by `options`.
    pub fn initialize(options: RuntimeOptions) -> Result<Self> {
        let platform = PlatformDescriptor::identify()?;
        info!("Detected platform {}", platform);

        let source = BundleDirectory::new(&options.bundle_dir);
        Self::from_source(platform, &source, ResourceCache::new(options.cache_root))
    }

    /// Runtime built from [`RuntimeOptions::from_env`] on first use and
    /// shared for the rest of the process.
    pub fn global() -> Result<Arc<Self>> {
        GLOBAL
            .get_or_try_init(|| Self::initialize(RuntimeOptions::from_env()).map(Arc::new))
            .cloned()
    }

    /// Materialize the artifacts for `platform` out of `source`.
    pub fn from_source(
        platform: PlatformDescriptor,
        source: &dyn ResourceSource,
        cache: ResourceCache,
    ) -> Result<Self> {
        let library_path = cache.extract_library(source, &platform.library_resource_path())?;
        let model_path = cache.extract(source, DEFAULT_MODEL_RESOURCE)?;
        let keyword_paths = extract_keywords(&platform, source, &cache)?;

        info!(
            "Runtime ready: library {}, model {}, {} built-in keyword(s)",
            library_path.display(),
            model_path.display(),
            keyword_paths.len()
        );

        Ok(Self {
            platform,
            cache,
            library_path,
            model_path,
            keyword_paths,
            loader: Arc::new(DynamicLoader::new()),
        })
    }

    /// Replace the engine loader (statically linked engines, fakes).
    pub fn with_loader(mut self, loader: Arc<dyn EngineLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn platform(&self) -> &PlatformDescriptor {
        &self.platform
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Extracted engine library for this platform
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Extracted default model
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Extracted keyword file for a built-in keyword, if the bundle has one
    pub fn keyword_path(&self, keyword: BuiltinKeyword) -> Option<&Path> {
        self.keyword_paths.get(&keyword).map(PathBuf::as_path)
    }

    /// Built-in keywords available on this platform
    pub fn builtin_keywords(&self) -> impl Iterator<Item = BuiltinKeyword> + '_ {
        self.keyword_paths.keys().copied()
    }

    pub fn loader(&self) -> &Arc<dyn EngineLoader> {
        &self.loader
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("platform", &self.platform)
            .field("cache", &self.cache)
            .field("library_path", &self.library_path)
            .field("model_path", &self.model_path)
            .field("keyword_paths", &self.keyword_paths)
            .finish_non_exhaustive()
    }
}

fn extract_keywords(
    platform: &PlatformDescriptor,
    source: &dyn ResourceSource,
    cache: &ResourceCache,
) -> Result<BTreeMap<BuiltinKeyword, PathBuf>> {
    let dir = platform.keyword_resource_dir();
    let file_names = source
        .list(&dir)
        .map_err(|e| PorcupineError::resource(dir.as_str(), e))?;

    let mut keyword_paths = BTreeMap::new();
    for file_name in file_names {
        let Some(keyword) = keyword_from_file_name(&file_name) else {
            debug!("Skipping {} in {}", file_name, dir);
            continue;
        };

        let path = cache.extract(source, &format!("{}/{}", dir, file_name))?;
        keyword_paths.insert(keyword, path);
    }

    Ok(keyword_paths)
}

/// `hey google_linux.ppn` -> `HeyGoogle`
fn keyword_from_file_name(file_name: &str) -> Option<BuiltinKeyword> {
    if !file_name.ends_with(KEYWORD_FILE_EXTENSION) {
        return None;
    }

    file_name
        .split('_')
        .next()
        .and_then(|name| name.parse().ok())
}

/// Detector configuration
///
/// `DetectorConfig` is what callers build (or load from JSON / the
/// environment). `validate` checks it against a [`Runtime`] and resolves
/// every default, producing the `NormalizedConfig` handed to the engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ArgumentError, PorcupineError, Result};
use crate::keywords::BuiltinKeyword;
use crate::runtime::Runtime;

/// Sensitivity used for every keyword when none are given
pub const DEFAULT_SENSITIVITY: f32 = 0.5;

/// Configuration for a detector session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Picovoice Console access key
    pub access_key: String,

    /// Engine library override (defaults to the runtime's extracted library)
    pub library_path: Option<PathBuf>,

    /// Model file override (defaults to the runtime's extracted model)
    pub model_path: Option<PathBuf>,

    /// One value in [0, 1] per keyword; higher means fewer misses and more false alarms
    pub sensitivities: Option<Vec<f32>>,

    /// Built-in keyword names, e.g. `"porcupine"`, `"hey google"`
    pub keywords: Vec<String>,

    /// Custom keyword files (`.ppn`)
    pub keyword_paths: Vec<PathBuf>,
}

impl DetectorConfig {
    /// Config detecting the given built-in keywords.
    pub fn new_with_keywords<I, K>(access_key: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: ToString,
    {
        Self {
            access_key: access_key.into(),
            keywords: keywords.into_iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Config detecting the keywords in the given keyword files.
    pub fn new_with_keyword_paths<I, P>(access_key: impl Into<String>, keyword_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            access_key: access_key.into(),
            keyword_paths: keyword_paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn sensitivities(mut self, sensitivities: &[f32]) -> Self {
        self.sensitivities = Some(sensitivities.to_vec());
        self
    }

    pub fn model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(model_path.into());
        self
    }

    pub fn library_path(mut self, library_path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(library_path.into());
        self
    }

    /// Add built-in keywords after any already configured.
    pub fn keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: ToString,
    {
        self.keywords.extend(keywords.into_iter().map(|k| k.to_string()));
        self
    }

    /// Add keyword files after any already configured.
    pub fn keyword_paths<I, P>(mut self, keyword_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.keyword_paths.extend(keyword_paths.into_iter().map(Into::into));
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `PORCUPINE_ACCESS_KEY`
    /// - `PORCUPINE_KEYWORDS`: comma separated built-in names
    /// - `PORCUPINE_KEYWORD_PATHS`: platform path list (`:` or `;` separated)
    /// - `PORCUPINE_SENSITIVITIES`: comma separated floats
    /// - `PORCUPINE_MODEL_PATH`, `PORCUPINE_LIBRARY_PATH`
    ///
    /// Missing values are left for [`validate`](Self::validate) to reject.
    pub fn from_env() -> Result<Self> {
        let access_key = std::env::var("PORCUPINE_ACCESS_KEY").unwrap_or_default();

        let keywords = std::env::var("PORCUPINE_KEYWORDS")
            .map(|value| split_list(&value).map(str::to_string).collect())
            .unwrap_or_default();

        let keyword_paths = std::env::var_os("PORCUPINE_KEYWORD_PATHS")
            .map(|value| {
                std::env::split_paths(&value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let sensitivities = match std::env::var("PORCUPINE_SENSITIVITIES") {
            Ok(value) => parse_sensitivities(&value)?,
            Err(_) => None,
        };

        Ok(Self {
            access_key,
            library_path: std::env::var_os("PORCUPINE_LIBRARY_PATH").map(PathBuf::from),
            model_path: std::env::var_os("PORCUPINE_MODEL_PATH").map(PathBuf::from),
            sensitivities,
            keywords,
            keyword_paths,
        })
    }

    /// Check every value and resolve defaults against `runtime`.
    ///
    /// The first violation is reported; nothing is loaded or called.
    pub fn validate(&self, runtime: &Runtime) -> Result<NormalizedConfig> {
        if self.access_key.trim().is_empty() {
            return Err(ArgumentError::MissingAccessKey.into());
        }

        let library_path = resolve(self.library_path.as_deref(), runtime.library_path());
        if !library_path.exists() {
            return Err(ArgumentError::LibraryNotFound(library_path).into());
        }

        let model_path = resolve(self.model_path.as_deref(), runtime.model_path());
        if !model_path.exists() {
            return Err(ArgumentError::ModelNotFound(model_path).into());
        }

        let builtins = self
            .keywords
            .iter()
            .map(|name| name.parse::<BuiltinKeyword>().map_err(PorcupineError::from))
            .collect::<Result<Vec<_>>>()?;

        if self.keyword_paths.is_empty() && builtins.is_empty() {
            return Err(ArgumentError::NoKeywords.into());
        }

        // Explicit paths come first, so they are checked first.
        if let Some(missing) = self.keyword_paths.iter().find(|path| !path.exists()) {
            return Err(ArgumentError::KeywordFileNotFound(missing.clone()).into());
        }

        let mut keyword_paths = self.keyword_paths.clone();
        for keyword in builtins {
            let path = runtime
                .keyword_path(keyword)
                .ok_or_else(|| ArgumentError::KeywordNotBundled(keyword.to_string()))?;
            if !path.exists() {
                return Err(ArgumentError::KeywordFileNotFound(path.to_path_buf()).into());
            }
            keyword_paths.push(path.to_path_buf());
        }

        let sensitivities = match &self.sensitivities {
            None => vec![DEFAULT_SENSITIVITY; keyword_paths.len()],
            Some(values) => {
                if let Some((index, &value)) = values
                    .iter()
                    .enumerate()
                    .find(|(_, value)| !(0.0..=1.0).contains(*value))
                {
                    return Err(ArgumentError::SensitivityOutOfRange { index, value }.into());
                }
                values.clone()
            }
        };

        if keyword_paths.len() != sensitivities.len() {
            return Err(ArgumentError::SensitivityCountMismatch {
                keywords: keyword_paths.len(),
                sensitivities: sensitivities.len(),
            }
            .into());
        }

        debug!(
            "Validated config: {} keyword(s), model {}",
            keyword_paths.len(),
            model_path.display()
        );

        Ok(NormalizedConfig {
            access_key: self.access_key.clone(),
            library_path,
            model_path,
            keyword_paths,
            sensitivities,
        })
    }
}

/// Fully resolved configuration; every path exists and there is one
/// sensitivity in [0, 1] per keyword path.
#[derive(Clone, PartialEq, Serialize)]
pub struct NormalizedConfig {
    #[serde(skip)]
    pub access_key: String,
    pub library_path: PathBuf,
    pub model_path: PathBuf,
    pub keyword_paths: Vec<PathBuf>,
    pub sensitivities: Vec<f32>,
}

// Keeps the access key out of logs.
impl std::fmt::Debug for NormalizedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedConfig")
            .field("access_key", &"<redacted>")
            .field("library_path", &self.library_path)
            .field("model_path", &self.model_path)
            .field("keyword_paths", &self.keyword_paths)
            .field("sensitivities", &self.sensitivities)
            .finish()
    }
}

fn resolve(configured: Option<&Path>, default: &Path) -> PathBuf {
    configured.unwrap_or(default).to_path_buf()
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// An empty list means "use the defaults".
fn parse_sensitivities(value: &str) -> Result<Option<Vec<f32>>> {
    let values = split_list(value)
        .map(|item| {
            item.parse::<f32>()
                .map_err(|_| PorcupineError::from(ArgumentError::MalformedSensitivity(item.to_string())))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(values).filter(|values| !values.is_empty()))
}

//! Pipeline manifest types
//!
//! The manifest is the declarative configuration a pipeline run is
//! instantiated from: a build matrix (runtime versions crossed with
//! operating systems), ordered stage command lists, and an optional
//! deploy section with encrypted credentials. It is consumed verbatim
//! by the runner; nothing here executes anything.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ManifestError, StageError};

/// Declarative pipeline configuration
///
/// Parsed once from YAML at pipeline start; immutable afterwards. One
/// run is instantiated per build-matrix entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Language label used to resolve the runtime binary (e.g. "python")
    pub language: String,

    /// Runtime versions to build against, one matrix axis
    pub runtimes: Vec<String>,

    /// Operating system labels, the other matrix axis
    #[serde(default = "default_os")]
    pub os: Vec<String>,

    /// Global KEY=value pairs exported into every stage command
    #[serde(default)]
    pub env: Vec<String>,

    /// Dependency install commands; failure aborts the run
    #[serde(default)]
    pub before_script: Vec<String>,

    /// Install + test + docs build commands; failure aborts the run
    pub script: Vec<String>,

    /// Best-effort commands run only after the script stage succeeded
    #[serde(default)]
    pub after_success: Vec<String>,

    /// Conditional publish to a package index
    #[serde(default)]
    pub deploy: Option<DeployConfig>,
}

fn default_os() -> Vec<String> {
    vec!["linux".to_string()]
}

/// One cell of the build matrix
///
/// Enumerated once at pipeline start; each entry becomes an
/// independent, isolated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub os: String,
    pub runtime: String,
}

impl std::fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.runtime)
    }
}

/// Deploy stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Provider label, informational only (e.g. "pypi")
    pub provider: String,

    pub username: SecureValue,
    pub password: SecureValue,

    /// Upload endpoint of the package index
    pub index_url: String,

    pub package: PackageSpec,

    /// Gate condition checked against the triggering event
    #[serde(default, rename = "on")]
    pub condition: DeployCondition,

    /// Treat an already-published version as a no-op instead of a failure
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    /// Leave build artifacts untouched around the upload
    #[serde(default = "default_true")]
    pub skip_cleanup: bool,
}

fn default_true() -> bool {
    true
}

/// The package being published
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,

    /// Directory holding the built artifacts to upload
    #[serde(default = "default_artifacts")]
    pub artifacts: String,
}

fn default_artifacts() -> String {
    "dist".to_string()
}

/// Condition gating the deploy stage
///
/// Deploy runs only when the trigger satisfies this condition and all
/// prior fatal stages succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployCondition {
    /// Require the triggering event to be a tag push
    #[serde(default = "default_true")]
    pub tags: bool,

    /// Additionally restrict branch pushes to this branch
    #[serde(default)]
    pub branch: Option<String>,
}

impl Default for DeployCondition {
    fn default() -> Self {
        Self {
            tags: true,
            branch: None,
        }
    }
}

/// A credential value, either literal or encrypted at rest
///
/// The `secure` form is decoded only inside the deploy stage and never
/// persisted outside the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecureValue {
    /// Literal value stored as-is
    Plain(String),
    /// Base64-encoded value decoded at deploy time
    Secure(String),
}

impl SecureValue {
    /// Decodes the value for use
    ///
    /// A malformed secure value is a deploy authentication failure.
    pub fn reveal(&self) -> Result<String, StageError> {
        match self {
            Self::Plain(value) => Ok(value.clone()),
            Self::Secure(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| {
                        StageError::DeployAuth(format!("failed to decode secure value: {}", e))
                    })?;
                String::from_utf8(bytes).map_err(|e| {
                    StageError::DeployAuth(format!("secure value is not valid UTF-8: {}", e))
                })
            }
        }
    }
}

impl Manifest {
    /// Parses a manifest from YAML source
    pub fn from_yaml(source: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(source)?;
        Ok(manifest)
    }

    /// Reads and parses a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    /// Validates the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.language.is_empty() {
            return Err(ManifestError::Invalid("language cannot be empty".into()));
        }

        if self.runtimes.is_empty() {
            return Err(ManifestError::Invalid(
                "at least one runtime version is required".into(),
            ));
        }

        if self.os.is_empty() {
            return Err(ManifestError::Invalid(
                "at least one operating system is required".into(),
            ));
        }

        if self.script.is_empty() {
            return Err(ManifestError::Invalid(
                "script must contain at least one command".into(),
            ));
        }

        for pair in &self.env {
            if !pair.contains('=') {
                return Err(ManifestError::Invalid(format!(
                    "env entry '{}' is not KEY=value",
                    pair
                )));
            }
        }

        if let Some(deploy) = &self.deploy {
            if deploy.index_url.is_empty() {
                return Err(ManifestError::Invalid(
                    "deploy.index_url cannot be empty".into(),
                ));
            }
            if !deploy.index_url.starts_with("http://") && !deploy.index_url.starts_with("https://")
            {
                return Err(ManifestError::Invalid(
                    "deploy.index_url must start with http:// or https://".into(),
                ));
            }
            if deploy.package.name.is_empty() {
                return Err(ManifestError::Invalid(
                    "deploy.package.name cannot be empty".into(),
                ));
            }
            if deploy.package.version.is_empty() {
                return Err(ManifestError::Invalid(
                    "deploy.package.version cannot be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Expands the build matrix
    ///
    /// Cross product of os and runtime axes in declaration order.
    pub fn matrix(&self) -> Vec<MatrixEntry> {
        let mut entries = Vec::with_capacity(self.os.len() * self.runtimes.len());
        for os in &self.os {
            for runtime in &self.runtimes {
                entries.push(MatrixEntry {
                    os: os.clone(),
                    runtime: runtime.clone(),
                });
            }
        }
        entries
    }

    /// Parsed global env pairs
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter_map(|pair| {
                pair.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_MANIFEST: &str = r#"
language: python
runtimes: ["3.6", "3.7"]
os: [linux]
env:
  - CI=true
before_script:
  - pip install -r test_requirements.txt
script:
  - pip install -e .
  - pytest --cov=brahe test/
  - mkdocs build
after_success:
  - coveralls
  - mkdocs gh-deploy --force
deploy:
  provider: pypi
  username:
    plain: uploader
  password:
    secure: aHVudGVyMg==
  index_url: https://index.example.org/legacy/
  package:
    name: brahe
    version: 0.2.0
  on:
    tags: true
  skip_existing: true
  skip_cleanup: true
"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();
        assert_eq!(manifest.language, "python");
        assert_eq!(manifest.runtimes, vec!["3.6", "3.7"]);
        assert_eq!(manifest.script.len(), 3);
        assert_eq!(manifest.after_success.len(), 2);

        let deploy = manifest.deploy.as_ref().unwrap();
        assert!(deploy.condition.tags);
        assert!(deploy.skip_existing);
        assert!(deploy.skip_cleanup);
        assert_eq!(deploy.package.artifacts, "dist");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest = Manifest::from_yaml(
            r#"
language: python
runtimes: ["3.7"]
script:
  - pytest
"#,
        )
        .unwrap();

        assert_eq!(manifest.os, vec!["linux"]);
        assert!(manifest.before_script.is_empty());
        assert!(manifest.after_success.is_empty());
        assert!(manifest.deploy.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = Manifest::from_yaml(
            r#"
language: python
runtimes: ["3.7"]
script: [pytest]
after_sucess: [coveralls]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();

        manifest.runtimes.clear();
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();
        manifest.script.clear();
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();
        manifest.env.push("NOT_A_PAIR".to_string());
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();
        manifest.deploy.as_mut().unwrap().index_url = "ftp://nope".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_matrix_cross_product() {
        let manifest = Manifest::from_yaml(
            r#"
language: python
runtimes: ["3.6", "3.7"]
os: [linux, osx]
script: [pytest]
"#,
        )
        .unwrap();

        let matrix = manifest.matrix();
        assert_eq!(matrix.len(), 4);
        assert_eq!(
            matrix[0],
            MatrixEntry {
                os: "linux".to_string(),
                runtime: "3.6".to_string()
            }
        );
        assert_eq!(matrix[3].os, "osx");
        assert_eq!(matrix[3].runtime, "3.7");
    }

    #[test]
    fn test_env_pairs() {
        let manifest = Manifest::from_yaml(FULL_MANIFEST).unwrap();
        let pairs = manifest.env_pairs();
        assert_eq!(pairs, vec![("CI".to_string(), "true".to_string())]);
    }

    #[test]
    fn test_secure_value_reveal() {
        let plain = SecureValue::Plain("uploader".to_string());
        assert_eq!(plain.reveal().unwrap(), "uploader");

        // "hunter2" in base64
        let secure = SecureValue::Secure("aHVudGVyMg==".to_string());
        assert_eq!(secure.reveal().unwrap(), "hunter2");
    }

    #[test]
    fn test_secure_value_malformed_is_auth_failure() {
        let bad = SecureValue::Secure("not base64!!".to_string());
        let err = bad.reveal().unwrap_err();
        assert!(matches!(err, StageError::DeployAuth(_)));
    }
}

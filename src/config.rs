//! Project configuration (SPEC_FULL.md §1): a `paw.toml` manifest loaded
//! with `serde`+`toml`, mirroring the teacher's settings-file pattern —
//! a plain `#[derive(Deserialize)]` struct with `#[serde(default)]` fields
//! so a minimal or missing manifest still resolves to sensible defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::CompileError;

pub const MANIFEST_FILE_NAME: &str = "paw.toml";
const DEFAULT_ENTRY: &str = "main.paw";
const DEFAULT_STD_ROOT: &str = "std";
const DEFAULT_SOURCE_EXTENSION: &str = "paw";

#[derive(Debug, Clone, Deserialize)]
pub struct PackageSection {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub author: Option<String>,
    pub license: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Entry-point source file, relative to the project root.
    pub entry: String,
    /// Standard-library search root, relative to the project root (spec.md
    /// §6: "a directory under which `a/b/c.<ext>` answers import `a::b::c`").
    pub std_root: String,
    /// Output executable name; defaults to the package name at load time.
    pub output: Option<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        BuildSection {
            entry: DEFAULT_ENTRY.to_owned(),
            std_root: DEFAULT_STD_ROOT.to_owned(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub package: PackageSection,
    #[serde(default)]
    pub build: BuildSection,
}

impl Config {
    /// Loads `<project_root>/paw.toml`. A missing manifest is not an error —
    /// the project root's directory name becomes the package name and every
    /// other field falls back to its default, so `pawc build` works against
    /// a bare directory of `.paw` files during incremental development.
    pub fn load(project_root: &Path) -> Result<Config, CompileError> {
        let manifest_path = project_root.join(MANIFEST_FILE_NAME);
        if !manifest_path.is_file() {
            return Ok(Config::default_for(project_root));
        }
        let text = std::fs::read_to_string(&manifest_path).map_err(|e| CompileError::ConfigError {
            message: format!("{}: {e}", manifest_path.display()),
        })?;
        toml::from_str(&text).map_err(|e| CompileError::ConfigError {
            message: format!("{}: {e}", manifest_path.display()),
        })
    }

    fn default_for(project_root: &Path) -> Config {
        let name = project_root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "paw_project".to_owned());
        Config {
            package: PackageSection {
                name,
                version: default_version(),
                author: None,
                license: None,
            },
            build: BuildSection::default(),
        }
    }

    pub fn entry_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.build.entry)
    }

    pub fn std_root_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.build.std_root)
    }

    pub fn output_name(&self) -> String {
        self.build.output.clone().unwrap_or_else(|| self.package.name.clone())
    }

    pub fn source_extension(&self) -> &'static str {
        DEFAULT_SOURCE_EXTENSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_falls_back_to_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.build.entry, DEFAULT_ENTRY);
        assert_eq!(config.build.std_root, DEFAULT_STD_ROOT);
        assert!(config.build.output.is_none());
    }

    #[test]
    fn minimal_manifest_fills_in_build_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), "[package]\nname = \"demo\"\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.package.name, "demo");
        assert_eq!(config.package.version, "0.1.0");
        assert_eq!(config.build.entry, DEFAULT_ENTRY);
        assert_eq!(config.output_name(), "demo");
    }

    #[test]
    fn full_manifest_overrides_every_field() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            "[package]\nname = \"demo\"\nversion = \"2.0.0\"\nauthor = \"a\"\nlicense = \"MIT\"\n\n[build]\nentry = \"src/entry.paw\"\nstd_root = \"lib\"\noutput = \"demo-bin\"\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.package.version, "2.0.0");
        assert_eq!(config.build.entry, "src/entry.paw");
        assert_eq!(config.output_name(), "demo-bin");
    }

    #[test]
    fn malformed_manifest_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), "not valid toml [[[").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, CompileError::ConfigError { .. }));
    }
}

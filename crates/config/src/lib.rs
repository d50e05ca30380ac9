//! Profile loading and validation.
//!
//! A profile is layered with [`figment`], lowest precedence first:
//!
//! 1. built-in defaults (every field except `provider` has one),
//! 2. the profile file, parsed as YAML, TOML or JSON by extension,
//! 3. `LOFTER_`-prefixed environment variables, with `__` separating nested
//!    keys (`LOFTER_OPTIONS__OVERWRITE=always`).

pub mod error;
mod types;
mod validation;

pub use crate::types::*;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "LOFTER_";
const DEFAULT_PROFILE: &str = "profile.yaml";

impl Config {
    /// Load a profile, falling back to [`default_path()`](Self::default_path).
    ///
    /// The result isn't validated: callers usually add paths from the command
    /// line first, then call [`validate()`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path));
        }
        tracing::debug!(path = %path.display(), "Loading profile");
        let figment = match path.extension().and_then(OsStr::to_str) {
            Some("toml") => Figment::from(Toml::file_exact(&path)),
            Some("json") => Figment::from(Json::file_exact(&path)),
            _ => Figment::from(Yaml::file_exact(&path)),
        };
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Parse a YAML profile, without consulting the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::extract(Figment::from(Yaml::string(yaml)))
    }

    /// `profile.yaml` in the platform's configuration directory for lofter.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "lofter").ok_or_raise(|| ErrorKind::NoConfigDir)?;
        Ok(dirs.config_dir().join(DEFAULT_PROFILE))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    fn extract(figment: Figment) -> Result<Self> {
        Ok(figment.extract().map_err(|e| ErrorKind::Parse(e.to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    const S3_PROFILE: &str = r#"
provider:
  kind: s3
  bucket: my-bucket
  region: us-east-1
  endpoint: https://us-east-1.linodeobjects.com
  key_id: AKIA
  key_secret: secret
  storage_class: STANDARD
  acl: private
options:
  overwrite: always
  heartbeat: 10
objects:
  naming: absolute
  prefix: backups
tag_options:
  checksum_sha256: true
tags:
  team: infra
files: [ /tmp/notes.txt ]
dirs: [ /tmp/photos ]
logging:
  level: debug
  file: /tmp/lofter.log
"#;

    #[test]
    fn test_full_profile() {
        let config = Config::from_yaml(S3_PROFILE).unwrap();
        let Provider::S3(s3) = &config.provider else {
            panic!("expected s3 provider");
        };
        assert_eq!(s3.bucket, "my-bucket");
        assert_eq!(s3.endpoint.as_deref(), Some("https://us-east-1.linodeobjects.com"));
        assert_eq!(s3.acl.as_deref(), Some("private"));
        assert!(!config.provider.create_bucket());
        assert_eq!(config.options.overwrite, Overwrite::Always);
        assert_eq!(config.options.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.objects.naming, Naming::Absolute);
        assert_eq!(config.objects.prefix.as_deref(), Some("backups"));
        assert!(!config.objects.omit_root_dir);
        assert!(config.tag_options.checksum_sha256);
        assert!(!config.tag_options.origin_path);
        assert_eq!(config.tags["team"], "infra");
        assert_eq!(config.files, vec![PathBuf::from("/tmp/notes.txt")]);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.console);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("provider: { kind: local, root: /srv/backup }").unwrap();
        assert_eq!(
            config.provider,
            Provider::Local(LocalProvider {
                root: PathBuf::from("/srv/backup"),
                create_bucket: false,
            })
        );
        assert_eq!(config.options.overwrite, Overwrite::Never);
        assert_eq!(config.options.heartbeat, 5);
        assert_eq!(config.objects, Objects::default());
        assert_eq!(config.logging, Logging::default());
        assert_eq!(config, Config::new(config.provider.clone()));
    }

    #[rstest]
    #[case::no_provider("options: { heartbeat: 5 }")]
    #[case::unknown_kind("provider: { kind: ftp }")]
    #[case::missing_bucket("provider: { kind: s3, region: x, key_id: x, key_secret: x }")]
    #[case::bad_overwrite("provider: { kind: local, root: /x }\noptions: { overwrite: sometimes }")]
    fn test_parse_errors(#[case] yaml: &str) {
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse(_)));
    }

    #[rstest]
    #[case::no_paths("provider: { kind: local, root: /x }", "no files or directories")]
    #[case::empty_bucket(
        "provider: { kind: s3, bucket: '', region: x, key_id: x, key_secret: x }\nfiles: [a]",
        "provider.bucket is required"
    )]
    #[case::empty_root("provider: { kind: local, root: '' }\ndirs: [a]", "provider.root is required")]
    #[case::zero_heartbeat("provider: { kind: local, root: /x }\nfiles: [a]\noptions: { heartbeat: 0 }", "heartbeat")]
    #[case::bad_level("provider: { kind: local, root: /x }\nfiles: [a]\nlogging: { level: loud }", "not a log level")]
    fn test_validation_errors(#[case] yaml: &str, #[case] message: &str) {
        let config = Config::from_yaml(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn test_load_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("profile.yaml");
        std::fs::write(&path, S3_PROFILE).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(matches!(config.provider, Provider::S3(_)));
    }

    #[rstest]
    #[case::toml("profile.toml", "files = [\"a\"]\n[provider]\nkind = \"local\"\nroot = \"/srv\"\n[options]\nheartbeat = 2\n")]
    #[case::json("profile.json", r#"{"files": ["a"], "provider": {"kind": "local", "root": "/srv"}, "options": {"heartbeat": 2}}"#)]
    fn test_load_other_formats(#[case] name: &str, #[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(matches!(config.provider, Provider::Local(_)));
        assert_eq!(config.options.heartbeat, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&temp_dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_default_path() {
        // Only fails on systems without a home directory.
        if let Ok(path) = Config::default_path() {
            assert!(path.ends_with("profile.yaml"));
        }
    }
}

#![forbid(unsafe_code)]

//! Layered settings for the command line tool.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! configuration file, then `SIGILL_` environment variables with `__` as
//! the nesting separator (`SIGILL_POLICY__MAX_REFERENCES=10`). Command line
//! flags are applied on top by the caller.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use sigill_core::ValidationPolicy;
use sigill_dsig::DsigContext;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub policy: ValidationPolicy,
    /// Extra ID attribute names, in addition to `Id`, `ID` and `id`.
    pub id_attrs: Vec<String>,
    /// External URI → local file.
    pub url_maps: HashMap<String, PathBuf>,
    pub base_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_sources(file, None)
    }

    /// Load settings, taking `overrides` (dotted keys) in place of the
    /// process environment when given.
    pub fn load_with_sources(
        file: Option<&Path>,
        overrides: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        if let Some(vars) = overrides {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            builder = builder.add_source(
                Environment::with_prefix("SIGILL")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// A DSig context carrying these settings.
    pub fn dsig_context(&self) -> DsigContext {
        let mut ctx = DsigContext::new().with_policy(self.policy.clone());
        for attr in &self.id_attrs {
            ctx.add_id_attr(attr);
        }
        for (url, file) in &self.url_maps {
            ctx.add_url_map(url, file);
        }
        if let Some(dir) = &self.base_dir {
            ctx = ctx.with_base_dir(dir.clone());
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load_with_sources(None, Some(HashMap::new())).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.policy.secure_validation);
        assert_eq!(settings.policy.max_references, 30);
    }

    #[test]
    fn test_overrides() {
        let mut vars = HashMap::new();
        vars.insert("policy.max_references".to_owned(), "3".to_owned());
        vars.insert("policy.secure_validation".to_owned(), "false".to_owned());
        vars.insert("base_dir".to_owned(), "/srv/xml".to_owned());

        let settings = Settings::load_with_sources(None, Some(vars)).unwrap();
        assert_eq!(settings.policy.max_references, 3);
        assert!(!settings.policy.secure_validation);
        // Untouched fields keep their defaults
        assert_eq!(settings.policy.max_transforms, 5);

        let ctx = settings.dsig_context();
        assert_eq!(ctx.base_dir, Some(PathBuf::from("/srv/xml")));
        assert!(!ctx.policy.secure_validation);
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("sigill-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
id_attrs = ["wsu:Id"]

[policy]
min_rsa_key_bits = 2048

[url_maps]
"http://example.com/data.xml" = "/tmp/data.xml"
"#,
        )
        .unwrap();

        let settings = Settings::load_with_sources(Some(&path), Some(HashMap::new())).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.id_attrs, vec!["wsu:Id".to_owned()]);
        assert_eq!(settings.policy.min_rsa_key_bits, 2048);
        assert_eq!(
            settings.url_maps.get("http://example.com/data.xml"),
            Some(&PathBuf::from("/tmp/data.xml"))
        );

        let ctx = settings.dsig_context();
        assert_eq!(ctx.id_attrs, vec!["wsu:Id".to_owned()]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/sigill.toml");
        assert!(Settings::load_with_sources(Some(missing), Some(HashMap::new())).is_err());
    }
}

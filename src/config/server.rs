use std::{fs::read_to_string, io::ErrorKind, path::PathBuf};

use derive_getters::Getters;
use log::{debug, info};
use serde::Deserialize;

use crate::config::{BackendsConfig, ConfigError, config_home, state_home};

#[derive(Debug, Deserialize, Getters)]
pub struct Config {
    #[serde(default = "metadata_db")]
    metadata_db: PathBuf,
    /// Distinguished name of the organisation mailbox owners belong to.
    #[serde(default = "organization")]
    organization: String,
    #[serde(default)]
    backends: BackendsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_db: metadata_db(),
            organization: organization(),
            backends: BackendsConfig::default(),
        }
    }
}

impl Config {
    /// Loads the given file, or the default location when there is none. A
    /// missing default file means the default configuration.
    pub fn load_from_file(file: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = file.is_some();
        let path = file.unwrap_or_else(default_location);
        match read_to_string(&path) {
            Ok(contents) => {
                debug!("loading config from {}", path.display());
                Self::parse(&contents)
            }
            Err(error) if !explicit && error.kind() == ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.backends.validate()?;
        Ok(config)
    }
}

fn default_location() -> PathBuf {
    let mut config_file = config_home();
    config_file.push("config.toml");
    config_file
}

fn metadata_db() -> PathBuf {
    let mut db = state_home();
    db.push("openchange.db");
    db
}

fn organization() -> String {
    "/o=First Organization/ou=First Administrative Group".to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use assertables::*;
    use rstest::*;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::backend::ContainerRole;

    #[rstest]
    fn test_empty_config_uses_defaults() {
        let config = assert_ok!(Config::parse(""));
        assert_eq!(config.organization(), &organization());
        assert!(config.metadata_db().ends_with("openchange.db"));
        assert_none!(config.backends().template(ContainerRole::Mail));
    }

    #[rstest]
    fn test_backend_templates_are_read() {
        let config = assert_ok!(Config::parse(
            r#"
            metadata_db = "/var/lib/mapirouter/openchange.db"

            [backends]
            fallback = "memory://{owner}/misc/{fid}/"
            calendar = "memory://{owner}/calendar/{fid}/"
            "#
        ));
        assert_eq!(
            config.metadata_db(),
            &PathBuf::from("/var/lib/mapirouter/openchange.db")
        );
        assert_eq!(config.backends().fallback(), "memory://{owner}/misc/{fid}/");
        assert_eq!(
            config.backends().template(ContainerRole::Calendar),
            Some("memory://{owner}/calendar/{fid}/")
        );
    }

    #[rstest]
    #[case::role("[backends]\ncalendar = \"memory://{owner}/calendar/\"", ContainerRole::Calendar)]
    #[case::fallback("[backends]\nfallback = \"memory://{owner}/\"", ContainerRole::Fallback)]
    fn test_templates_must_name_the_folder(#[case] contents: &str, #[case] role: ContainerRole) {
        let ConfigError::SharedTemplate { role: rejected, .. } = assert_err!(Config::parse(contents))
        else {
            panic!("template without {{fid}} should be rejected as shared");
        };
        assert_eq!(rejected, role);
    }

    #[rstest]
    fn test_explicit_config_file_must_exist() {
        let dir = assert_ok!(tempfile::tempdir());
        let missing = dir.path().join("config.toml");
        assert_matches!(
            Config::load_from_file(Some(missing)),
            Err(ConfigError::Read { .. })
        );
    }

    #[rstest]
    fn test_config_file_is_loaded() {
        let mut file = assert_ok!(NamedTempFile::new());
        assert_ok!(writeln!(file, "organization = \"/o=Example\""));
        let config = assert_ok!(Config::load_from_file(Some(file.path().to_path_buf())));
        assert_eq!(config.organization(), "/o=Example");
    }

    #[rstest]
    fn test_templates_must_be_strings() {
        assert_matches!(
            Config::parse("[backends]\nmail = 3"),
            Err(ConfigError::Parse(_))
        );
    }
}

mod backends;
mod server;

use std::env;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::backend::ContainerRole;

pub use backends::BackendsConfig;
pub(crate) use backends::check_template;
pub use server::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} is not readable")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config is not parseable")]
    Parse(#[from] toml::de::Error),
    /// Every root provisioned from a template needs a URI of its own.
    #[error("backend template {template} for {role} does not contain {{fid}}")]
    SharedTemplate {
        role: ContainerRole,
        template: String,
    },
}

fn home() -> PathBuf {
    PathBuf::from_str(&env::var("HOME").expect("HOME should be set"))
        .expect("HOME should be a parseable path")
}

fn xdg_dir(variable: &str, fallback: &str) -> PathBuf {
    let mut dir = if let Ok(dir) = env::var(variable) {
        PathBuf::from_str(&dir).expect("XDG base directory should be a parseable path")
    } else {
        let mut dir = home();
        dir.push(fallback);
        dir
    };
    dir.push(env!("CARGO_PKG_NAME"));
    dir
}

fn config_home() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

fn state_home() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", ".local/state")
}

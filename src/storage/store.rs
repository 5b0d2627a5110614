use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::types::*;
use crate::environment::Environment;

const APP_DIR: &str = "exoscale";
const CONFIG_FILE: &str = "exoscale.toml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no configuration file at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("{}: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("account {0:?} already exists")]
    DuplicateAccount(String),

    #[error("account {name:?} not found")]
    UnknownAccount { name: String, known: Vec<String> },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine the configuration directory (set HOME or XDG_CONFIG_HOME)")]
    NoConfigDir,
}

/// Owns the config file on disk. Never prompts and never prints.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Picks the config file: an explicit path (flag, then `EXOSCALE_CONFIG`)
    /// wins, otherwise `<XDG_CONFIG_HOME or ~/.config>/exoscale/exoscale.toml`.
    pub fn locate(env: &Environment, explicit: Option<&Path>) -> Result<Self, StoreError> {
        if let Some(path) = explicit.or(env.config.as_deref()) {
            return Ok(Self::new(path));
        }
        Ok(Self::new(Self::default_path(env)?))
    }

    pub fn default_path(env: &Environment) -> Result<PathBuf, StoreError> {
        let base = env
            .xdg_config_home
            .clone()
            .filter(|p| p.is_absolute())
            .or_else(|| env.home.as_ref().map(|home| home.join(".config")))
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or(StoreError::NoConfigDir)?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- Raw file access ------------------------------------------------------

    pub fn load(&self) -> Result<Config, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut config: Config = toml::from_str(&contents).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            detail: e.message().to_string(),
        })?;
        config.normalize();
        config
            .check_readable()
            .map_err(|detail| StoreError::Corrupt {
                path: self.path.clone(),
                detail,
            })?;

        debug!(path = %self.path.display(), accounts = config.accounts.len(), "configuration loaded");
        Ok(config)
    }

    /// Like [`load`](Self::load) but an absent file reads as an empty config.
    pub fn load_or_default(&self) -> Result<Config, StoreError> {
        match self.load() {
            Err(StoreError::NotFound { .. }) => Ok(Config::default()),
            other => other,
        }
    }

    /// Writes the whole config through a sibling temp file and a rename, so a
    /// concurrent reader sees either the old or the new file. A config that
    /// breaks an invariant is refused before anything touches the disk.
    pub fn save(&self, config: &Config) -> Result<(), StoreError> {
        config.validate().map_err(StoreError::Invalid)?;
        let contents =
            toml::to_string_pretty(config).map_err(|e| StoreError::Invalid(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&dir)?;

        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".exoscale.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }

        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!(path = %self.path.display(), accounts = config.accounts.len(), "configuration saved");
        Ok(())
    }

    // -- High-level operations ------------------------------------------------

    pub fn add_account(&self, account: Account) -> Result<Config, StoreError> {
        let mut config = self.load_or_default()?;
        config.add_account(account)?;
        self.save(&config)?;
        Ok(config)
    }

    pub fn remove_account(&self, name: &str) -> Result<Account, StoreError> {
        let mut config = self.load()?;
        let removed = config.remove_account(name)?;
        self.save(&config)?;
        Ok(removed)
    }

    pub fn set_default(&self, name: &str) -> Result<(), StoreError> {
        let mut config = self.load()?;
        config.set_default(name)?;
        self.save(&config)
    }

    pub fn update_account(&self, name: &str, update: AccountUpdate) -> Result<(), StoreError> {
        let mut config = self.load()?;
        config.update_account(name, update)?;
        self.save(&config)
    }
}

fn create_private_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

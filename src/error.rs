use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::cli::prompt::PromptError;
use crate::storage::StoreError;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_CONFIG: u8 = 3;
pub const EXIT_CANCELLED: u8 = 130;

pub type CliResult<T> = Result<T, CliError>;

/// Every failure a command invocation can end with. Only the dispatcher turns
/// these into messages and exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("no configuration found at {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("invalid configuration file {}: {detail}", path.display())]
    ConfigCorrupt { path: PathBuf, detail: String },

    #[error("{0}")]
    ConfigInvalid(String),

    #[error("cannot access configuration file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("default account not defined")]
    NoDefaultAccount { dangling: Option<String> },

    #[error("account {name:?} not found")]
    AccountNotFound { name: String, known: Vec<String> },

    #[error("cannot build API client: invalid {field} {value:?}: {reason}")]
    ClientBuild {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{0}")]
    Usage(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::ConfigNotFound { .. }
            | CliError::ConfigCorrupt { .. }
            | CliError::ConfigInvalid(_)
            | CliError::ConfigIo { .. }
            | CliError::NoDefaultAccount { .. }
            | CliError::AccountNotFound { .. }
            | CliError::ClientBuild { .. } => EXIT_CONFIG,
            CliError::Api(_) | CliError::Internal(_) => EXIT_FAILURE,
            CliError::Usage(_) => EXIT_USAGE,
            CliError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// A follow-up line telling the user what to do next, if there is one.
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::ConfigNotFound { .. } => {
                Some("run `exo config add` to configure an account".to_string())
            }
            CliError::NoDefaultAccount { dangling: Some(name) } => Some(format!(
                "the configured default {:?} matches no account; pass --use-account <name> \
                 or run `exo config set-default <name>`",
                name
            )),
            CliError::NoDefaultAccount { dangling: None } => Some(
                "pass --use-account <name> or run `exo config set-default <name>`".to_string(),
            ),
            CliError::AccountNotFound { known, .. } if known.is_empty() => {
                Some("no accounts are configured".to_string())
            }
            CliError::AccountNotFound { known, .. } => {
                Some(format!("known accounts: {}", known.join(", ")))
            }
            _ => None,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { path } => CliError::ConfigNotFound { path },
            StoreError::Corrupt { path, detail } => CliError::ConfigCorrupt { path, detail },
            StoreError::UnknownAccount { name, known } => {
                CliError::AccountNotFound { name, known }
            }
            StoreError::Io { path, source } => CliError::ConfigIo { path, source },
            other @ (StoreError::Invalid(_)
            | StoreError::DuplicateAccount(_)
            | StoreError::NoConfigDir) => CliError::ConfigInvalid(other.to_string()),
        }
    }
}

impl From<PromptError> for CliError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Closed => CliError::Cancelled,
            PromptError::Io(source) => {
                CliError::Internal(anyhow::Error::new(source).context("reading prompt input"))
            }
        }
    }
}

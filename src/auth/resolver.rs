use std::fmt;

use tracing::{debug, warn};

use crate::cli::output::OutputFormat;
use crate::environment::{Environment, ENV_API_TIMEOUT};
use crate::error::{CliError, CliResult};
use crate::storage::{Account, Config, StoreError, DEFAULT_ZONE};

/// Name given to the account synthesised from `EXOSCALE_API_KEY`/`EXOSCALE_API_SECRET`.
pub const ENV_ACCOUNT_NAME: &str = "<environment variables>";

/// Per-invocation choices made on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub use_account: Option<String>,
    pub zone: Option<String>,
    pub output: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSource {
    Environment,
    Override,
    Default,
}

impl fmt::Display for AccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSource::Environment => f.write_str("environment"),
            AccountSource::Override => f.write_str("override"),
            AccountSource::Default => f.write_str("default"),
        }
    }
}

/// The account, zone and output format one invocation runs with.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub account: Account,
    pub zone: String,
    pub output_format: OutputFormat,
    pub source: AccountSource,
}

/// Picks the account, then the zone and output format for it.
///
/// `load` is only called when the environment does not already carry a full
/// set of credentials, so a missing or broken config file does not matter in
/// that case.
pub fn resolve<F>(overrides: &Overrides, env: &Environment, load: F) -> CliResult<ResolvedContext>
where
    F: FnOnce() -> Result<Config, StoreError>,
{
    let (mut account, source) = select_account(overrides, env, load)?;
    apply_timeout_override(env, &mut account);
    let zone = select_zone(overrides, env, &account);
    let output_format = select_output_format(overrides, env, Some(&account))?;

    debug!(
        account = %account.name,
        source = %source,
        zone = %zone,
        output = %output_format,
        "resolved invocation context"
    );

    Ok(ResolvedContext {
        account,
        zone,
        output_format,
        source,
    })
}

fn select_account<F>(
    overrides: &Overrides,
    env: &Environment,
    load: F,
) -> CliResult<(Account, AccountSource)>
where
    F: FnOnce() -> Result<Config, StoreError>,
{
    if let Some((key, secret)) = env.credentials() {
        let mut account = Account::new(ENV_ACCOUNT_NAME, key, secret);
        account.default_zone = Some(env.zone.as_deref().unwrap_or(DEFAULT_ZONE).to_string());
        account.endpoint = env.api_endpoint.clone();
        return Ok((account, AccountSource::Environment));
    }

    let mut config = load()?;

    let requested = overrides.use_account.as_ref().or(env.account.as_ref());
    if let Some(name) = requested {
        return match config.accounts.iter().position(|a| &a.name == name) {
            Some(idx) => Ok((config.accounts.swap_remove(idx), AccountSource::Override)),
            None => Err(CliError::AccountNotFound {
                name: name.clone(),
                known: config.account_names(),
            }),
        };
    }

    let Some(default) = config.default_account.take() else {
        return Err(CliError::NoDefaultAccount { dangling: None });
    };
    match config.accounts.iter().position(|a| a.name == default) {
        Some(idx) => Ok((config.accounts.swap_remove(idx), AccountSource::Default)),
        None => Err(CliError::NoDefaultAccount {
            dangling: Some(default),
        }),
    }
}

/// `EXOSCALE_API_TIMEOUT` replaces the account's timeout. Zero means the
/// default; anything unparseable is ignored.
fn apply_timeout_override(env: &Environment, account: &mut Account) {
    let Some(raw) = env.api_timeout.as_deref() else {
        return;
    };
    match raw.trim().parse::<u64>() {
        Ok(minutes) => account.client_timeout = Some(minutes).filter(|m| *m > 0),
        Err(_) => warn!("ignoring {}={:?}: not a number of minutes", ENV_API_TIMEOUT, raw),
    }
}

fn select_zone(overrides: &Overrides, env: &Environment, account: &Account) -> String {
    overrides
        .zone
        .as_deref()
        .or(env.zone.as_deref())
        .or(account.default_zone.as_deref())
        .unwrap_or(DEFAULT_ZONE)
        .to_string()
}

/// Flag, then `EXO_OUTPUT`, then the account's preference, then table.
pub fn select_output_format(
    overrides: &Overrides,
    env: &Environment,
    account: Option<&Account>,
) -> CliResult<OutputFormat> {
    if let Some(format) = overrides.output {
        return Ok(format);
    }
    if let Some(raw) = &env.output {
        return raw
            .parse()
            .map_err(|e: String| CliError::Usage(format!("EXO_OUTPUT: {}", e)));
    }
    if let Some(raw) = account.and_then(|a| a.default_output_format.as_deref()) {
        match raw.parse() {
            Ok(format) => return Ok(format),
            Err(e) => warn!("ignoring default_output_format: {}", e),
        }
    }
    Ok(OutputFormat::Table)
}

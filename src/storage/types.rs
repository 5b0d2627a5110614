use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::StoreError;

/// Zone used when neither the invocation nor the account names one.
pub const DEFAULT_ZONE: &str = "ch-dk-2";

/// Zones known without asking the API.
pub const KNOWN_ZONES: &[&str] = &[
    "at-vie-1", "at-vie-2", "bg-sof-1", "ch-dk-2", "ch-gva-2", "de-fra-1", "de-muc-1", "hr-zag-1",
];

/// Top-level config file. Stored as `exoscale.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(
        default,
        alias = "defaultAccount",
        alias = "defaultaccount",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_account: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// A named set of API credentials and per-account defaults.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    /// Command printing the secret on stdout. Takes precedence over `secret`.
    #[serde(
        default,
        alias = "secretCommand",
        alias = "secretcommand",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_command: Option<Vec<String>>,
    #[serde(
        default,
        alias = "defaultZone",
        alias = "defaultzone",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// API timeout in minutes.
    #[serde(
        default,
        alias = "clientTimeout",
        alias = "clienttimeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_timeout: Option<u64>,
    #[serde(
        default,
        alias = "defaultOutputFormat",
        alias = "defaultoutputformat",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_output_format: Option<String>,
    /// Extra headers sent with every API request.
    #[serde(
        default,
        alias = "customHeaders",
        alias = "customheaders",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub custom_headers: BTreeMap<String, String>,
}

impl Account {
    pub fn new(name: &str, key: &str, secret: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            secret: secret.to_string(),
            secret_command: None,
            default_zone: None,
            endpoint: None,
            client_timeout: None,
            default_output_format: None,
            custom_headers: BTreeMap::new(),
        }
    }

    pub fn with_zone(mut self, zone: &str) -> Self {
        self.default_zone = Some(zone.to_string());
        self
    }

    pub fn zone_or_default(&self) -> &str {
        self.default_zone.as_deref().unwrap_or(DEFAULT_ZONE)
    }

    /// The secret command, if one with at least a program name is set.
    pub fn secret_command(&self) -> Option<&[String]> {
        self.secret_command
            .as_deref()
            .filter(|argv| argv.first().is_some_and(|p| !p.trim().is_empty()))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .field("secret_command", &self.secret_command)
            .field("default_zone", &self.default_zone)
            .field("endpoint", &self.endpoint)
            .field("client_timeout", &self.client_timeout)
            .field("default_output_format", &self.default_output_format)
            .field(
                "custom_headers",
                &self.custom_headers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Field changes applied by `config update`. `None` leaves a field alone; an
/// empty endpoint clears the override.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub default_zone: Option<String>,
    pub endpoint: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.key.is_none()
            && self.secret.is_none()
            && self.default_zone.is_none()
            && self.endpoint.is_none()
    }
}

impl Config {
    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn account_names(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.name.clone()).collect()
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.default_account.as_deref() == Some(name)
    }

    // -- Mutations ------------------------------------------------------------

    /// Inserts a new account. The first account of an empty config becomes the
    /// default in the same step.
    pub fn add_account(&mut self, account: Account) -> Result<(), StoreError> {
        if account.name.trim().is_empty() {
            return Err(StoreError::Invalid("account name cannot be empty".into()));
        }
        if self.account(&account.name).is_some() {
            return Err(StoreError::DuplicateAccount(account.name));
        }

        let first = self.accounts.is_empty();
        if first {
            self.default_account = Some(account.name.clone());
        }
        self.accounts.push(account);
        Ok(())
    }

    /// Removes an account by name, clearing the default if it pointed there.
    pub fn remove_account(&mut self, name: &str) -> Result<Account, StoreError> {
        let idx = self.position(name)?;
        let removed = self.accounts.remove(idx);
        if self.is_default(name) {
            self.default_account = None;
        }
        Ok(removed)
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), StoreError> {
        self.position(name)?;
        self.default_account = Some(name.to_string());
        Ok(())
    }

    pub fn update_account(&mut self, name: &str, update: AccountUpdate) -> Result<(), StoreError> {
        let idx = self.position(name)?;

        if let Some(new_name) = &update.name {
            if new_name.trim().is_empty() {
                return Err(StoreError::Invalid("account name cannot be empty".into()));
            }
            if new_name != name && self.account(new_name).is_some() {
                return Err(StoreError::DuplicateAccount(new_name.clone()));
            }
        }

        let was_default = self.is_default(name);
        let account = &mut self.accounts[idx];
        if let Some(new_name) = update.name {
            account.name = new_name;
        }
        if let Some(key) = update.key {
            account.key = key;
        }
        if let Some(secret) = update.secret {
            account.secret = secret;
            account.secret_command = None;
        }
        if let Some(zone) = update.default_zone {
            account.default_zone = Some(zone);
        }
        if let Some(endpoint) = update.endpoint {
            account.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }

        if was_default {
            self.default_account = Some(account.name.clone());
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Result<usize, StoreError> {
        self.accounts
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| StoreError::UnknownAccount {
                name: name.to_string(),
                known: self.account_names(),
            })
    }

    // -- Invariants -----------------------------------------------------------

    /// Checks everything a file must satisfy to be read at all: non-empty,
    /// unique account names. A default naming no account is tolerated here and
    /// reported by the resolver instead.
    pub fn check_readable(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err("account with an empty name".to_string());
            }
            if !seen.insert(account.name.as_str()) {
                return Err(format!("duplicate account name {:?}", account.name));
            }
            if account.secret.is_empty() && account.secret_command().is_none() {
                return Err(format!(
                    "account {:?} has neither a secret nor a secret command",
                    account.name
                ));
            }
        }
        Ok(())
    }

    /// Checks everything a file must satisfy to be written.
    pub fn validate(&self) -> Result<(), String> {
        self.check_readable()?;
        if let Some(default) = &self.default_account {
            if !self.accounts.is_empty() && self.account(default).is_none() {
                return Err(format!("default account {:?} matches no account", default));
            }
        }
        Ok(())
    }

    pub(crate) fn normalize(&mut self) {
        if self
            .default_account
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            self.default_account = None;
        }
    }
}

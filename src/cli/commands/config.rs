use async_trait::async_trait;
use clap::{Arg, ArgAction};
use serde::Serialize;
use tracing::warn;

use crate::api::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_MINUTES};
use crate::cli::output::{Output, Record, Tabular};
use crate::cli::prompt::Prompter;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::{CliError, CliResult};
use crate::storage::{Account, AccountUpdate, Config, StoreError, DEFAULT_ZONE, KNOWN_ZONES};

pub fn node() -> Node {
    Node::group("config", "Manage CLI accounts")
        .child(Node::command(Add))
        .child(Node::command(Update))
        .child(Node::command(Delete))
        .child(Node::command(SetDefault))
        .child(Node::command(List))
        .child(Node::command(Show))
}

// The global `--zone` flag doubles as the account's default zone here.
fn account_args() -> Vec<Arg> {
    vec![
        Arg::new("name").long("name").help("Account name"),
        Arg::new("key").long("key").help("API key"),
        Arg::new("secret").long("secret").help("API secret"),
        Arg::new("endpoint")
            .long("endpoint")
            .help("API endpoint, may contain a {zone} placeholder"),
    ]
}

fn name_arg(required: bool) -> Arg {
    Arg::new("NAME").required(required).help("Account name")
}

/// Asks until the answer is non-empty.
async fn ask_required(prompter: &dyn Prompter, label: &str) -> CliResult<String> {
    loop {
        let answer = prompter.ask(label, None).await?;
        if !answer.is_empty() {
            return Ok(answer);
        }
        prompter.notice(&format!("{} cannot be empty", label)).await;
    }
}

fn check_zone(zone: &str) {
    if !KNOWN_ZONES.contains(&zone) {
        warn!("zone {:?} is not a known zone ({})", zone, KNOWN_ZONES.join(", "));
    }
}

// -- add ----------------------------------------------------------------------

pub struct Add;

#[async_trait]
impl Command for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    fn about(&self) -> &'static str {
        "Add a new account to the configuration"
    }

    fn long_about(&self) -> Option<&'static str> {
        Some(
            "Adds an account. Values not given as flags (--zone sets the default zone) \
             are asked for interactively. The first account added becomes the default \
             account.",
        )
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    fn args(&self) -> Vec<Arg> {
        let mut args = account_args();
        args.push(
            Arg::new("default")
                .long("default")
                .action(ArgAction::SetTrue)
                .help("Make the new account the default one"),
        );
        args
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let store = &inv.session.store;
        let prompter = inv.session.prompter.as_ref();

        let existing = store.load_or_default()?;
        if existing.accounts.is_empty() {
            prompter
                .notice(&format!(
                    "No configuration found, creating {}",
                    store.path().display()
                ))
                .await;
        }

        let mut interactive = false;

        let key = match inv.string("key") {
            Some(key) => key,
            None => {
                interactive = true;
                ask_required(prompter, "API Key").await?
            }
        };
        let secret = match inv.string("secret") {
            Some(secret) => secret,
            None => {
                interactive = true;
                ask_required(prompter, "Secret Key").await?
            }
        };
        let name = match inv.string("name") {
            Some(name) => name,
            None => {
                interactive = true;
                let mut name = ask_required(prompter, "Name").await?;
                while existing.account(&name).is_some() {
                    prompter
                        .notice(&format!("Name [{}] already exist", name))
                        .await;
                    name = ask_required(prompter, "Name").await?;
                }
                name
            }
        };
        let zone = match inv.string("zone") {
            Some(zone) => zone,
            None => {
                interactive = true;
                prompter.ask("Default zone", Some(DEFAULT_ZONE)).await?
            }
        };
        check_zone(&zone);

        let mut account = Account::new(&name, &key, &secret).with_zone(&zone);
        account.endpoint = inv.string("endpoint").filter(|e| !e.is_empty());

        let saved = store.add_account(account)?;
        if saved.accounts.len() == 1 {
            return Ok(Output::message(format!(
                "Set [{}] as default account (first account)",
                name
            )));
        }

        let make_default = inv.flag("default")
            || (interactive
                && prompter
                    .confirm(&format!("Set [{}] as default account?", name), false)
                    .await?);
        if make_default {
            store.set_default(&name)?;
            return Ok(Output::message(format!("Set [{}] as default account", name)));
        }
        Ok(Output::message(format!("Account [{}] added", name)))
    }
}

// -- update -------------------------------------------------------------------

pub struct Update;

#[async_trait]
impl Command for Update {
    fn name(&self) -> &'static str {
        "update"
    }

    fn about(&self) -> &'static str {
        "Update an existing account"
    }

    fn long_about(&self) -> Option<&'static str> {
        Some(
            "Updates the given fields of an account. Without any field flag every \
             field is asked for, with the current value as the default.",
        )
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    fn args(&self) -> Vec<Arg> {
        let mut args = vec![name_arg(true)];
        args.extend(account_args());
        args
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let store = &inv.session.store;
        let target = inv.required("NAME")?;

        let mut update = AccountUpdate {
            name: inv.string("name"),
            key: inv.string("key"),
            secret: inv.string("secret"),
            default_zone: inv.string("zone"),
            endpoint: inv.string("endpoint"),
        };

        if update.is_empty() {
            let config = store.load()?;
            let current = config.account(&target).ok_or_else(|| StoreError::UnknownAccount {
                name: target.clone(),
                known: config.account_names(),
            })?;
            update = prompt_update(inv.session.prompter.as_ref(), &config, current).await?;
        }

        if let Some(zone) = &update.default_zone {
            check_zone(zone);
        }

        let new_name = update.name.clone().unwrap_or_else(|| target.clone());
        store.update_account(&target, update)?;
        Ok(Output::message(format!("Account [{}] updated", new_name)))
    }
}

/// Asks for every field; unchanged answers are left out of the update.
async fn prompt_update(
    prompter: &dyn Prompter,
    config: &Config,
    current: &Account,
) -> CliResult<AccountUpdate> {
    let mut update = AccountUpdate::default();

    let mut name = prompter.ask("Name", Some(&current.name)).await?;
    while name != current.name && config.account(&name).is_some() {
        prompter
            .notice(&format!("Name [{}] already exist", name))
            .await;
        name = prompter.ask("Name", Some(&current.name)).await?;
    }
    if name != current.name {
        update.name = Some(name);
    }

    let key = prompter.ask("API Key", Some(&current.key)).await?;
    if key != current.key {
        update.key = Some(key);
    }

    let secret = prompter
        .ask("Secret Key (leave empty to keep the current one)", None)
        .await?;
    if !secret.is_empty() {
        update.secret = Some(secret);
    }

    let zone = prompter
        .ask("Default zone", Some(current.zone_or_default()))
        .await?;
    if current.default_zone.as_deref() != Some(zone.as_str()) {
        update.default_zone = Some(zone);
    }

    let endpoint = prompter
        .ask("Endpoint", current.endpoint.as_deref())
        .await?;
    if current.endpoint.as_deref().unwrap_or("") != endpoint {
        update.endpoint = Some(endpoint);
    }

    Ok(update)
}

// -- delete -------------------------------------------------------------------

pub struct Delete;

#[async_trait]
impl Command for Delete {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn about(&self) -> &'static str {
        "Delete an account from the configuration"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["remove"]
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    fn args(&self) -> Vec<Arg> {
        vec![
            name_arg(true),
            Arg::new("force")
                .long("force")
                .short('f')
                .action(ArgAction::SetTrue)
                .help("Don't ask for confirmation"),
        ]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let store = &inv.session.store;
        let name = inv.required("NAME")?;

        let config = store.load()?;
        if config.account(&name).is_none() {
            return Err(StoreError::UnknownAccount {
                name,
                known: config.account_names(),
            }
            .into());
        }

        if !inv.flag("force")
            && !inv
                .session
                .prompter
                .confirm(
                    &format!("Are you sure you want to delete account [{}]?", name),
                    false,
                )
                .await?
        {
            return Ok(Output::message(format!("Account [{}] kept", name)));
        }

        let was_default = config.is_default(&name);
        store.remove_account(&name)?;

        if was_default {
            return Ok(Output::message(format!(
                "Account [{}] deleted; it was the default account, \
                 pick a new one with `exo config set-default <name>`",
                name
            )));
        }
        Ok(Output::message(format!("Account [{}] deleted", name)))
    }
}

// -- set-default --------------------------------------------------------------

pub struct SetDefault;

#[async_trait]
impl Command for SetDefault {
    fn name(&self) -> &'static str {
        "set-default"
    }

    fn about(&self) -> &'static str {
        "Set the default account"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["set"]
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    fn args(&self) -> Vec<Arg> {
        vec![name_arg(true)]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let name = inv.required("NAME")?;
        inv.session.store.set_default(&name)?;
        Ok(Output::message(format!("Default profile set to [{}]", name)))
    }
}

// -- list ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AccountItem {
    name: String,
    default: bool,
    default_zone: String,
}

impl Tabular for AccountItem {
    const HEADERS: &'static [&'static str] = &["NAME", "DEFAULT", "ZONE"];

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.default { "*".into() } else { String::new() },
            self.default_zone.clone(),
        ]
    }
}

pub struct List;

#[async_trait]
impl Command for List {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List configured accounts"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let config = inv.session.store.load_or_default()?;
        let items: Vec<AccountItem> = config
            .accounts
            .iter()
            .map(|a| AccountItem {
                name: a.name.clone(),
                default: config.is_default(&a.name),
                default_zone: a.zone_or_default().to_string(),
            })
            .collect();
        Output::list(&items)
    }
}

// -- show ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AccountView {
    name: String,
    api_key: String,
    api_secret: String,
    endpoint: String,
    default_zone: String,
    config_file: String,
    client_timeout: u64,
}

impl Record for AccountView {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("API Key", self.api_key.clone()),
            ("API Secret", self.api_secret.clone()),
            ("Endpoint", self.endpoint.clone()),
            ("Default Zone", self.default_zone.clone()),
            ("Configuration File", self.config_file.clone()),
            ("API Timeout (in minutes)", self.client_timeout.to_string()),
        ]
    }
}

pub struct Show;

#[async_trait]
impl Command for Show {
    fn name(&self) -> &'static str {
        "show"
    }

    fn about(&self) -> &'static str {
        "Show an account's details"
    }

    fn long_about(&self) -> Option<&'static str> {
        Some(
            "Shows an account's details with the secret masked. Without NAME the \
             account this invocation would use is shown.",
        )
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    fn args(&self) -> Vec<Arg> {
        vec![name_arg(false)]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let session = inv.session;

        let account = match inv.string("NAME") {
            Some(name) => {
                let config = session.store.load()?;
                match config.account(&name) {
                    Some(account) => account.clone(),
                    None => {
                        return Err(CliError::AccountNotFound {
                            name,
                            known: config.account_names(),
                        })
                    }
                }
            }
            None => session.resolve()?.account,
        };

        Output::record(&AccountView {
            api_secret: match account.secret_command() {
                Some(argv) => argv.join(" "),
                None => "×".repeat(account.key.chars().count()),
            },
            endpoint: account
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            default_zone: account.zone_or_default().to_string(),
            config_file: session.store.path().display().to_string(),
            client_timeout: account.client_timeout.unwrap_or(DEFAULT_TIMEOUT_MINUTES),
            api_key: account.key,
            name: account.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clap::ArgMatches;
    use tempfile::TempDir;

    use super::*;
    use crate::auth::Overrides;
    use crate::cli::dispatch::global_args;
    use crate::cli::prompt::ScriptedPrompter;
    use crate::cli::registry::Session;
    use crate::environment::Environment;
    use crate::storage::ConfigStore;

    struct Fixture {
        _dir: TempDir,
        session: Session,
        prompter: Arc<ScriptedPrompter>,
    }

    fn fixture(answers: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let prompter = Arc::new(ScriptedPrompter::new(answers));
        let session = Session {
            env: Environment::default(),
            overrides: Overrides::default(),
            store: ConfigStore::new(dir.path().join("exoscale").join("exoscale.toml")),
            prompter: prompter.clone(),
            resolved_format: Default::default(),
        };
        Fixture {
            _dir: dir,
            session,
            prompter,
        }
    }

    fn matches(command: &dyn Command, argv: &[&str]) -> ArgMatches {
        clap::Command::new(command.name())
            .args(global_args())
            .args(command.args())
            .try_get_matches_from(std::iter::once(command.name()).chain(argv.iter().copied()))
            .unwrap()
    }

    async fn run(command: &dyn Command, fx: &Fixture, argv: &[&str]) -> CliResult<Output> {
        let args = matches(command, argv);
        let inv = Invocation {
            args: &args,
            session: &fx.session,
            context: None,
            api: None,
        };
        command.execute(&inv).await
    }

    fn message(output: CliResult<Output>) -> String {
        match output.unwrap() {
            Output::Message(text) => text,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn interactive_add_on_fresh_install() {
        let fx = fixture(&["EXOkey", "s3cret", "alice", "ch-gva-2"]);
        let text = message(run(&Add, &fx, &[]).await);
        assert_eq!(text, "Set [alice] as default account (first account)");

        let config = fx.session.store.load().unwrap();
        assert_eq!(config.default_account.as_deref(), Some("alice"));
        assert_eq!(config.accounts[0].default_zone.as_deref(), Some("ch-gva-2"));

        let asked = fx.prompter.asked();
        assert!(asked[0].starts_with("notice: No configuration found"));
        assert_eq!(&asked[1..], ["API Key", "Secret Key", "Name", "Default zone"]);
    }

    #[tokio::test]
    async fn add_reasks_colliding_and_empty_names() {
        let fx = fixture(&["k2", "s2", "", "alice", "bob", "", "y"]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();

        let text = message(run(&Add, &fx, &[]).await);
        assert_eq!(text, "Set [bob] as default account");

        let config = fx.session.store.load().unwrap();
        assert_eq!(config.default_account.as_deref(), Some("bob"));
        assert_eq!(config.account("bob").unwrap().zone_or_default(), DEFAULT_ZONE);
        let asked = fx.prompter.asked();
        assert!(asked.contains(&"notice: Name [alice] already exist".to_string()));
        assert!(asked.contains(&"notice: Name cannot be empty".to_string()));
    }

    #[tokio::test]
    async fn add_with_flags_does_not_prompt() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();

        let argv = ["--name", "bob", "--key", "k", "--secret", "s", "--zone", "de-fra-1"];
        let text = message(run(&Add, &fx, &argv).await);
        assert_eq!(text, "Account [bob] added");
        assert!(fx.prompter.asked().is_empty());
        assert!(fx.session.store.load().unwrap().is_default("alice"));
    }

    #[tokio::test]
    async fn add_cancelled_at_end_of_input_writes_nothing() {
        let fx = fixture(&["EXOkey"]);
        let err = run(&Add, &fx, &[]).await.unwrap_err();
        assert!(matches!(err, CliError::Cancelled));
        assert!(!fx.session.store.path().exists());
    }

    #[tokio::test]
    async fn add_with_duplicate_name_flag_fails() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();
        let argv = ["--name", "alice", "--key", "k", "--secret", "s", "--zone", "ch-dk-2"];
        let err = run(&Add, &fx, &argv).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[tokio::test]
    async fn update_with_flags_renames_default() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();

        let text = message(run(&Update, &fx, &["alice", "--name", "alicia"]).await);
        assert_eq!(text, "Account [alicia] updated");
        assert!(fx.session.store.load().unwrap().is_default("alicia"));
    }

    #[tokio::test]
    async fn update_without_flags_prompts_with_current_values() {
        // keep name, keep key, keep secret, change zone, keep endpoint
        let fx = fixture(&["", "", "", "at-vie-1", ""]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1").with_zone("ch-gva-2"))
            .unwrap();

        message(run(&Update, &fx, &["alice"]).await);
        let config = fx.session.store.load().unwrap();
        let alice = config.account("alice").unwrap();
        assert_eq!(alice.key, "k1");
        assert_eq!(alice.secret, "s1");
        assert_eq!(alice.default_zone.as_deref(), Some("at-vie-1"));
        assert!(alice.endpoint.is_none());
    }

    #[tokio::test]
    async fn delete_default_clears_it() {
        let fx = fixture(&["y"]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();
        fx.session
            .store
            .add_account(Account::new("bob", "k2", "s2"))
            .unwrap();

        let text = message(run(&Delete, &fx, &["alice"]).await);
        assert!(text.contains("set-default"), "{}", text);
        let config = fx.session.store.load().unwrap();
        assert!(config.default_account.is_none());
        assert_eq!(config.account_names(), vec!["bob"]);
    }

    #[tokio::test]
    async fn delete_can_be_declined_or_forced() {
        let fx = fixture(&["n"]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();

        message(run(&Delete, &fx, &["alice"]).await);
        assert!(fx.session.store.load().unwrap().account("alice").is_some());

        message(run(&Delete, &fx, &["alice", "--force"]).await);
        assert!(fx.session.store.load().unwrap().accounts.is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_account_lists_known_ones() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();
        let err = run(&Delete, &fx, &["carol", "--force"]).await.unwrap_err();
        assert_eq!(err.hint().as_deref(), Some("known accounts: alice"));
    }

    #[tokio::test]
    async fn set_default_reports_new_default() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1"))
            .unwrap();
        fx.session
            .store
            .add_account(Account::new("bob", "k2", "s2"))
            .unwrap();

        let text = message(run(&SetDefault, &fx, &["bob"]).await);
        assert_eq!(text, "Default profile set to [bob]");
        assert!(run(&SetDefault, &fx, &["carol"]).await.is_err());
    }

    #[tokio::test]
    async fn list_marks_default() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "k1", "s1").with_zone("de-fra-1"))
            .unwrap();
        fx.session
            .store
            .add_account(Account::new("bob", "k2", "s2"))
            .unwrap();

        match run(&List, &fx, &[]).await.unwrap() {
            Output::List { rows, json, .. } => {
                assert_eq!(rows[0], vec!["alice", "*", "de-fra-1"]);
                assert_eq!(rows[1], vec!["bob", "", DEFAULT_ZONE]);
                assert_eq!(json[0]["default"], true);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn list_of_missing_file_is_empty() {
        let fx = fixture(&[]);
        match run(&List, &fx, &[]).await.unwrap() {
            Output::List { rows, .. } => assert!(rows.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn show_masks_secret() {
        let fx = fixture(&[]);
        fx.session
            .store
            .add_account(Account::new("alice", "EXOk", "s3cret-and-long"))
            .unwrap();

        let output = run(&Show, &fx, &["alice"]).await.unwrap();
        let json = output.to_json();
        assert_eq!(json["api_secret"], "××××");
        assert_eq!(json["client_timeout"], DEFAULT_TIMEOUT_MINUTES);
        assert_eq!(json["endpoint"], DEFAULT_ENDPOINT);
        assert!(!format!("{:?}", output).contains("s3cret"));
    }

    #[tokio::test]
    async fn show_displays_secret_command() {
        let fx = fixture(&[]);
        let mut account = Account::new("alice", "EXOkey", "");
        account.secret_command = Some(vec!["pass".into(), "show".into(), "exoscale".into()]);
        fx.session.store.add_account(account).unwrap();

        let output = run(&Show, &fx, &["alice"]).await.unwrap();
        assert_eq!(output.to_json()["api_secret"], "pass show exoscale");
    }

    #[tokio::test]
    async fn show_without_name_needs_a_default() {
        let fx = fixture(&[]);
        fx.session
            .store
            .save(&Config {
                default_account: None,
                accounts: vec![Account::new("test-account", "k", "s")],
            })
            .unwrap();

        let err = run(&Show, &fx, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "default account not defined");
    }
}

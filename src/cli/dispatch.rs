use std::any::Any;
use std::ffi::OsString;
use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{error::ErrorKind, value_parser, Arg, ArgAction, ArgMatches};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::api::{self, CloudApi};
use crate::auth::{self, Overrides, ResolvedContext};
use crate::environment::Environment;
use crate::error::{CliError, CliResult, EXIT_OK, EXIT_USAGE};
use crate::logging;
use crate::storage::ConfigStore;

use super::output::{Output, OutputFormat, Renderer};
use super::prompt::Prompter;
use super::registry::{Command, Invocation, Registry, Session};

/// Builds the API client for a resolved account. Swappable so tests can run
/// commands against an in-memory provider.
pub type Connector = Arc<
    dyn Fn(ResolvedContext, bool) -> BoxFuture<'static, CliResult<Arc<dyn CloudApi>>>
        + Send
        + Sync,
>;

/// Where results and diagnostics go.
pub struct Terminal {
    pub out: Box<dyn Write + Send>,
    pub err: Box<dyn Write + Send>,
    /// Whether `out` is a terminal; selects box-drawing tables.
    pub decorated: bool,
}

impl Terminal {
    pub fn stdio() -> Self {
        Self {
            decorated: io::stdout().is_terminal(),
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        }
    }
}

/// Global flags, read once per invocation.
#[derive(Debug, Default)]
struct Globals {
    overrides: Overrides,
    config: Option<PathBuf>,
    verbose: bool,
    quiet: bool,
    pretty: bool,
}

impl Globals {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            overrides: Overrides {
                use_account: matches.get_one::<String>("use-account").cloned(),
                zone: matches.get_one::<String>("zone").cloned(),
                output: matches.get_one::<OutputFormat>("output").copied(),
            },
            config: matches.get_one::<PathBuf>("config").cloned(),
            verbose: matches.get_flag("verbose"),
            quiet: matches.get_flag("quiet"),
            pretty: matches.get_flag("pretty"),
        }
    }
}

/// Flags accepted before or after any subcommand.
pub fn global_args() -> Vec<Arg> {
    vec![
        Arg::new("use-account")
            .long("use-account")
            .short('A')
            .value_name("ACCOUNT")
            .global(true)
            .help("Account to use from the configuration file"),
        Arg::new("zone")
            .long("zone")
            .short('z')
            .value_name("ZONE")
            .global(true)
            .help("Zone to operate in"),
        Arg::new("output")
            .long("output")
            .short('O')
            .value_name("FORMAT")
            .value_parser(value_parser!(OutputFormat))
            .global(true)
            .help("Output format"),
        Arg::new("config")
            .long("config")
            .short('C')
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .global(true)
            .help("Path to the configuration file"),
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .action(ArgAction::SetTrue)
            .conflicts_with("quiet")
            .global(true)
            .help("Log debug output, including HTTP requests, to stderr"),
        Arg::new("quiet")
            .long("quiet")
            .short('Q')
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Suppress informational messages"),
        Arg::new("pretty")
            .long("pretty")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Pretty-print JSON output"),
    ]
}

/// Turns argv into exactly one command run, one rendered result and one
/// exit code.
pub struct Dispatcher {
    registry: Registry,
    env: Environment,
    prompter: Arc<dyn Prompter>,
    connect: Connector,
}

impl Dispatcher {
    pub fn new(registry: Registry, env: Environment, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            registry,
            env,
            prompter,
            connect: Arc::new(|ctx: ResolvedContext, trace: bool| {
                async move {
                    let client = api::build(&ctx, trace).await?;
                    let client: Arc<dyn CloudApi> = Arc::new(client);
                    CliResult::Ok(client)
                }
                .boxed()
            }),
        }
    }

    #[cfg(test)]
    pub fn with_connector(mut self, connect: Connector) -> Self {
        self.connect = connect;
        self
    }

    fn root_command(&self) -> clap::Command {
        let root = clap::Command::new("exo")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Manage your Exoscale infrastructure easily")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .args(global_args());
        self.registry.attach(root)
    }

    /// Runs one invocation. `shutdown` resolving first cancels the command.
    pub async fn run<I, T, F>(&self, argv: I, term: &mut Terminal, shutdown: F) -> u8
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        F: Future<Output = ()>,
    {
        let matches = match self.root_command().try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(e) => return usage_error(e, term),
        };

        let mut path = Vec::new();
        let mut leaf = &matches;
        while let Some((name, sub)) = leaf.subcommand() {
            path.push(name);
            leaf = sub;
        }

        let globals = Globals::from_matches(leaf);
        logging::init(globals.verbose || self.env.trace, globals.quiet);
        debug!(command = %path.join(" "), "dispatching");

        let Some(command) = self.registry.lookup(&path) else {
            let err = CliError::Internal(anyhow::anyhow!(
                "no command registered for `{}`",
                path.join(" ")
            ));
            return report(&err, term);
        };

        let work = AssertUnwindSafe(self.execute(command, leaf, &globals)).catch_unwind();
        let outcome = tokio::select! {
            result = work => match result {
                Ok(result) => result,
                Err(panic) => Err(CliError::Internal(anyhow::anyhow!(
                    "command panicked: {}",
                    panic_message(&*panic)
                ))),
            },
            _ = shutdown => Err(CliError::Cancelled),
        };

        match outcome {
            Ok((output, format)) => {
                let renderer = Renderer {
                    format,
                    pretty: globals.pretty,
                    quiet: globals.quiet,
                    decorated: term.decorated,
                };
                let written = renderer
                    .render(&output, &mut *term.out)
                    .and_then(|_| term.out.flush());
                match written {
                    Ok(()) => EXIT_OK,
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => EXIT_OK,
                    Err(e) => report(
                        &CliError::Internal(anyhow::Error::new(e).context("writing output")),
                        term,
                    ),
                }
            }
            Err(err) => report(&err, term),
        }
    }

    async fn execute(
        &self,
        command: &dyn Command,
        args: &ArgMatches,
        globals: &Globals,
    ) -> CliResult<(Output, OutputFormat)> {
        let session = Session {
            env: self.env.clone(),
            overrides: globals.overrides.clone(),
            store: ConfigStore::locate(&self.env, globals.config.as_deref())?,
            prompter: self.prompter.clone(),
            resolved_format: Default::default(),
        };
        let trace_http = globals.verbose || self.env.trace;

        let (context, api, format) = if command.scope().needs_account() {
            let ctx = session.resolve()?;
            debug!(account = %ctx.account.name, source = %ctx.source, "building API client");
            let api = (self.connect)(ctx.clone(), trace_http).await?;
            let format = ctx.output_format;
            (Some(ctx), Some(api), format)
        } else {
            let format = auth::select_output_format(&session.overrides, &session.env, None)?;
            (None, None, format)
        };

        let inv = Invocation {
            args,
            session: &session,
            context,
            api,
        };
        let output = command.execute(&inv).await?;
        // A command that resolved an account on its own renders in that
        // account's format.
        let format = session.resolved_format().unwrap_or(format);
        Ok((output, format))
    }
}

fn usage_error(err: clap::Error, term: &mut Terminal) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(term.out, "{}", err.render());
            EXIT_OK
        }
        _ => {
            let _ = write!(term.err, "{}", err.render());
            EXIT_USAGE
        }
    }
}

fn report(err: &CliError, term: &mut Terminal) -> u8 {
    if let CliError::Internal(e) = err {
        debug!("internal error: {:?}", e);
    }
    let _ = writeln!(term.err, "error: {}", err);
    if let Some(hint) = err.hint() {
        let _ = writeln!(term.err, "hint: {}", hint);
    }
    let _ = term.err.flush();
    err.exit_code()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::commands::fake::{instance, FakeApi};
    use crate::cli::commands::standard;
    use crate::cli::prompt::ScriptedPrompter;
    use crate::cli::registry::{Node, Scope};
    use crate::error::{EXIT_CANCELLED, EXIT_CONFIG, EXIT_FAILURE};
    use crate::storage::{Account, Config};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct Harness {
        dir: TempDir,
        env: Environment,
        zones: Arc<Mutex<Vec<String>>>,
        api: Arc<FakeApi>,
    }

    struct Run {
        code: u8,
        stdout: String,
        stderr: String,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let env = Environment {
                home: Some(dir.path().to_path_buf()),
                ..Default::default()
            };
            Self {
                dir,
                env,
                zones: Default::default(),
                api: Arc::new(FakeApi {
                    instances: vec![instance("1", "ch-gva-2"), instance("2", "ch-gva-2")],
                    ..Default::default()
                }),
            }
        }

        fn store(&self) -> ConfigStore {
            ConfigStore::locate(&self.env, None).unwrap()
        }

        fn write_config(&self, config: &Config) {
            self.store().save(config).unwrap();
        }

        fn dispatcher(&self, registry: Registry) -> Dispatcher {
            let zones = self.zones.clone();
            let api = self.api.clone();
            Dispatcher::new(
                registry,
                self.env.clone(),
                Arc::new(ScriptedPrompter::new(&[])),
            )
            .with_connector(Arc::new(move |ctx: ResolvedContext, _trace: bool| {
                zones.lock().unwrap().push(ctx.zone.clone());
                let client: Arc<dyn CloudApi> = api.clone();
                futures::future::ready(CliResult::Ok(client)).boxed()
            }))
        }

        async fn run_with(&self, registry: Registry, argv: &[&str]) -> Run {
            let out = Buffer::default();
            let err = Buffer::default();
            let mut term = Terminal {
                out: Box::new(out.clone()),
                err: Box::new(err.clone()),
                decorated: false,
            };
            let argv = std::iter::once("exo").chain(argv.iter().copied());
            let code = self
                .dispatcher(registry)
                .run(argv, &mut term, std::future::pending())
                .await;
            Run {
                code,
                stdout: out.text(),
                stderr: err.text(),
            }
        }

        async fn run(&self, argv: &[&str]) -> Run {
            self.run_with(standard(), argv).await
        }
    }

    fn orphan_config() -> Config {
        Config {
            default_account: None,
            accounts: vec![Account::new("test-account", "EXOkey", "secret").with_zone("ch-gva-2")],
        }
    }

    #[tokio::test]
    async fn no_command_prints_help_and_exits_two() {
        let h = Harness::new();
        let run = h.run(&[]).await;
        assert_eq!(run.code, EXIT_USAGE);
        assert!(run.stderr.contains("Usage"), "{}", run.stderr);
        assert!(run.stdout.is_empty());
    }

    #[tokio::test]
    async fn help_goes_to_stdout() {
        let h = Harness::new();
        let run = h.run(&["--help"]).await;
        assert_eq!(run.code, EXIT_OK);
        assert!(run.stdout.contains("compute"));
    }

    #[tokio::test]
    async fn unknown_subcommand_is_a_usage_error() {
        let h = Harness::new();
        assert_eq!(h.run(&["compute", "nope"]).await.code, EXIT_USAGE);
        assert_eq!(h.run(&["compute"]).await.code, EXIT_USAGE);
        assert_eq!(h.run(&["-v", "-Q", "version"]).await.code, EXIT_USAGE);
    }

    #[tokio::test]
    async fn version_renders_as_json() {
        let h = Harness::new();
        let run = h.run(&["-O", "json", "version"]).await;
        assert_eq!(run.code, EXIT_OK);
        assert_eq!(
            run.stdout,
            format!("{{\"version\":\"{}\"}}\n", env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn missing_default_fails_before_client() {
        let h = Harness::new();
        h.write_config(&orphan_config());

        for argv in [
            &["iam", "role", "list"][..],
            &["dns", "domain", "list"],
            &["compute", "instance", "list"],
        ] {
            let run = h.run(argv).await;
            assert_eq!(run.code, EXIT_CONFIG, "{:?}", argv);
            assert!(run.stderr.contains("default account not defined"));
            assert!(run.stderr.contains("--use-account"));
            assert!(run.stdout.is_empty());
        }
        assert!(h.zones.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn use_account_bypasses_missing_default() {
        let h = Harness::new();
        h.write_config(&orphan_config());

        let run = h.run(&["--use-account", "test-account", "iam", "role", "list"]).await;
        assert_eq!(run.code, EXIT_OK, "{}", run.stderr);
        assert!(run.stdout.contains("admin"));

        let run = h.run(&["config", "show", "-A", "test-account"]).await;
        assert_eq!(run.code, EXIT_OK, "{}", run.stderr);
        assert!(run.stdout.contains("test-account"));
    }

    #[tokio::test]
    async fn unknown_account_lists_known_ones() {
        let h = Harness::new();
        h.write_config(&orphan_config());
        let run = h.run(&["-A", "ghost", "iam", "role", "list"]).await;
        assert_eq!(run.code, EXIT_CONFIG);
        assert!(run.stderr.contains("known accounts: test-account"));
    }

    #[tokio::test]
    async fn zone_flag_beats_env_and_account() {
        let mut h = Harness::new();
        h.env.zone = Some("de-fra-1".into());
        let mut config = orphan_config();
        config.default_account = Some("test-account".into());
        h.write_config(&config);

        assert_eq!(h.run(&["compute", "instance", "list"]).await.code, EXIT_OK);
        assert_eq!(
            h.run(&["compute", "instance", "list", "-z", "at-vie-1"]).await.code,
            EXIT_OK
        );
        assert_eq!(*h.zones.lock().unwrap(), vec!["de-fra-1", "at-vie-1"]);
    }

    #[tokio::test]
    async fn exo_output_selects_json() {
        let mut h = Harness::new();
        h.env.output = Some("json".into());
        let mut config = orphan_config();
        config.default_account = Some("test-account".into());
        h.write_config(&config);

        let run = h.run(&["compute", "instance", "list"]).await;
        assert_eq!(run.code, EXIT_OK);
        let parsed: serde_json::Value = serde_json::from_str(&run.stdout).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert!(!run.stdout.contains('│'));
    }

    #[tokio::test]
    async fn bad_exo_output_is_a_usage_error() {
        let mut h = Harness::new();
        h.env.output = Some("yaml".into());
        let run = h.run(&["version"]).await;
        assert_eq!(run.code, EXIT_USAGE);
        assert!(run.stderr.contains("EXO_OUTPUT"));
    }

    #[tokio::test]
    async fn corrupt_config_is_reported_with_path() {
        let h = Harness::new();
        let path = h.store().path().to_path_buf();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "default_account = [").unwrap();

        let run = h.run(&["iam", "role", "list"]).await;
        assert_eq!(run.code, EXIT_CONFIG);
        assert!(run.stderr.contains(&path.display().to_string()));
    }

    #[tokio::test]
    async fn missing_config_suggests_config_add() {
        let h = Harness::new();
        let run = h.run(&["iam", "role", "list"]).await;
        assert_eq!(run.code, EXIT_CONFIG);
        assert!(run.stderr.contains("exo config add"));
    }

    #[tokio::test]
    async fn env_credentials_need_no_config() {
        let mut h = Harness::new();
        h.env.api_key = Some("EXOenv".into());
        h.env.api_secret = Some("secret".into());
        let run = h.run(&["iam", "role", "list"]).await;
        assert_eq!(run.code, EXIT_OK, "{}", run.stderr);
    }

    #[tokio::test]
    async fn config_show_uses_the_resolved_accounts_format() {
        let h = Harness::new();
        let mut account = Account::new("test-account", "EXOkey", "secret");
        account.default_output_format = Some("json".into());
        h.write_config(&Config {
            default_account: Some("test-account".into()),
            accounts: vec![account],
        });

        let run = h.run(&["config", "show"]).await;
        assert_eq!(run.code, EXIT_OK, "{}", run.stderr);
        let parsed: serde_json::Value = serde_json::from_str(&run.stdout).unwrap();
        assert_eq!(parsed["name"], "test-account");

        let run = h.run(&["-O", "table", "config", "show"]).await;
        assert_eq!(run.code, EXIT_OK);
        assert!(serde_json::from_str::<serde_json::Value>(&run.stdout).is_err());
        assert!(run.stdout.contains("test-account"));
    }

    #[tokio::test]
    async fn explicit_config_path_wins() {
        let h = Harness::new();
        let path = h.dir.path().join("elsewhere.toml");
        ConfigStore::new(&path)
            .save(&Config {
                default_account: Some("bob".into()),
                accounts: vec![Account::new("bob", "k", "s")],
            })
            .unwrap();

        let run = h
            .run(&["-C", path.to_str().unwrap(), "config", "list"])
            .await;
        assert_eq!(run.code, EXIT_OK);
        assert!(run.stdout.contains("bob"));
    }

    #[tokio::test]
    async fn quiet_suppresses_messages_only() {
        let h = Harness::new();
        h.write_config(&orphan_config());

        let run = h.run(&["-Q", "config", "set-default", "test-account"]).await;
        assert_eq!(run.code, EXIT_OK);
        assert!(run.stdout.is_empty());

        let run = h.run(&["-Q", "config", "list"]).await;
        assert!(run.stdout.contains("test-account"));
    }

    struct Panics;

    #[async_trait]
    impl Command for Panics {
        fn name(&self) -> &'static str {
            "boom"
        }

        fn about(&self) -> &'static str {
            "panics"
        }

        fn scope(&self) -> Scope {
            Scope::NoAuth
        }

        async fn execute(&self, _inv: &Invocation<'_>) -> CliResult<Output> {
            panic!("kaboom")
        }
    }

    struct Sleeps;

    #[async_trait]
    impl Command for Sleeps {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn about(&self) -> &'static str {
            "sleeps"
        }

        fn scope(&self) -> Scope {
            Scope::NoAuth
        }

        async fn execute(&self, _inv: &Invocation<'_>) -> CliResult<Output> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Output::message("woke up"))
        }
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let h = Harness::new();
        let run = h
            .run_with(Registry::new().mount(Node::command(Panics)), &["boom"])
            .await;
        assert_eq!(run.code, EXIT_FAILURE);
        assert!(run.stderr.contains("internal error"));
        assert!(run.stderr.contains("kaboom"));
    }

    #[tokio::test]
    async fn shutdown_cancels_the_command() {
        let h = Harness::new();
        let out = Buffer::default();
        let err = Buffer::default();
        let mut term = Terminal {
            out: Box::new(out.clone()),
            err: Box::new(err.clone()),
            decorated: false,
        };

        let code = h
            .dispatcher(Registry::new().mount(Node::command(Sleeps)))
            .run(
                ["exo", "sleep"],
                &mut term,
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await;

        assert_eq!(code, EXIT_CANCELLED);
        assert!(out.text().is_empty());
        assert!(err.text().contains("cancelled"));
    }
}

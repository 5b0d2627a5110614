use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::{Arg, ArgMatches};

use crate::api::CloudApi;
use crate::auth::{self, Overrides, ResolvedContext};
use crate::environment::Environment;
use crate::error::{CliError, CliResult};
use crate::storage::ConfigStore;

use super::output::{Output, OutputFormat};
use super::prompt::Prompter;

/// What a command needs resolved before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    NoAuth,
    Account,
    AccountZone,
}

impl Scope {
    pub fn needs_account(self) -> bool {
        !matches!(self, Scope::NoAuth)
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn about(&self) -> &'static str;

    fn long_about(&self) -> Option<&'static str> {
        None
    }

    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn scope(&self) -> Scope;

    /// Flags and positionals local to this command.
    fn args(&self) -> Vec<Arg> {
        Vec::new()
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output>;
}

/// Everything shared by the commands of one invocation.
pub struct Session {
    pub env: Environment,
    pub overrides: Overrides,
    pub store: ConfigStore,
    pub prompter: Arc<dyn Prompter>,
    /// Output format of the last account resolved through [`Session::resolve`].
    pub resolved_format: Mutex<Option<OutputFormat>>,
}

impl Session {
    /// Resolves the account for commands that only sometimes need one.
    pub fn resolve(&self) -> CliResult<ResolvedContext> {
        let ctx = auth::resolve(&self.overrides, &self.env, || self.store.load())?;
        if let Ok(mut format) = self.resolved_format.lock() {
            *format = Some(ctx.output_format);
        }
        Ok(ctx)
    }

    pub fn resolved_format(&self) -> Option<OutputFormat> {
        self.resolved_format.lock().ok().and_then(|format| *format)
    }
}

/// A command's view of the current invocation.
pub struct Invocation<'a> {
    pub args: &'a ArgMatches,
    pub session: &'a Session,
    pub context: Option<ResolvedContext>,
    pub api: Option<Arc<dyn CloudApi>>,
}

impl Invocation<'_> {
    pub fn context(&self) -> CliResult<&ResolvedContext> {
        self.context
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("command ran without a resolved account").into())
    }

    pub fn api(&self) -> CliResult<&dyn CloudApi> {
        self.api
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("command ran without an API client").into())
    }

    pub fn zone(&self) -> CliResult<&str> {
        Ok(self.context()?.zone.as_str())
    }

    pub fn string(&self, id: &str) -> Option<String> {
        self.args.try_get_one::<String>(id).ok().flatten().cloned()
    }

    pub fn required(&self, id: &str) -> CliResult<String> {
        self.string(id)
            .ok_or_else(|| CliError::Usage(format!("missing argument <{}>", id.to_uppercase())))
    }

    pub fn flag(&self, id: &str) -> bool {
        self.args
            .try_get_one::<bool>(id)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
    }
}

/// A node of the command tree: either a group of subcommands or a leaf.
pub enum Node {
    Group {
        name: &'static str,
        about: &'static str,
        aliases: &'static [&'static str],
        children: Vec<Node>,
    },
    Command(Box<dyn Command>),
}

impl Node {
    pub fn group(name: &'static str, about: &'static str) -> Self {
        Node::Group {
            name,
            about,
            aliases: &[],
            children: Vec::new(),
        }
    }

    pub fn command(command: impl Command + 'static) -> Self {
        Node::Command(Box::new(command))
    }

    pub fn alias(mut self, alias: &'static [&'static str]) -> Self {
        if let Node::Group { aliases, .. } = &mut self {
            *aliases = alias;
        }
        self
    }

    pub fn child(mut self, node: Node) -> Self {
        if let Node::Group { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Node::Group { name, .. } => name,
            Node::Command(command) => command.name(),
        }
    }

    fn to_clap(&self) -> clap::Command {
        match self {
            Node::Group {
                name,
                about,
                aliases,
                children,
            } => children.iter().fold(
                clap::Command::new(*name)
                    .about(*about)
                    .visible_aliases(aliases.iter().copied())
                    .subcommand_required(true)
                    .arg_required_else_help(true),
                |cmd, child| cmd.subcommand(child.to_clap()),
            ),
            Node::Command(command) => {
                let mut cmd = clap::Command::new(command.name())
                    .about(command.about())
                    .visible_aliases(command.aliases().iter().copied())
                    .args(command.args());
                if let Some(long) = command.long_about() {
                    cmd = cmd.long_about(long);
                }
                cmd
            }
        }
    }
}

/// The command tree. Built once at startup, read-only afterwards.
#[derive(Default)]
pub struct Registry {
    roots: Vec<Node>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(mut self, node: Node) -> Self {
        self.roots.push(node);
        self
    }

    /// Exact lookup by canonical names, e.g. `["compute", "instance", "list"]`.
    pub fn lookup(&self, path: &[&str]) -> Option<&dyn Command> {
        let (last, parents) = path.split_last()?;
        let mut level = &self.roots;
        for segment in parents {
            level = match level.iter().find(|n| n.name() == *segment)? {
                Node::Group { children, .. } => children,
                Node::Command(_) => return None,
            };
        }
        match level.iter().find(|n| n.name() == *last)? {
            Node::Command(command) => Some(command.as_ref()),
            Node::Group { .. } => None,
        }
    }

    /// Attaches the whole tree to a root clap command.
    pub fn attach(&self, root: clap::Command) -> clap::Command {
        self.roots
            .iter()
            .fold(root, |cmd, node| cmd.subcommand(node.to_clap()))
    }
}

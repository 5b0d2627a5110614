mod compute;
mod config;
mod dbaas;
mod dns;
mod iam;
mod storage;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CliResult;

use super::output::{Output, Record};
use super::registry::{Command, Invocation, Node, Registry, Scope};

/// The full command tree shipped with the binary.
pub fn standard() -> Registry {
    Registry::new()
        .mount(Node::command(Version))
        .mount(config::node())
        .mount(compute::node())
        .mount(dns::node())
        .mount(dbaas::node())
        .mount(iam::node())
        .mount(storage::node())
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: &'static str,
}

impl Record for VersionInfo {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("Version", self.version.to_string())]
    }
}

pub struct Version;

#[async_trait]
impl Command for Version {
    fn name(&self) -> &'static str {
        "version"
    }

    fn about(&self) -> &'static str {
        "Print the version of exo"
    }

    fn scope(&self) -> Scope {
        Scope::NoAuth
    }

    async fn execute(&self, _inv: &Invocation<'_>) -> CliResult<Output> {
        Output::record(&VersionInfo {
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}

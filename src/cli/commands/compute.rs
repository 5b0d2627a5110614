use async_trait::async_trait;
use clap::{Arg, ArgAction};
use futures::future::try_join_all;
use tracing::debug;

use crate::cli::output::Output;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::CliResult;
use crate::storage::KNOWN_ZONES;

pub fn node() -> Node {
    Node::group("compute", "Compute services management").child(
        Node::group("instance", "Compute instances management")
            .child(Node::command(InstanceList))
            .child(Node::command(InstanceShow)),
    )
}

pub struct InstanceList;

#[async_trait]
impl Command for InstanceList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List compute instances"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::AccountZone
    }

    fn args(&self) -> Vec<Arg> {
        vec![Arg::new("all-zones")
            .long("all-zones")
            .action(ArgAction::SetTrue)
            .help("List instances in every known zone")]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let api = inv.api()?;

        let zones: Vec<&str> = if inv.flag("all-zones") {
            KNOWN_ZONES.to_vec()
        } else {
            vec![inv.zone()?]
        };
        debug!(?zones, "listing instances");

        let per_zone = try_join_all(zones.iter().map(|zone| api.list_instances(zone))).await?;
        let instances: Vec<_> = per_zone.into_iter().flatten().collect();
        Output::list(&instances)
    }
}

pub struct InstanceShow;

#[async_trait]
impl Command for InstanceShow {
    fn name(&self) -> &'static str {
        "show"
    }

    fn about(&self) -> &'static str {
        "Show a compute instance's details"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["get"]
    }

    fn scope(&self) -> Scope {
        Scope::AccountZone
    }

    fn args(&self) -> Vec<Arg> {
        vec![Arg::new("ID").required(true).help("Instance ID")]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let id = inv.required("ID")?;
        let instance = inv.api()?.get_instance(inv.zone()?, &id).await?;
        Output::record(&instance)
    }
}

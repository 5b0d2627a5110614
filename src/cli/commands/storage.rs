use async_trait::async_trait;
use clap::{Arg, ArgAction};

use crate::cli::output::Output;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::CliResult;

pub fn node() -> Node {
    Node::group("storage", "Object Storage management")
        .alias(&["sos"])
        .child(Node::group("bucket", "Object Storage buckets").child(Node::command(BucketList)))
}

pub struct BucketList;

#[async_trait]
impl Command for BucketList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List buckets with their usage"
    }

    fn long_about(&self) -> Option<&'static str> {
        Some("Lists the buckets of the current zone, or of every zone with --all-zones.")
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
            .help("List buckets of every zone")]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let zone = inv.zone()?;
        let mut buckets = inv.api()?.list_bucket_usage(zone).await?;
        if !inv.flag("all-zones") {
            buckets.retain(|b| b.zone == zone);
        }
        Output::list(&buckets)
    }
}

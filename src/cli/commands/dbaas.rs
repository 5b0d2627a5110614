use async_trait::async_trait;

use crate::cli::output::Output;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::CliResult;

pub fn node() -> Node {
    Node::group("dbaas", "Database as a Service management").child(Node::command(ServiceList))
}

pub struct ServiceList;

#[async_trait]
impl Command for ServiceList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List Database Services"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::AccountZone
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let services = inv.api()?.list_dbaas_services(inv.zone()?).await?;
        Output::list(&services)
    }
}

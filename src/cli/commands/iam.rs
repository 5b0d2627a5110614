use async_trait::async_trait;

use crate::cli::output::Output;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::CliResult;

pub fn node() -> Node {
    Node::group("iam", "Identity and Access Management")
        .child(Node::group("role", "IAM Role management").child(Node::command(RoleList)))
}

pub struct RoleList;

#[async_trait]
impl Command for RoleList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List IAM Roles"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::Account
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let roles = inv.api()?.list_iam_roles(inv.zone()?).await?;
        Output::list(&roles)
    }
}

use async_trait::async_trait;
use clap::Arg;

use crate::cli::output::Output;
use crate::cli::registry::{Command, Invocation, Node, Scope};
use crate::error::CliResult;

pub fn node() -> Node {
    Node::group("dns", "DNS cmd lets you host your zones and manage records")
        .child(Node::group("domain", "DNS domains management").child(Node::command(DomainList)))
        .child(Node::group("record", "DNS records management").child(Node::command(RecordList)))
}

pub struct DomainList;

#[async_trait]
impl Command for DomainList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List domains"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::Account
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let domains = inv.api()?.list_dns_domains(inv.zone()?).await?;
        Output::list(&domains)
    }
}

pub struct RecordList;

#[async_trait]
impl Command for RecordList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn about(&self) -> &'static str {
        "List the records of a domain"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ls"]
    }

    fn scope(&self) -> Scope {
        Scope::Account
    }

    fn args(&self) -> Vec<Arg> {
        vec![Arg::new("DOMAIN_ID").required(true).help("Domain ID")]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> CliResult<Output> {
        let domain = inv.required("DOMAIN_ID")?;
        let records = inv.api()?.list_dns_records(inv.zone()?, &domain).await?;
        Output::list(&records)
    }
}

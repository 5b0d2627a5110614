use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use crate::auth::{Credentials, ResolvedContext};
use crate::error::{CliError, CliResult};
use crate::storage::Account;

use super::ApiClient;

pub const DEFAULT_ENDPOINT: &str = "https://api-{zone}.exoscale.com/v2";
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 20;

/// Expands an endpoint template for `zone` and checks that the result is a
/// usable HTTP(S) URL.
pub fn endpoint_url(template: &str, zone: &str) -> Result<Url, String> {
    let url = Url::parse(&template.replace("{zone}", zone)).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {:?}", other)),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// Builds a fresh API client for the resolved account.
pub async fn build(ctx: &ResolvedContext, trace_http: bool) -> CliResult<ApiClient> {
    let account = &ctx.account;

    let template = account
        .endpoint
        .as_deref()
        .unwrap_or(DEFAULT_ENDPOINT)
        .trim_end_matches('/');
    endpoint_url(template, &ctx.zone).map_err(|reason| CliError::ClientBuild {
        field: "endpoint",
        value: template.to_string(),
        reason,
    })?;

    if account.key.trim().is_empty() {
        return Err(CliError::ClientBuild {
            field: "key",
            value: String::new(),
            reason: "API key is empty".to_string(),
        });
    }

    let minutes = account
        .client_timeout
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_TIMEOUT_MINUTES);
    let timeout = minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| CliError::ClientBuild {
            field: "client_timeout",
            value: minutes.to_string(),
            reason: "timeout in minutes is too large".to_string(),
        })?;

    let headers = custom_headers(account)?;
    let secret = account_secret(account).await?;

    let http = Client::builder()
        .user_agent(concat!("exo/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("building HTTP client")?;

    debug!(
        account = %account.name,
        endpoint = template,
        timeout_secs = timeout.as_secs(),
        custom_headers = account.custom_headers.len(),
        "API client ready"
    );

    Ok(ApiClient::new(
        http,
        template,
        Credentials::new(&account.key, &secret),
        trace_http,
    ))
}

fn custom_headers(account: &Account) -> CliResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &account.custom_headers {
        let invalid = |reason: String| CliError::ClientBuild {
            field: "custom_headers",
            value: name.clone(),
            reason,
        };
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

/// The account's secret, running its secret command when it has one. The
/// command shares the terminal's stdin and stderr; its stdout is the secret.
pub async fn account_secret(account: &Account) -> CliResult<String> {
    let Some(argv) = account.secret_command() else {
        return Ok(account.secret.clone());
    };
    let failed = |reason: String| CliError::ClientBuild {
        field: "secret_command",
        value: argv.join(" "),
        reason,
    };

    debug!(account = %account.name, program = %argv[0], "running secret command");
    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| failed(e.to_string()))?;

    if !output.status.success() {
        return Err(failed(format!("command exited with {}", output.status)));
    }
    let secret = String::from_utf8(output.stdout)
        .map_err(|_| failed("output is not valid UTF-8".to_string()))?;
    let secret = secret.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        return Err(failed("command printed nothing".to_string()));
    }
    Ok(secret.to_string())
}

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::{redact_header, Credentials};

use super::{
    ApiError, BucketLister, BucketUsage, DatabaseLister, DbaasService, DnsDomain, DnsRecord,
    DomainLister, IamRole, Instance, InstanceLister, RoleLister,
};

/// Signed REST client for one account. The endpoint is a template whose
/// `{zone}` placeholder is filled per request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: String,
    credentials: Credentials,
    trace: bool,
}

impl ApiClient {
    pub fn new(http: Client, endpoint: &str, credentials: Credentials, trace: bool) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            trace,
        }
    }

    pub fn url(&self, zone: &str, path: &str) -> Result<Url, ApiError> {
        let base = self.endpoint.replace("{zone}", zone);
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    async fn get<T: DeserializeOwned>(&self, zone: &str, path: &str) -> Result<T, ApiError> {
        let url = self.url(zone, path)?;
        let authorization = self
            .credentials
            .sign_now(Method::GET.as_str(), &url, b"")
            .map_err(|e| ApiError::Signing(e.to_string()))?;

        let request = self
            .http
            .request(Method::GET, url)
            .header(AUTHORIZATION, authorization)
            .build()?;

        if self.trace {
            debug!(method = %request.method(), url = %request.url(), "http request");
            for (name, value) in request.headers() {
                debug!(
                    "  > {}: {}",
                    name,
                    redact_header(name.as_str(), value.to_str().unwrap_or("<binary>"))
                );
            }
        }

        let response = self.http.execute(request).await?;
        let status = response.status();
        if self.trace {
            debug!(status = status.as_u16(), "http response");
            for (name, value) in response.headers() {
                debug!(
                    "  < {}: {}",
                    name,
                    redact_header(name.as_str(), value.to_str().unwrap_or("<binary>"))
                );
            }
        }

        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Fetches a collection wrapped in an object under `key`. A missing key
    /// means an empty collection.
    async fn list<T: DeserializeOwned>(
        &self,
        zone: &str,
        path: &str,
        key: &str,
    ) -> Result<Vec<T>, ApiError> {
        let mut body: Value = self.get(zone, path).await?;
        match body.get_mut(key).map(Value::take) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(items) => serde_json::from_value(items)
                .map_err(|e| ApiError::Decode(format!("{}: {}", key, e))),
        }
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

#[async_trait]
impl InstanceLister for ApiClient {
    async fn list_instances(&self, zone: &str) -> Result<Vec<Instance>, ApiError> {
        let mut instances: Vec<Instance> = self.list(zone, "/instance", "instances").await?;
        for instance in &mut instances {
            instance.zone = zone.to_string();
        }
        Ok(instances)
    }

    async fn get_instance(&self, zone: &str, id: &str) -> Result<Instance, ApiError> {
        let mut instance: Instance = self.get(zone, &format!("/instance/{}", id)).await?;
        instance.zone = zone.to_string();
        Ok(instance)
    }
}

#[async_trait]
impl DomainLister for ApiClient {
    async fn list_dns_domains(&self, zone: &str) -> Result<Vec<DnsDomain>, ApiError> {
        self.list(zone, "/dns-domain", "dns-domains").await
    }

    async fn list_dns_records(
        &self,
        zone: &str,
        domain_id: &str,
    ) -> Result<Vec<DnsRecord>, ApiError> {
        self.list(
            zone,
            &format!("/dns-domain/{}/record", domain_id),
            "dns-domain-records",
        )
        .await
    }
}

#[async_trait]
impl DatabaseLister for ApiClient {
    async fn list_dbaas_services(&self, zone: &str) -> Result<Vec<DbaasService>, ApiError> {
        self.list(zone, "/dbaas-service", "dbaas-services").await
    }
}

#[async_trait]
impl RoleLister for ApiClient {
    async fn list_iam_roles(&self, zone: &str) -> Result<Vec<IamRole>, ApiError> {
        self.list(zone, "/iam-role", "iam-roles").await
    }
}

#[async_trait]
impl BucketLister for ApiClient {
    async fn list_bucket_usage(&self, zone: &str) -> Result<Vec<BucketUsage>, ApiError> {
        self.list(zone, "/sos-buckets-usage", "sos-buckets-usage")
            .await
    }
}

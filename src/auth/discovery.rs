/// OIDC Provider Discovery
///
/// Fetches `/.well-known/openid-configuration` so deployments only need to
/// configure the issuer.
use serde::{Deserialize, Serialize};

use super::client::ProviderError;

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Subset of the provider metadata document used by the flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    pub async fn discover(
        issuer: &str,
        http_client: &reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let url = discovery_url(issuer)?;
        tracing::info!(issuer, %url, "Discovering OIDC provider");

        let response = http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        // OpenID Connect Discovery 1.0, section 4.3
        if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(ProviderError::Decode(format!(
                "issuer mismatch: expected {}, provider reports {}",
                issuer, metadata.issuer
            )));
        }

        Ok(metadata)
    }
}

fn discovery_url(issuer: &str) -> Result<url::Url, ProviderError> {
    let base = format!("{}/", issuer.trim_end_matches('/'));
    Ok(url::Url::parse(&base)?.join(DISCOVERY_PATH)?)
}

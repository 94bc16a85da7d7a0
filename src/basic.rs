use crate::error::{FetchError, FetchResult};
use aws_config::{
    meta::region::RegionProviderChain, retry::RetryConfig, BehaviorVersion, Region, SdkConfig,
};
use aws_credential_types::{
    provider::{error::CredentialsError, ProvideCredentials, SharedCredentialsProvider},
    Credentials,
};
use aws_sdk_s3::{error::DisplayErrorContext, Client};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_REGION: &str = "us-east-1";

pub type ResultCallback = Box<dyn Fn(bool, String) + Send + Sync>;
pub type ProgressCallback = Box<dyn Fn(&str, &Path) + Send + Sync>;

/// Parameters of one fetch run, passed to the library as json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchParams {
    pub(crate) bucket: String,
    pub(crate) local_folder: String,
    #[serde(default)]
    pub(crate) prefix: String,
    #[serde(default)]
    pub(crate) region: Option<String>,
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
    #[serde(default)]
    pub(crate) profile: Option<String>,
    #[serde(default)]
    pub(crate) force_path_style: bool,
}

impl FetchParams {
    pub fn new(bucket: impl Into<String>, local_folder: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            local_folder: local_folder.into(),
            prefix: String::new(),
            region: None,
            endpoint: None,
            profile: None,
            force_path_style: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Settings for `init`, passed as json.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InitConfig {
    #[serde(default)]
    pub(crate) log_path: Option<String>,
    #[serde(default)]
    pub(crate) log_level: Option<String>,
}

/// Load the shared sdk config from the ambient environment.
/// Region is taken from params first, then the default chain.
pub async fn load_sdk_config(params: &FetchParams) -> SdkConfig {
    let region = RegionProviderChain::first_try(params.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        // A single attempt per request, failures abort the batch.
        .retry_config(RetryConfig::disabled());
    if let Some(profile) = &params.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &params.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

pub fn create_s3_client(config: &SdkConfig, params: &FetchParams) -> Client {
    let s3_config = aws_sdk_s3::config::Builder::from(config)
        .force_path_style(params.force_path_style)
        .build();
    Client::from_conf(s3_config)
}

/// Resolve credentials once and sort failures into the reported tiers.
pub async fn resolve_credentials(
    provider: Option<&SharedCredentialsProvider>,
) -> FetchResult<Credentials> {
    let provider = provider.ok_or(FetchError::CredentialsNotFound)?;
    let credentials = provider.provide_credentials().await.map_err(|err| {
        debug!("credential resolution failed: {}", DisplayErrorContext(&err));
        match &err {
            CredentialsError::CredentialsNotLoaded(_) => FetchError::CredentialsNotFound,
            CredentialsError::InvalidConfiguration(_) => {
                FetchError::CredentialsIncomplete(DisplayErrorContext(&err).to_string())
            }
            _ => FetchError::S3(DisplayErrorContext(&err).to_string()),
        }
    })?;
    debug!("resolved credentials with access key id {}", credentials.access_key_id());
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::future;

    #[derive(Debug)]
    struct StubCredential(fn() -> aws_credential_types::provider::Result);

    impl ProvideCredentials for StubCredential {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready((self.0)())
        }
    }

    fn provider(outcome: fn() -> aws_credential_types::provider::Result) -> SharedCredentialsProvider {
        SharedCredentialsProvider::new(StubCredential(outcome))
    }

    #[tokio::test]
    async fn test_resolve_credentials() {
        let ok = provider(|| Ok(Credentials::new("AKID", "SECRET", None, None, "stub")));
        let credentials = resolve_credentials(Some(&ok)).await.unwrap();
        assert_eq!(credentials.access_key_id(), "AKID");

        let err = resolve_credentials(None).await.unwrap_err();
        assert!(matches!(err, FetchError::CredentialsNotFound));

        let not_loaded = provider(|| Err(CredentialsError::not_loaded("no providers in chain")));
        let err = resolve_credentials(Some(&not_loaded)).await.unwrap_err();
        assert!(matches!(err, FetchError::CredentialsNotFound));

        let partial = provider(|| {
            Err(CredentialsError::invalid_configuration(
                "profile has aws_access_key_id but no aws_secret_access_key",
            ))
        });
        let err = resolve_credentials(Some(&partial)).await.unwrap_err();
        assert!(matches!(err, FetchError::CredentialsIncomplete(_)));

        let broken = provider(|| Err(CredentialsError::provider_error("sts unreachable")));
        let err = resolve_credentials(Some(&broken)).await.unwrap_err();
        assert!(matches!(err, FetchError::S3(_)));
    }

    #[test]
    fn test_params_defaults() {
        let params: FetchParams =
            serde_json::from_str(r#"{"bucket": "data", "local_folder": "/tmp/data"}"#).unwrap();
        assert_eq!(params.bucket, "data");
        assert_eq!(params.prefix, "");
        assert!(params.region.is_none());
        assert!(!params.force_path_style);

        let config: InitConfig = serde_json::from_str("{}").unwrap();
        assert!(config.log_path.is_none());
    }

    #[tokio::test]
    async fn test_load_sdk_config() {
        let mut params = FetchParams::new("data", "/tmp/data");
        params.region = Some("eu-west-1".to_string());
        params.endpoint = Some("http://localhost:9000".to_string());
        let config = load_sdk_config(&params).await;
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
        assert_eq!(config.endpoint_url(), Some("http://localhost:9000"));
        assert_eq!(config.retry_config().map(|r| r.max_attempts()), Some(1));
    }
}

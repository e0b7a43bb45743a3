use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;
use crate::storage::S3Storage;

pub async fn load_sdk_config(config: &AppConfig) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "postflow-static");
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

pub fn build_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = S3ConfigBuilder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}

/// The bucket-bound storage client the upload pipeline writes through.
pub async fn build_storage(config: &AppConfig) -> Result<S3Storage> {
    let sdk_config = load_sdk_config(config).await;
    // Form-post signing needs the credentials themselves, not just a signed client.
    Ok(
        S3Storage::new(build_client(&sdk_config), &config.s3_bucket, &config.aws_region)
            .with_endpoint(config.aws_endpoint_url.clone())
            .with_credentials(sdk_config.credentials_provider()),
    )
}

use crate::client::{BatchOutput, ClientFactory, DeliveryClient};
use crate::error::DeliveryError;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_firehose::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_firehose::operation::put_record_batch::PutRecordBatchError;
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::Record;
use aws_sdk_firehose::Client;
use std::sync::Arc;

/// Service error codes meaning the request's credentials were not accepted.
const UNAUTHORIZED_CODES: &[&str] = &[
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "InvalidSignatureException",
    "UnrecognizedClientException",
];

/// Amazon Data Firehose implementation of [`DeliveryClient`].
#[derive(Clone, Debug)]
pub struct FirehoseClient {
    client: Client,
}

impl FirehoseClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl DeliveryClient for FirehoseClient {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchOutput, DeliveryError> {
        let total = records.len();
        let records = records
            .into_iter()
            .map(|data| Record::builder().data(Blob::new(data)).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeliveryError::Other(Box::new(e)))?;

        let output = self
            .client
            .put_record_batch()
            .delivery_stream_name(stream_name)
            .set_records(Some(records))
            .send()
            .await
            .map_err(classify)?;

        let failed = usize::try_from(output.failed_put_count()).unwrap_or(0);
        if failed > 0 {
            return Err(DeliveryError::PartiallyFailed { failed, total });
        }
        Ok(BatchOutput { delivered: total })
    }
}

fn classify(err: SdkError<PutRecordBatchError>) -> DeliveryError {
    let unauthorized = err.as_service_error().is_some_and(rejects_credentials);
    let source = DisplayErrorContext(err).to_string().into();
    if unauthorized {
        DeliveryError::Unauthorized(source)
    } else {
        DeliveryError::Other(source)
    }
}

fn rejects_credentials(err: &PutRecordBatchError) -> bool {
    err.code()
        .is_some_and(|code| UNAUTHORIZED_CODES.contains(&code))
}

/// Builds [`FirehoseClient`]s from a stored SDK configuration.
///
/// Each build creates a new SDK client, which re-resolves credentials
/// through the configured provider chain.
#[derive(Clone, Debug)]
pub struct FirehoseClientFactory {
    config: SdkConfig,
}

impl FirehoseClientFactory {
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for FirehoseClientFactory {
    fn build(&self) -> Arc<dyn DeliveryClient> {
        Arc::new(FirehoseClient::from_conf(&self.config))
    }
}

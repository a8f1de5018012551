//! AWS SQS consumer implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use ticksink_core::config::{AwsConfig, QueueConfig};

use crate::consumer::{QueueConsumer, QueueMessage};
use crate::error::QueueError;

/// SQS caps a receive call at 10 messages.
const SQS_MAX_MESSAGES: u32 = 10;

/// Long-poll wait per receive call.
const WAIT_TIME_SECS: i32 = 20;

/// SQS-backed consumer of S3 event notifications.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
}

impl SqsConsumer {
    /// Create a new SQS consumer from project config.
    ///
    /// Ambient AWS configuration (profile, instance role) is loaded first;
    /// static keys and an endpoint override from config take precedence.
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        let queue_url = queue
            .queue_url
            .clone()
            .ok_or_else(|| QueueError::NotConfigured("QUEUE_URL not set".into()))?;

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()))
            .load()
            .await;

        let mut sqs_config = aws_sdk_sqs::config::Builder::from(&shared);

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "ticksink-queue-static",
            );
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(url) = aws.endpoint_with_scheme() {
            sqs_config = sqs_config.endpoint_url(url);
        }

        info!(queue_url = %queue_url, region = %aws.region, "SQS consumer initialized");

        Ok(Self {
            client: Client::from_conf(sqs_config.build()),
            queue_url,
            visibility_timeout_secs: i32::try_from(queue.visibility_timeout_secs).unwrap_or(i32::MAX),
        })
    }
}

/// Convert a received SQS message. Messages without a receipt handle cannot
/// be acked or released, so they are dropped.
fn to_queue_message(msg: &Message) -> Option<QueueMessage> {
    let Some(receipt_handle) = msg.receipt_handle() else {
        warn!(message_id = ?msg.message_id(), "SQS message without receipt handle, skipping");
        return None;
    };

    let attribute = |name: MessageSystemAttributeName| {
        msg.attributes().and_then(|attrs| attrs.get(&name)).cloned()
    };

    // SentTimestamp is epoch millis.
    let timestamp = attribute(MessageSystemAttributeName::SentTimestamp)
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let attempt_count = attribute(MessageSystemAttributeName::ApproximateReceiveCount)
        .and_then(|c| c.parse::<u32>().ok())
        .unwrap_or(1);

    Some(QueueMessage {
        id: msg.message_id().unwrap_or("unknown").to_string(),
        body: msg.body().unwrap_or("").to_string(),
        receipt_handle: receipt_handle.to_string(),
        timestamp,
        attempt_count,
    })
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let capped = max_messages.clamp(1, SQS_MAX_MESSAGES) as i32;
        debug!(max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(WAIT_TIME_SECS)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        let messages: Vec<QueueMessage> =
            sqs_messages.iter().filter_map(to_queue_message).collect();

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Acking SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Nacking SQS message (visibility=0)");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| QueueError::Provider(format!("SQS visibility change failed: {e:?}")))?;

        Ok(())
    }
}

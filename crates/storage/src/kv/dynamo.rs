//! DynamoDB implementation of [`KeyValueStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use serde_json::{Number, Value};
use tracing::{debug, info, warn};

use ticksink_core::config::AwsConfig;
use ticksink_core::Item;

use super::{BatchWriteOutcome, KeyValueStore, KvError, MAX_BATCH_ITEMS};

/// DynamoDB-backed key-value store.
pub struct DynamoKvStore {
    client: Client,
}

impl DynamoKvStore {
    /// Create a client from project config.
    ///
    /// Ambient AWS configuration (profile, instance role) is loaded first;
    /// static keys and an endpoint override from config take precedence.
    pub async fn new(aws: &AwsConfig) -> Self {
        let region = Region::new(aws.region.clone());
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&shared);

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "ticksink-static",
            );
            builder = builder.credentials_provider(creds);
        }

        if let Some(url) = aws.endpoint_with_scheme() {
            builder = builder.endpoint_url(url);
        }

        info!(region = %aws.region, "DynamoDB store initialized");

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl KeyValueStore for DynamoKvStore {
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, KvError> {
        let resp = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(key.clone())))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| KvError::Read {
                table: table.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(resp.item.map(from_attribute_map))
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), KvError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attribute_map(item)))
            .send()
            .await
            .map_err(|e| KvError::Write {
                table: table.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutcome, KvError> {
        if items.len() > MAX_BATCH_ITEMS {
            return Err(KvError::BatchTooLarge {
                table: table.to_string(),
                size: items.len(),
                limit: MAX_BATCH_ITEMS,
            });
        }
        if items.is_empty() {
            return Ok(BatchWriteOutcome::default());
        }

        let submitted = items.len();
        let requests = items
            .into_iter()
            .map(|item| {
                let put = PutRequest::builder()
                    .set_item(Some(to_attribute_map(item)))
                    .build()
                    .map_err(|e| KvError::Conversion(e.to_string()))?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>, KvError>>()?;

        let resp = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| KvError::Write {
                table: table.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let unprocessed = resp
            .unprocessed_items()
            .and_then(|m| m.get(table))
            .map_or(0, |reqs| reqs.len());

        if unprocessed > 0 {
            warn!(table, submitted, unprocessed, "Bulk write left unprocessed items");
        } else {
            debug!(table, submitted, "Bulk write accepted");
        }

        Ok(BatchWriteOutcome {
            submitted,
            unprocessed,
        })
    }
}

// ── JSON <-> AttributeValue ─────────────────────────────────────────

fn to_attribute_map(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter().map(|(k, v)| (k, to_attribute(v))).collect()
}

fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(values.into_iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

fn from_attribute_map(map: HashMap<String, AttributeValue>) -> Item {
    map.into_iter().map(|(k, v)| (k, from_attribute(v))).collect()
}

fn from_attribute(value: AttributeValue) -> Value {
    match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::L(values) => Value::Array(values.into_iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)),
        AttributeValue::Ss(values) => Value::Array(values.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(values) => Value::Array(values.into_iter().map(parse_number).collect()),
        AttributeValue::B(blob) => Value::String(String::from_utf8_lossy(blob.as_ref()).into_owned()),
        _ => Value::Null,
    }
}

fn parse_number(n: String) -> Value {
    match n.parse::<Number>() {
        Ok(num) => Value::Number(num),
        Err(_) => Value::String(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_convert_both_ways() {
        let item: Item = json!({
            "symbol": "AAPL",
            "close": 187.9,
            "volume": 1200,
            "low": null,
            "flag": true,
        })
        .as_object()
        .cloned()
        .unwrap();

        let attrs = to_attribute_map(item.clone());
        assert_eq!(attrs.get("close"), Some(&AttributeValue::N("187.9".into())));
        assert_eq!(attrs.get("low"), Some(&AttributeValue::Null(true)));

        assert_eq!(from_attribute_map(attrs), item);
    }

    #[test]
    fn nested_values_convert() {
        let value = json!({"officers": [{"name": "A"}], "tags": ["x", "y"]});
        assert_eq!(from_attribute(to_attribute(value.clone())), value);
    }

    #[test]
    fn string_sets_become_arrays() {
        let v = from_attribute(AttributeValue::Ss(vec!["a".into(), "b".into()]));
        assert_eq!(v, json!(["a", "b"]));
    }

    #[test]
    fn unparseable_number_falls_back_to_string() {
        assert_eq!(parse_number("not-a-number".into()), json!("not-a-number"));
    }
}

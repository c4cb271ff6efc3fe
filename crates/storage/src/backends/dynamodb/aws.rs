//! [`DynamoApi`] over the AWS SDK.
//!
//! The SDK is async; each call is driven to completion on a runtime owned
//! by the client, keeping the storage contract blocking.

use std::collections::HashMap;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType as SdkKeyType, KeysAndAttributes, Projection, ProjectionType, ReturnValue,
    ScalarAttributeType, Select,
};
use tokio::runtime::Runtime;
use tracing::debug;

use super::DynamoStorageConfig;
use super::client::{
    BatchGetOutput, DynamoApi, DynamoClientError, DynamoClientResult, DynamoItem, DynamoValue,
    KeyType, PutRequest, ReadOutput, ReadRequest, ScalarType, TableDefinition, WriteCondition,
};
use super::expression::{Condition, RenderedExpressions};
use super::index::DynamoIndex;

type SdkItem = HashMap<String, AttributeValue>;

/// DynamoDB client backed by `aws-sdk-dynamodb`.
#[derive(Debug)]
pub struct AwsDynamoClient {
    client: Client,
    runtime: Runtime,
}

impl AwsDynamoClient {
    /// Loads AWS configuration from the environment, applying the region and
    /// endpoint overrides from `config`.
    pub fn connect(config: &DynamoStorageConfig) -> DynamoClientResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| DynamoClientError::Service(e.to_string()))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url.clone());
        }
        let sdk_config = runtime.block_on(loader.load());
        Ok(Self {
            client: Client::new(&sdk_config),
            runtime,
        })
    }

    /// Wraps an existing SDK client.
    pub fn from_client(client: Client) -> DynamoClientResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| DynamoClientError::Service(e.to_string()))?;
        Ok(Self { client, runtime })
    }
}

fn service_error<E, R>(err: SdkError<E, R>) -> DynamoClientError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{err:?}"));
    match code.as_deref() {
        Some("ConditionalCheckFailedException") => DynamoClientError::ConditionalCheckFailed,
        Some("ResourceNotFoundException") => DynamoClientError::ResourceNotFound(message),
        Some("ValidationException") => DynamoClientError::Validation(message),
        _ => DynamoClientError::Service(message),
    }
}

fn to_sdk(value: &DynamoValue) -> AttributeValue {
    match value {
        DynamoValue::S(s) => AttributeValue::S(s.clone()),
        DynamoValue::N(n) => AttributeValue::N(n.clone()),
        DynamoValue::Bool(b) => AttributeValue::Bool(*b),
        DynamoValue::Null => AttributeValue::Null(true),
        DynamoValue::L(values) => AttributeValue::L(values.iter().map(to_sdk).collect()),
        DynamoValue::M(map) => AttributeValue::M(
            map.iter().map(|(k, v)| (k.clone(), to_sdk(v))).collect(),
        ),
    }
}

fn from_sdk(value: &AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::S(s) => DynamoValue::S(s.clone()),
        AttributeValue::N(n) => DynamoValue::N(n.clone()),
        AttributeValue::Bool(b) => DynamoValue::Bool(*b),
        AttributeValue::L(values) => DynamoValue::L(values.iter().map(from_sdk).collect()),
        AttributeValue::M(map) => DynamoValue::M(
            map.iter().map(|(k, v)| (k.clone(), from_sdk(v))).collect(),
        ),
        AttributeValue::Ss(values) => {
            DynamoValue::L(values.iter().cloned().map(DynamoValue::S).collect())
        }
        AttributeValue::Ns(values) => {
            DynamoValue::L(values.iter().cloned().map(DynamoValue::N).collect())
        }
        _ => DynamoValue::Null,
    }
}

fn item_to_sdk(item: &DynamoItem) -> SdkItem {
    item.iter().map(|(k, v)| (k.clone(), to_sdk(v))).collect()
}

fn item_from_sdk(item: &SdkItem) -> DynamoItem {
    item.iter().map(|(k, v)| (k.clone(), from_sdk(v))).collect()
}

fn names_and_values(
    rendered: &RenderedExpressions,
) -> (Option<HashMap<String, String>>, Option<SdkItem>) {
    let names = (!rendered.names.is_empty()).then(|| {
        rendered
            .names
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });
    let values = (!rendered.values.is_empty()).then(|| {
        rendered
            .values
            .iter()
            .map(|(k, v)| (k.clone(), to_sdk(v)))
            .collect()
    });
    (names, values)
}

fn key_schema(index: &DynamoIndex) -> DynamoClientResult<Vec<KeySchemaElement>> {
    index
        .key_schema()
        .into_iter()
        .map(|element| {
            let key_type = match element.key_type {
                KeyType::Hash => SdkKeyType::Hash,
                KeyType::Range => SdkKeyType::Range,
            };
            KeySchemaElement::builder()
                .attribute_name(element.attribute_name)
                .key_type(key_type)
                .build()
                .map_err(|e| DynamoClientError::Validation(e.to_string()))
        })
        .collect()
}

impl DynamoApi for AwsDynamoClient {
    fn create_table(&self, definition: &TableDefinition) -> DynamoClientResult<bool> {
        let attribute_definitions = definition
            .attribute_definitions
            .iter()
            .map(|(name, scalar)| {
                let attribute_type = match scalar {
                    ScalarType::S => ScalarAttributeType::S,
                    ScalarType::N => ScalarAttributeType::N,
                };
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(attribute_type)
                    .build()
                    .map_err(|e| DynamoClientError::Validation(e.to_string()))
            })
            .collect::<DynamoClientResult<Vec<_>>>()?;

        let mut global_secondary_indexes = Vec::new();
        for index in &definition.global_secondary_indexes {
            let gsi = GlobalSecondaryIndex::builder()
                .index_name(index.name.clone().unwrap_or_default())
                .set_key_schema(Some(key_schema(index)?))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .map_err(|e| DynamoClientError::Validation(e.to_string()))?;
            global_secondary_indexes.push(gsi);
        }

        let request = self
            .client
            .create_table()
            .table_name(&definition.table_name)
            .set_key_schema(Some(key_schema(&definition.primary)?))
            .set_attribute_definitions(Some(attribute_definitions))
            .set_global_secondary_indexes(
                (!global_secondary_indexes.is_empty()).then_some(global_secondary_indexes),
            )
            .billing_mode(BillingMode::PayPerRequest);

        match self.runtime.block_on(request.send()) {
            Ok(_) => {
                debug!(table = %definition.table_name, "created dynamodb table");
                Ok(true)
            }
            Err(err) if err.code() == Some("ResourceInUseException") => Ok(false),
            Err(err) => Err(service_error(err)),
        }
    }

    fn get_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>> {
        let request = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(item_to_sdk(key)))
            .consistent_read(true);
        let output = self.runtime.block_on(request.send()).map_err(service_error)?;
        Ok(output.item().map(item_from_sdk))
    }

    fn put_item(&self, request: PutRequest) -> DynamoClientResult<()> {
        let condition = request.condition.map(|c| match c {
            WriteCondition::NotExists(attr) => Condition::NotExists(attr),
            WriteCondition::Exists(attr) => Condition::Exists(attr),
        });
        let rendered = RenderedExpressions::render(None, condition.as_ref());
        let (names, values) = names_and_values(&rendered);

        let call = self
            .client
            .put_item()
            .table_name(&request.table_name)
            .set_item(Some(item_to_sdk(&request.item)))
            .set_condition_expression(rendered.condition)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values);
        self.runtime.block_on(call.send()).map_err(service_error)?;
        Ok(())
    }

    fn delete_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>> {
        let request = self
            .client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(item_to_sdk(key)))
            .return_values(ReturnValue::AllOld);
        let output = self.runtime.block_on(request.send()).map_err(service_error)?;
        Ok(output.attributes().map(item_from_sdk))
    }

    fn batch_get_item(&self, table_name: &str, keys: &[DynamoItem]) -> DynamoClientResult<BatchGetOutput> {
        let keys_and_attributes = KeysAndAttributes::builder()
            .set_keys(Some(keys.iter().map(item_to_sdk).collect()))
            .consistent_read(true)
            .build()
            .map_err(|e| DynamoClientError::Validation(e.to_string()))?;
        let request = self
            .client
            .batch_get_item()
            .request_items(table_name, keys_and_attributes);
        let output = self.runtime.block_on(request.send()).map_err(service_error)?;

        let items = output
            .responses()
            .and_then(|r| r.get(table_name))
            .map(|items| items.iter().map(item_from_sdk).collect())
            .unwrap_or_default();
        let unprocessed_keys = output
            .unprocessed_keys()
            .and_then(|u| u.get(table_name))
            .map(|k| k.keys().iter().map(item_from_sdk).collect())
            .unwrap_or_default();
        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    fn read(&self, request: &ReadRequest) -> DynamoClientResult<ReadOutput> {
        let rendered =
            RenderedExpressions::render(request.key_condition.as_ref(), request.filter.as_ref());
        let (names, values) = names_and_values(&rendered);
        let limit = request.limit.and_then(|l| i32::try_from(l).ok());
        let select = request.select_count.then_some(Select::Count);
        let start = request.exclusive_start_key.as_ref().map(item_to_sdk);

        let (items, count, last_evaluated_key) = if request.key_condition.is_some() {
            let call = self
                .client
                .query()
                .table_name(&request.table_name)
                .set_index_name(request.index_name.clone())
                .set_key_condition_expression(rendered.key_condition)
                .set_filter_expression(rendered.condition)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
                .set_exclusive_start_key(start)
                .set_limit(limit)
                .set_select(select)
                .scan_index_forward(request.scan_forward);
            let output = self.runtime.block_on(call.send()).map_err(service_error)?;
            (
                output.items().iter().map(item_from_sdk).collect(),
                output.count(),
                output.last_evaluated_key().map(item_from_sdk),
            )
        } else {
            let call = self
                .client
                .scan()
                .table_name(&request.table_name)
                .set_index_name(request.index_name.clone())
                .set_filter_expression(rendered.condition)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
                .set_exclusive_start_key(start)
                .set_limit(limit)
                .set_select(select);
            let output = self.runtime.block_on(call.send()).map_err(service_error)?;
            (
                output.items().iter().map(item_from_sdk).collect(),
                output.count(),
                output.last_evaluated_key().map(item_from_sdk),
            )
        };

        Ok(ReadOutput {
            items,
            count: usize::try_from(count).unwrap_or_default(),
            last_evaluated_key,
        })
    }
}

//! Schema lookup.
//!
//! Schema-framed payloads only carry a numeric id. A [`SchemaResolver`]
//! turns that id into a definition; the registry service behind it (an HTTP
//! schema registry, a file, a test fixture) is outside this crate.
//!
//! [`CachedSchemaResolver`] keeps every resolved definition for the lifetime
//! of the process, so each id is fetched at most once.

use crate::error::{Result, SchemaError};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Schema format (Avro, Protobuf, JSON Schema)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaFormat {
    Avro,
    Protobuf,
    Json,
}

impl SchemaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFormat::Avro => "AVRO",
            SchemaFormat::Protobuf => "PROTOBUF",
            SchemaFormat::Json => "JSON",
        }
    }
}

/// A schema as stored in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Unique schema ID
    pub id: i32,

    /// Subject (topic-key or topic-value)
    pub subject: String,

    /// Version number (starts at 1)
    pub version: i32,

    #[serde(rename = "schemaType")]
    pub schema_type: SchemaFormat,

    /// Schema text: Avro JSON, a `.proto` file, or a JSON Schema document
    pub schema: String,
}

#[async_trait]
pub trait SchemaResolver: Send + Sync {
    /// Fetch the schema registered under `id`.
    ///
    /// # Errors
    ///
    /// `SchemaNotFound` if no schema has that id.
    async fn resolve_schema(&self, id: i32) -> Result<SchemaDefinition>;
}

/// Wraps a resolver with a process-lifetime cache keyed by schema id.
pub struct CachedSchemaResolver {
    inner: Arc<dyn SchemaResolver>,
    cache: Cache<i32, Arc<SchemaDefinition>>,
}

impl CachedSchemaResolver {
    pub fn new(inner: Arc<dyn SchemaResolver>) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(10_000).build(),
        }
    }

    pub async fn get(&self, id: i32) -> Result<Arc<SchemaDefinition>> {
        if let Some(schema) = self.cache.get(&id).await {
            return Ok(schema);
        }

        let schema = Arc::new(self.inner.resolve_schema(id).await?);
        self.cache.insert(id, schema.clone()).await;
        tracing::debug!(
            schema_id = id,
            subject = %schema.subject,
            schema_type = schema.schema_type.as_str(),
            "Resolved schema"
        );
        Ok(schema)
    }
}

#[async_trait]
impl SchemaResolver for CachedSchemaResolver {
    async fn resolve_schema(&self, id: i32) -> Result<SchemaDefinition> {
        Ok(self.get(id).await?.as_ref().clone())
    }
}

/// Schemas held in memory, for tests and embedded use.
#[derive(Default)]
pub struct InMemorySchemaRegistry {
    schemas: RwLock<HashMap<i32, SchemaDefinition>>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under `subject` and return its id.
    ///
    /// Registering the same text under the same subject again returns the
    /// existing id. Avro schemas are parsed up front.
    pub async fn register(
        &self,
        subject: &str,
        schema_type: SchemaFormat,
        schema: &str,
    ) -> Result<i32> {
        let mut schemas = self.schemas.write().await;

        if let Some(existing) = schemas
            .values()
            .find(|s| s.subject == subject && s.schema == schema)
        {
            return Ok(existing.id);
        }

        let id = schemas.keys().max().copied().unwrap_or(0) + 1;
        if schema_type == SchemaFormat::Avro {
            apache_avro::Schema::parse_str(schema).map_err(|e| SchemaError::InvalidSchema {
                id,
                message: e.to_string(),
            })?;
        }

        let version = schemas.values().filter(|s| s.subject == subject).count() as i32 + 1;
        schemas.insert(
            id,
            SchemaDefinition {
                id,
                subject: subject.to_string(),
                version,
                schema_type,
                schema: schema.to_string(),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl SchemaResolver for InMemorySchemaRegistry {
    async fn resolve_schema(&self, id: i32) -> Result<SchemaDefinition> {
        self.schemas
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SchemaError::SchemaNotFound(id))
    }
}

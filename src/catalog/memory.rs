//! In-memory metadata store.

use async_trait::async_trait;

use super::{DatabaseProfile, MetadataRepository, QueryDefinition, QueryFilter};
use crate::error::Result;

/// A fixed set of profiles and definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    databases: Vec<DatabaseProfile>,
    queries: Vec<QueryDefinition>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, profile: DatabaseProfile) -> Self {
        self.databases.push(profile);
        self
    }

    pub fn with_query(mut self, definition: QueryDefinition) -> Self {
        self.queries.push(definition);
        self
    }

    pub fn databases(&self) -> &[DatabaseProfile] {
        &self.databases
    }

    pub fn queries(&self) -> &[QueryDefinition] {
        &self.queries
    }
}

#[async_trait]
impl MetadataRepository for InMemoryCatalog {
    async fn find_database_profile(&self, id: i64) -> Result<Option<DatabaseProfile>> {
        Ok(self.databases.iter().find(|p| p.id == id).cloned())
    }

    async fn find_database_profile_by_name(&self, name: &str) -> Result<Option<DatabaseProfile>> {
        Ok(self.databases.iter().find(|p| p.name == name).cloned())
    }

    async fn find_query_definitions(&self, filter: &QueryFilter) -> Result<Vec<QueryDefinition>> {
        filter.validate()?;

        let mut selected: Vec<QueryDefinition> = self
            .queries
            .iter()
            .filter(|def| filter.matches(&def.to_record()))
            .cloned()
            .collect();
        selected.sort_by_key(|def| def.id);
        Ok(selected)
    }
}

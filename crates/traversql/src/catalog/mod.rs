//! Catalog discovery: tables, columns and classified relationships.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TraversalConfig;
use crate::core::{Column, ForeignKey, RelationType, Relationship, Table};
use crate::error::{ExtractError, Result};
use crate::source::SourcePool;

/// The table and relationship inventory an extraction walks over.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<Arc<Table>>,
    by_name: HashMap<String, Arc<Table>>,
    without_pk: Vec<String>,
    relationships: Vec<Relationship>,
}

impl Catalog {
    /// Discover tables and relationships from the store.
    ///
    /// Fails with `NoTablesFound` or `NoRelationshipsFound` when the filtered
    /// schemas yield nothing to walk.
    pub async fn discover(source: &dyn SourcePool, config: &TraversalConfig) -> Result<Self> {
        let schemas = config.effective_schemas();
        let tables = discover_tables(source, config, &schemas).await?;
        let by_name: HashMap<String, Arc<Table>> = tables
            .iter()
            .map(|t| (t.full_name(), t.clone()))
            .collect();

        let fks = source.list_foreign_keys(&schemas).await?;
        let relationships = discover_relationships(source, config, &by_name, fks).await?;

        Self::from_parts(tables, relationships)
    }

    /// Build a catalog from already resolved tables and relationships.
    pub fn from_parts(tables: Vec<Arc<Table>>, relationships: Vec<Relationship>) -> Result<Self> {
        if tables.is_empty() {
            return Err(ExtractError::NoTablesFound);
        }
        if relationships.is_empty() {
            return Err(ExtractError::NoRelationshipsFound);
        }

        let mut by_name = HashMap::with_capacity(tables.len());
        let mut without_pk = Vec::new();
        for table in &tables {
            if !table.has_pk() {
                warn!("Table {} has no primary key; it cannot seed an extraction", table.full_name());
                without_pk.push(table.full_name());
            }
            by_name.insert(table.full_name(), table.clone());
        }

        info!(
            "Catalog: {} tables ({} without primary key), {} relationships",
            tables.len(),
            without_pk.len(),
            relationships.len()
        );

        Ok(Self {
            tables,
            by_name,
            without_pk,
            relationships,
        })
    }

    /// All discovered tables, ordered by schema and name.
    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    /// Tables that can seed an extraction.
    pub fn tables_with_primary_key(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.iter().filter(|t| t.has_pk())
    }

    /// Full names of tables lacking a primary key.
    pub fn tables_without_primary_key(&self) -> &[String] {
        &self.without_pk
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Look up a table by `schema.name`.
    pub fn table(&self, full_name: &str) -> Option<&Arc<Table>> {
        self.by_name.get(full_name)
    }

    /// Primary key columns of a table usable as a seed.
    pub fn primary_key_columns(&self, full_name: &str) -> Result<Vec<Column>> {
        let table = self
            .table(full_name)
            .ok_or_else(|| ExtractError::TableNotFound(full_name.to_string()))?;
        let columns = table.primary_columns();
        if columns.is_empty() {
            return Err(ExtractError::NoPrimaryKey(full_name.to_string()));
        }
        Ok(columns)
    }
}

async fn discover_tables(
    source: &dyn SourcePool,
    config: &TraversalConfig,
    schemas: &[String],
) -> Result<Vec<Arc<Table>>> {
    let mut tables = Vec::new();
    for table_ref in source.list_tables(schemas).await? {
        if !config.allows(&table_ref.schema, &table_ref.name) {
            debug!("Skipping filtered table {}", table_ref.full_name());
            continue;
        }
        let columns = source
            .load_columns(&table_ref.schema, &table_ref.name)
            .await?;
        tables.push(Arc::new(Table::new(
            table_ref.schema,
            table_ref.name,
            columns,
        )));
    }

    if tables.is_empty() {
        return Err(ExtractError::NoTablesFound);
    }
    Ok(tables)
}

fn resolve_columns(table: &Table, names: &[String]) -> Option<Vec<Column>> {
    names.iter().map(|n| table.column(n).cloned()).collect()
}

/// An end is unique when every one of its columns is in a PK or UNIQUE constraint.
async fn end_is_unique(source: &dyn SourcePool, table: &Table, columns: &[Column]) -> Result<bool> {
    for col in columns {
        if !source
            .column_is_unique(&table.schema, &table.name, &col.name)
            .await?
        {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn discover_relationships(
    source: &dyn SourcePool,
    config: &TraversalConfig,
    by_name: &HashMap<String, Arc<Table>>,
    fks: Vec<ForeignKey>,
) -> Result<Vec<Relationship>> {
    let mut relationships = Vec::new();

    for fk in fks {
        if !config.allows(&fk.schema, &fk.table) || !config.allows(&fk.ref_schema, &fk.ref_table) {
            debug!("Skipping foreign key {} on filtered table", fk.name);
            continue;
        }

        let source_name = format!("{}.{}", fk.schema, fk.table);
        let target_name = format!("{}.{}", fk.ref_schema, fk.ref_table);
        let (Some(source_table), Some(target_table)) =
            (by_name.get(&source_name), by_name.get(&target_name))
        else {
            warn!(
                "Skipping foreign key {}: {} -> {} references a table outside the catalog",
                fk.name, source_name, target_name
            );
            continue;
        };

        let (Some(source_columns), Some(target_columns)) = (
            resolve_columns(source_table, &fk.columns),
            resolve_columns(target_table, &fk.ref_columns),
        ) else {
            warn!("Skipping foreign key {}: unknown columns", fk.name);
            continue;
        };

        let relation_type = if source_name == target_name {
            RelationType::SelfReferencing
        } else {
            RelationType::classify(
                false,
                end_is_unique(source, source_table, &source_columns).await?,
                end_is_unique(source, target_table, &target_columns).await?,
            )
        };

        let rel = Relationship {
            source_table: source_table.clone(),
            source_columns,
            target_table: target_table.clone(),
            target_columns,
            relation_type,
        };
        debug!("Relationship {}", rel);
        relationships.push(rel);
    }

    if relationships.is_empty() {
        return Err(ExtractError::NoRelationshipsFound);
    }
    Ok(relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySourcePool;

    fn shop() -> MemorySourcePool {
        MemorySourcePool::new()
            .with_table(Table::new(
                "public",
                "users",
                vec![Column::new("id", "integer").primary(), Column::new("name", "text")],
            ))
            .with_table(Table::new(
                "public",
                "orders",
                vec![Column::new("id", "integer").primary(), Column::new("user_id", "integer")],
            ))
            .with_table(Table::new(
                "public",
                "profiles",
                vec![Column::new("id", "integer").primary(), Column::new("user_id", "integer")],
            ))
            .with_table(Table::new(
                "public",
                "audit",
                vec![Column::new("message", "text")],
            ))
            .with_foreign_key("public.orders", &["user_id"], "public.users", &["id"])
            .with_foreign_key("public.profiles", &["user_id"], "public.users", &["id"])
            .with_unique("public.profiles", "user_id")
    }

    #[tokio::test]
    async fn test_discover_classifies_relationships() {
        let catalog = Catalog::discover(&shop(), &TraversalConfig::default())
            .await
            .unwrap();
        assert_eq!(catalog.tables().len(), 4);
        assert_eq!(catalog.relationships().len(), 2);
        assert_eq!(catalog.relationships()[0].relation_type, RelationType::ManyToOne);
        assert_eq!(catalog.relationships()[1].relation_type, RelationType::OneToOne);
        assert!(catalog.table("public.orders").is_some());
        assert_eq!(catalog.tables_without_primary_key(), &["public.audit".to_string()]);
        assert_eq!(catalog.tables_with_primary_key().count(), 3);
    }

    #[tokio::test]
    async fn test_primary_key_columns() {
        let catalog = Catalog::discover(&shop(), &TraversalConfig::default())
            .await
            .unwrap();
        let cols = catalog.primary_key_columns("public.users").unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "id");
        assert!(matches!(
            catalog.primary_key_columns("public.audit"),
            Err(ExtractError::NoPrimaryKey(_))
        ));
        assert!(matches!(
            catalog.primary_key_columns("public.nope"),
            Err(ExtractError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exclude_drops_relationships() {
        let config = TraversalConfig {
            exclude_tables: vec!["orders".into()],
            ..TraversalConfig::default()
        };
        let catalog = Catalog::discover(&shop(), &config).await.unwrap();
        assert!(catalog.table("public.orders").is_none());
        assert_eq!(catalog.relationships().len(), 1);
    }

    #[tokio::test]
    async fn test_no_tables_found() {
        let config = TraversalConfig {
            schemas: vec!["empty".into()],
            ..TraversalConfig::default()
        };
        let err = Catalog::discover(&shop(), &config).await.unwrap_err();
        assert!(matches!(err, ExtractError::NoTablesFound));
    }

    #[tokio::test]
    async fn test_no_relationships_found() {
        let config = TraversalConfig {
            include_tables: vec!["users".into(), "audit".into()],
            ..TraversalConfig::default()
        };
        let err = Catalog::discover(&shop(), &config).await.unwrap_err();
        assert!(matches!(err, ExtractError::NoRelationshipsFound));
    }

    #[tokio::test]
    async fn test_self_reference() {
        let store = MemorySourcePool::new()
            .with_table(Table::new(
                "public",
                "persons",
                vec![
                    Column::new("person_id", "integer").primary(),
                    Column::new("parent_id", "integer"),
                ],
            ))
            .with_foreign_key("public.persons", &["parent_id"], "public.persons", &["person_id"]);
        let catalog = Catalog::discover(&store, &TraversalConfig::default())
            .await
            .unwrap();
        assert!(catalog.relationships()[0].is_self_referencing());
        assert_eq!(
            catalog.relationships()[0].relation_type,
            RelationType::SelfReferencing
        );
    }
}

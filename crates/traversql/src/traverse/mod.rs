//! Foreign-key graph traversal from a seed record.
//!
//! [`Extractor::build_graph`] fetches the seed, resolves the rows it depends
//! on, then the rows depending on it. The output lists every row after the
//! rows it references, so replaying the generated statements in order
//! satisfies foreign keys (cycles excepted).
//!
//! The walk runs on an explicit stack rather than recursion. Steps are pushed
//! in reverse so popping them reproduces a depth-first pre-order:
//! a record's parents, then the record, then its children.

mod session;

pub use session::{Direction, RelationshipVisit, Session};

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::TraversalConfig;
use crate::core::{Column, PrimaryKey, Record, Relationship, SelectQuery, SqlValue, Table};
use crate::error::{ExtractError, Result};
use crate::insert::generate_insert_statements;
use crate::source::SourcePool;

/// Counters for one finished extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub records: usize,
    pub tables: usize,
    pub relationship_visits: usize,
    pub fetches: usize,
}

impl ExtractionSummary {
    fn from_session(session: &Session) -> Self {
        let mut tables: Vec<String> = session
            .records()
            .iter()
            .map(|r| r.table.full_name())
            .collect();
        tables.sort();
        tables.dedup();
        Self {
            records: session.records().len(),
            tables: tables.len(),
            relationship_visits: session.relationship_visits().len(),
            fetches: session.fetch_count(),
        }
    }
}

enum Step {
    /// Walk relationships where `record` holds the foreign key, from index `next`.
    Parents { record: Record, next: usize },
    /// Append `record` to the output.
    Emit(Record),
    /// Walk relationships referencing `record`, from index `next`; `pending`
    /// holds child rows of the relationship just queried.
    Children {
        record: Record,
        next: usize,
        pending: VecDeque<Record>,
    },
}

/// Traversal engine over one catalog and store.
///
/// The engine itself holds no per-extraction state; concurrent extractions
/// on the same engine each get their own [`Session`].
pub struct Extractor {
    source: Arc<dyn SourcePool>,
    catalog: Arc<Catalog>,
    follow_parents: bool,
    follow_children: bool,
}

impl Extractor {
    /// Discover the catalog from the store and build an engine over it.
    pub async fn discover(source: Arc<dyn SourcePool>, config: &TraversalConfig) -> Result<Self> {
        let catalog = Catalog::discover(source.as_ref(), config).await?;
        Ok(Self::with_catalog(source, Arc::new(catalog), config))
    }

    /// Build an engine over an already discovered catalog.
    pub fn with_catalog(
        source: Arc<dyn SourcePool>,
        catalog: Arc<Catalog>,
        config: &TraversalConfig,
    ) -> Self {
        Self {
            source,
            catalog,
            follow_parents: config.follow_parents,
            follow_children: config.follow_children,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Look up a table, loading its columns from the store if it is not in
    /// the catalog.
    pub async fn resolve_table(&self, schema: &str, name: &str) -> Result<Arc<Table>> {
        let full_name = format!("{}.{}", schema, name);
        if let Some(table) = self.catalog.table(&full_name) {
            return Ok(table.clone());
        }
        let columns = self.source.load_columns(schema, name).await?;
        if columns.is_empty() {
            return Err(ExtractError::TableNotFound(full_name));
        }
        debug!("Loaded {} outside the catalog", full_name);
        Ok(Arc::new(Table::new(schema, name, columns)))
    }

    /// Resolve a user-supplied seed key.
    ///
    /// Declared column types come from the table; fields the table does not
    /// declare are treated as `integer`. Tables without a primary key are
    /// rejected.
    pub async fn seed_key(
        &self,
        schema: &str,
        name: &str,
        fields: &[String],
        values: Vec<SqlValue>,
    ) -> Result<(Arc<Table>, PrimaryKey)> {
        let table = self.resolve_table(schema, name).await?;
        if !table.has_pk() {
            return Err(ExtractError::NoPrimaryKey(table.full_name()));
        }
        let columns = fields
            .iter()
            .map(|f| table.column(f).cloned().unwrap_or_else(|| Column::new(f, "")))
            .collect();
        let pk = PrimaryKey::new(columns, values)?;
        Ok((table, pk))
    }

    /// Fetch one row by key, consulting the session's fetch ledger first.
    ///
    /// Returns `RecordAlreadyVisited` if the same query and arguments already
    /// ran in this session.
    pub async fn fetch_record(
        &self,
        session: &mut Session,
        table: &Arc<Table>,
        pk: PrimaryKey,
        cancel: &CancellationToken,
    ) -> Result<Record> {
        let query = SelectQuery::new(table.clone(), pk);
        if !session.record_fetch(&query) {
            return Err(ExtractError::RecordAlreadyVisited {
                table: table.full_name(),
            });
        }

        debug!("fetch: {} {}", query.sql(), query.filter);
        let values = guarded(cancel, self.source.query_one(&query))
            .await
            .map_err(|e| e.fetch(table.full_name(), query.filter.to_string()))?;

        if values.len() != table.columns.len() {
            return Err(ExtractError::scan(
                table.full_name(),
                format!("expected {} columns, got {}", table.columns.len(), values.len()),
            )
            .fetch(table.full_name(), query.filter.to_string()));
        }
        Ok(Record::new(table.clone(), table.columns.clone(), values))
    }

    /// Fetch the seed and collect it with its ancestors and descendants.
    pub async fn build_graph(
        &self,
        table: &Arc<Table>,
        pk: PrimaryKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>> {
        Ok(self.run(table, pk, cancel).await?.into_records())
    }

    /// Build the graph and render it as INSERT statements.
    pub async fn extract_graph(
        &self,
        table: &Arc<Table>,
        pk: PrimaryKey,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (sql, _) = self.extract_with_summary(table, pk, cancel).await?;
        Ok(sql)
    }

    /// Like [`extract_graph`](Self::extract_graph), also returning counters.
    pub async fn extract_with_summary(
        &self,
        table: &Arc<Table>,
        pk: PrimaryKey,
        cancel: &CancellationToken,
    ) -> Result<(String, ExtractionSummary)> {
        let session = self.run(table, pk, cancel).await?;
        let summary = ExtractionSummary::from_session(&session);
        info!(
            "Extracted {} records from {} tables ({} fetches, {} relationship visits)",
            summary.records, summary.tables, summary.fetches, summary.relationship_visits
        );
        Ok((generate_insert_statements(session.records()), summary))
    }

    async fn run(
        &self,
        table: &Arc<Table>,
        pk: PrimaryKey,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let mut session = Session::new();
        let seed = self.fetch_record(&mut session, table, pk, cancel).await?;
        debug!("seed: {}", seed);
        self.walk(&mut session, seed, cancel).await?;
        Ok(session)
    }

    async fn walk(
        &self,
        session: &mut Session,
        seed: Record,
        cancel: &CancellationToken,
    ) -> Result<()> {
        session.mark_visited(&seed);

        let mut stack = Vec::new();
        if self.follow_children {
            stack.push(Step::Children {
                record: seed.clone(),
                next: 0,
                pending: VecDeque::new(),
            });
        }
        stack.push(Step::Emit(seed.clone()));
        if self.follow_parents {
            stack.push(Step::Parents {
                record: seed,
                next: 0,
            });
        }

        let relationships = self.catalog.relationships();

        while let Some(step) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            match step {
                Step::Emit(record) => {
                    let label = record.to_string();
                    if session.emit(record) {
                        debug!("+ {}", label);
                    }
                }

                Step::Parents { record, next } => {
                    let table = record.table.full_name();
                    let Some(i) = (next..relationships.len())
                        .find(|&i| relationships[i].source_table.full_name() == table)
                    else {
                        continue;
                    };

                    let parent = self
                        .resolve_parent(session, &relationships[i], &record, cancel)
                        .await?;
                    stack.push(Step::Parents { record, next: i + 1 });
                    if let Some(parent) = parent {
                        stack.push(Step::Emit(parent.clone()));
                        stack.push(Step::Parents {
                            record: parent,
                            next: 0,
                        });
                    }
                }

                Step::Children {
                    record,
                    next,
                    mut pending,
                } => {
                    if let Some(child) = pending.pop_front() {
                        stack.push(Step::Children {
                            record,
                            next,
                            pending,
                        });
                        if !session.mark_visited(&child) {
                            debug!("skipping visited child {}", child);
                            continue;
                        }
                        if self.follow_children {
                            stack.push(Step::Children {
                                record: child.clone(),
                                next: 0,
                                pending: VecDeque::new(),
                            });
                        }
                        stack.push(Step::Emit(child.clone()));
                        if self.follow_parents {
                            stack.push(Step::Parents {
                                record: child,
                                next: 0,
                            });
                        }
                        continue;
                    }

                    let table = record.table.full_name();
                    let Some(i) = (next..relationships.len())
                        .find(|&i| relationships[i].target_table.full_name() == table)
                    else {
                        continue;
                    };

                    let children = self
                        .find_children(session, &relationships[i], &record, cancel)
                        .await?;
                    stack.push(Step::Children {
                        record,
                        next: i + 1,
                        pending: children.into(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Fetch the row `record` references through `rel`, if it should be walked.
    async fn resolve_parent(
        &self,
        session: &mut Session,
        rel: &Relationship,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<Option<Record>> {
        session.add_relationship_visit(
            rel.source_table.full_name(),
            rel.target_table.full_name(),
            Direction::Parent,
        );

        let mut values = Vec::with_capacity(rel.source_columns.len());
        for col in &rel.source_columns {
            match record.get(&col.name) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => return Ok(None),
            }
        }

        let pk = PrimaryKey::new(rel.target_columns.clone(), values)?;
        match self
            .fetch_record(session, &rel.target_table, pk, cancel)
            .await
        {
            Ok(parent) => {
                if session.mark_visited(&parent) {
                    Ok(Some(parent))
                } else {
                    debug!("skipping visited parent {}", parent);
                    Ok(None)
                }
            }
            Err(ExtractError::RecordAlreadyVisited { table }) => {
                debug!("skipping already fetched record in {}", table);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Query every row of `rel.source_table` referencing `record`.
    async fn find_children(
        &self,
        session: &mut Session,
        rel: &Relationship,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>> {
        session.add_relationship_visit(
            rel.target_table.full_name(),
            rel.source_table.full_name(),
            Direction::Child,
        );

        let mut values = Vec::with_capacity(rel.target_columns.len());
        for col in &rel.target_columns {
            match record.get(&col.name) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => return Ok(Vec::new()),
            }
        }

        let pk = PrimaryKey::new(rel.source_columns.clone(), values)?;
        let query = SelectQuery::new(rel.source_table.clone(), pk);
        debug!("children: {} {}", query.sql(), query.filter);

        let table = &rel.source_table;
        let rows = guarded(cancel, self.source.query_rows(&query))
            .await
            .map_err(|e| e.fetch(table.full_name(), query.filter.to_string()))?;

        rows.into_iter()
            .map(|values| {
                if values.len() != table.columns.len() {
                    return Err(ExtractError::scan(
                        table.full_name(),
                        format!("expected {} columns, got {}", table.columns.len(), values.len()),
                    ));
                }
                Ok(Record::new(table.clone(), table.columns.clone(), values))
            })
            .collect()
    }
}

/// Race a store call against cancellation.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySourcePool;

    /// users <- orders <- items, plus nodes.next_id -> nodes.id forming a ring.
    fn store() -> MemorySourcePool {
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
                "items",
                vec![Column::new("id", "integer").primary(), Column::new("order_id", "integer")],
            ))
            .with_table(Table::new(
                "public",
                "nodes",
                vec![Column::new("id", "integer").primary(), Column::new("next_id", "integer")],
            ))
            .with_rows("public.users", vec![vec![1i32.into(), "Ann".into()]])
            .with_rows(
                "public.orders",
                vec![vec![10i32.into(), 1i32.into()], vec![11i32.into(), 1i32.into()]],
            )
            .with_rows("public.items", vec![vec![100i32.into(), 10i32.into()]])
            .with_rows(
                "public.nodes",
                vec![
                    vec![1i32.into(), 2i32.into()],
                    vec![2i32.into(), 3i32.into()],
                    vec![3i32.into(), 1i32.into()],
                ],
            )
            .with_foreign_key("public.orders", &["user_id"], "public.users", &["id"])
            .with_foreign_key("public.items", &["order_id"], "public.orders", &["id"])
            .with_foreign_key("public.nodes", &["next_id"], "public.nodes", &["id"])
    }

    async fn extractor(store: Arc<MemorySourcePool>, config: TraversalConfig) -> Extractor {
        Extractor::discover(store, &config).await.unwrap()
    }

    async fn seed(ex: &Extractor, table: &str, id: i64) -> (Arc<Table>, PrimaryKey) {
        ex.seed_key("public", table, &["id".to_string()], vec![SqlValue::I64(id)])
            .await
            .unwrap()
    }

    fn keys(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.to_string()).collect()
    }

    #[tokio::test]
    async fn test_follow_flags_off_returns_seed_only() {
        let config = TraversalConfig {
            follow_parents: false,
            follow_children: false,
            ..TraversalConfig::default()
        };
        let ex = extractor(Arc::new(store()), config).await;
        let (table, pk) = seed(&ex, "orders", 10).await;
        let records = ex
            .build_graph(&table, pk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(keys(&records), vec!["public.orders (10)"]);
    }

    #[tokio::test]
    async fn test_parents_only() {
        let config = TraversalConfig {
            follow_children: false,
            ..TraversalConfig::default()
        };
        let ex = extractor(Arc::new(store()), config).await;
        let (table, pk) = seed(&ex, "items", 100).await;
        let records = ex
            .build_graph(&table, pk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            keys(&records),
            vec!["public.users (1)", "public.orders (10)", "public.items (100)"]
        );
    }

    #[tokio::test]
    async fn test_children_walk_is_depth_first() {
        let config = TraversalConfig {
            follow_parents: false,
            ..TraversalConfig::default()
        };
        let ex = extractor(Arc::new(store()), config).await;
        let (table, pk) = seed(&ex, "users", 1).await;
        let records = ex
            .build_graph(&table, pk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            keys(&records),
            vec![
                "public.users (1)",
                "public.orders (10)",
                "public.items (100)",
                "public.orders (11)"
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_through_children_terminates() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let (table, pk) = seed(&ex, "nodes", 1).await;
        let records = ex
            .build_graph(&table, pk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        let mut k = keys(&records);
        k.sort();
        assert_eq!(
            k,
            vec!["public.nodes (1)", "public.nodes (2)", "public.nodes (3)"]
        );
    }

    #[tokio::test]
    async fn test_sessions_do_not_leak_between_calls() {
        let store = Arc::new(store());
        let ex = extractor(store.clone(), TraversalConfig::default()).await;
        let cancel = CancellationToken::new();

        let (table, pk) = seed(&ex, "orders", 10).await;
        let first = ex.build_graph(&table, pk.clone(), &cancel).await.unwrap();
        let second = ex.build_graph(&table, pk, &cancel).await.unwrap();
        assert_eq!(keys(&first), keys(&second));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let (table, pk) = seed(&ex, "orders", 10).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ex.build_graph(&table, pk, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 130);
    }

    #[tokio::test]
    async fn test_missing_seed_is_an_error() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let (table, pk) = seed(&ex, "orders", 999).await;
        let err = ex
            .build_graph(&table, pk, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ExtractError::Fetch { table, source, .. } => {
                assert_eq!(table, "public.orders");
                assert!(matches!(*source, ExtractError::RecordNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_record_reports_repeat_fetch() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let (table, pk) = seed(&ex, "users", 1).await;
        let cancel = CancellationToken::new();
        let mut session = Session::new();
        ex.fetch_record(&mut session, &table, pk.clone(), &cancel)
            .await
            .unwrap();
        let err = ex
            .fetch_record(&mut session, &table, pk, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RecordAlreadyVisited { .. }));
    }

    #[tokio::test]
    async fn test_seed_key_validation() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let err = ex
            .seed_key("public", "users", &["id".to_string()], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPrimaryKey { .. }));

        let err = ex
            .seed_key("public", "ghosts", &["id".to_string()], vec![SqlValue::I64(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let ex = extractor(Arc::new(store()), TraversalConfig::default()).await;
        let (table, pk) = seed(&ex, "items", 100).await;
        let (sql, summary) = ex
            .extract_with_summary(&table, pk, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sql.lines().count(), summary.records);
        assert_eq!(summary.tables, 3);
        assert!(summary.fetches >= 3);
    }
}

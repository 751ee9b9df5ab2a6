//! PostgreSQL source database operations.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::tls::SslMode;
use super::SourcePool;
use crate::config::SourceConfig;
use crate::core::{is_text_decoded, Column, ForeignKey, SelectQuery, SqlValue, TableRef};
use crate::error::{ExtractError, Result};

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL source pool implementation.
pub struct PgSourcePool {
    pool: Pool,
}

impl PgSourcePool {
    /// Create a pool from SourceConfig and verify it can connect.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("traversql");
        // Text-read numerics and timestamps are parsed in this format
        pg_config.options("-c DateStyle=ISO -c TimeZone=UTC");

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode: SslMode = config.ssl_mode.parse()?;
        let pool = match ssl_mode.connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| ExtractError::pool(e, "creating PostgreSQL source pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| ExtractError::pool(e, "creating PostgreSQL source pool"))?
            }
        };

        let source = Self { pool };
        source.test_connection().await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(source)
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ExtractError::pool(e, format!("getting connection for {}", context)))
    }
}

#[async_trait]
impl SourcePool for PgSourcePool {
    async fn list_tables(&self, schemas: &[String]) -> Result<Vec<TableRef>> {
        let client = self.client("list_tables").await?;

        let query = r#"
            SELECT table_schema, table_name
            FROM information_schema.tables
            WHERE table_schema::text = ANY($1::text[])
              AND table_type = 'BASE TABLE'
            ORDER BY table_schema, table_name
        "#;

        let rows = client.query(query, &[&schemas]).await?;
        let tables: Vec<TableRef> = rows
            .iter()
            .map(|row| TableRef::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();

        debug!("Found {} base tables in {:?}", tables.len(), schemas);
        Ok(tables)
    }

    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let client = self.client("load_columns").await?;

        let query = r#"
            SELECT
                c.column_name,
                c.data_type,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                      ON tc.constraint_name = kcu.constraint_name
                     AND tc.table_schema = kcu.table_schema
                     AND tc.table_name = kcu.table_name
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                      AND tc.table_schema = c.table_schema
                      AND tc.table_name = c.table_name
                      AND kcu.column_name = c.column_name
                ) AS is_primary
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table]).await?;
        let columns: Vec<Column> = rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                is_primary: row.get(2),
            })
            .collect();

        debug!("Loaded {} columns for {}.{}", columns.len(), schema, table);
        Ok(columns)
    }

    async fn list_foreign_keys(&self, schemas: &[String]) -> Result<Vec<ForeignKey>> {
        let client = self.client("list_foreign_keys").await?;

        // Constraint creation order (oid) keeps relationship order stable.
        let query = r#"
            SELECT
                c.conname,
                n.nspname,
                t.relname,
                ARRAY(
                    SELECT a.attname
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                    ORDER BY k.ord
                )::text[] AS columns,
                rn.nspname,
                rt.relname,
                ARRAY(
                    SELECT a.attname
                    FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a ON a.attrelid = rt.oid AND a.attnum = k.attnum
                    ORDER BY k.ord
                )::text[] AS ref_columns
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            WHERE c.contype = 'f'
              AND n.nspname::text = ANY($1::text[])
            ORDER BY c.oid
        "#;

        let rows = client.query(query, &[&schemas]).await?;
        let fks: Vec<ForeignKey> = rows
            .iter()
            .map(|row| ForeignKey {
                name: row.get(0),
                schema: row.get(1),
                table: row.get(2),
                columns: row.get(3),
                ref_schema: row.get(4),
                ref_table: row.get(5),
                ref_columns: row.get(6),
            })
            .collect();

        debug!("Loaded {} foreign keys in {:?}", fks.len(), schemas);
        Ok(fks)
    }

    async fn column_is_unique(&self, schema: &str, table: &str, column: &str) -> Result<bool> {
        let client = self.client("column_is_unique").await?;

        let query = r#"
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_constraint c
                JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
                WHERE n.nspname = $1
                  AND t.relname = $2
                  AND a.attname = $3
                  AND c.contype IN ('p', 'u')
            )
        "#;

        let row = client.query_one(query, &[&schema, &table, &column]).await?;
        Ok(row.get(0))
    }

    async fn query_rows(&self, query: &SelectQuery) -> Result<Vec<Vec<SqlValue>>> {
        let client = self.client("query_rows").await?;
        let sql = query.sql();
        let table = query.table.full_name();

        let stmt = client.prepare(&sql).await?;
        let params = stmt
            .params()
            .iter()
            .zip(query.args())
            .enumerate()
            .map(|(i, (ty, value))| bind_param(i + 1, value, ty))
            .collect::<Result<Vec<Param>>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        debug!("query: {} args: {}", sql, query.filter);
        let rows = client.query(&stmt, &refs).await?;

        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| decode_value(row, idx, query.table.columns.get(idx), &table))
                    .collect::<Result<Vec<SqlValue>>>()
            })
            .collect()
    }

    async fn test_connection(&self) -> Result<()> {
        let client = self.client("test_connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

fn bind_error(index: usize, ty: &Type, message: impl ToString) -> ExtractError {
    ExtractError::Bind {
        index,
        type_name: ty.name().to_string(),
        message: message.to_string(),
    }
}

/// Convert a key value to the parameter type PostgreSQL inferred for `$index`.
fn bind_param(index: usize, value: &SqlValue, ty: &Type) -> Result<Param> {
    let err = |m: &str| bind_error(index, ty, m);
    let null = value.is_null();

    let param: Param = match ty.name() {
        "int2" => Box::new(if null {
            None
        } else {
            let n = value.as_i64().ok_or_else(|| err("not an integer"))?;
            Some(i16::try_from(n).map_err(|e| bind_error(index, ty, e))?)
        }),
        "int4" => Box::new(if null {
            None
        } else {
            let n = value.as_i64().ok_or_else(|| err("not an integer"))?;
            Some(i32::try_from(n).map_err(|e| bind_error(index, ty, e))?)
        }),
        "int8" => Box::new(if null {
            None
        } else {
            Some(value.as_i64().ok_or_else(|| err("not an integer"))?)
        }),
        "float4" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::F32(v) => Some(*v),
            other => Some(parse_text::<f32>(other).ok_or_else(|| err("not a float"))?),
        }),
        "float8" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::F64(v) => Some(*v),
            SqlValue::F32(v) => Some(f64::from(*v)),
            other => Some(parse_text::<f64>(other).ok_or_else(|| err("not a float"))?),
        }),
        "numeric" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Decimal(d) => Some(*d),
            other => Some(parse_text::<Decimal>(other).ok_or_else(|| err("not a decimal"))?),
        }),
        "bool" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(*b),
            other => Some(parse_text::<bool>(other).ok_or_else(|| err("not a boolean"))?),
        }),
        "uuid" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Uuid(u) => Some(*u),
            other => Some(parse_text::<Uuid>(other).ok_or_else(|| err("not a uuid"))?),
        }),
        "date" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Date(d) => Some(*d),
            other => Some(
                other.to_text()
                    .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
                    .ok_or_else(|| err("not a date"))?,
            ),
        }),
        "time" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Time(t) => Some(*t),
            other => Some(
                other.to_text()
                    .and_then(|s| NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").ok())
                    .ok_or_else(|| err("not a time"))?,
            ),
        }),
        "timestamp" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::DateTime(t) => Some(*t),
            SqlValue::DateTimeOffset(t) => Some(t.naive_utc()),
            other => Some(
                other.to_text()
                    .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").ok())
                    .ok_or_else(|| err("not a timestamp"))?,
            ),
        }),
        "timestamptz" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::DateTimeOffset(t) => Some(*t),
            SqlValue::DateTime(t) => Some(t.and_utc().fixed_offset()),
            other => Some(
                other.to_text()
                    .and_then(|s| DateTime::<FixedOffset>::parse_from_rfc3339(&s).ok())
                    .ok_or_else(|| err("not a timestamptz"))?,
            ),
        }),
        "bytea" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Bytes(b) => Some(b.clone()),
            other => Some(other.to_text().unwrap_or_default().into_bytes()),
        }),
        "json" | "jsonb" => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Json(j) => Some(j.clone()),
            other => Some(
                other.to_text()
                    .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
                    .ok_or_else(|| err("not a JSON document"))?,
            ),
        }),
        // text, varchar, bpchar, name and anything compared through ::text
        _ => Box::new(value.to_text()),
    };
    Ok(param)
}

fn parse_text<T: FromStr>(value: &SqlValue) -> Option<T> {
    match value {
        SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) | SqlValue::Text(_) => {
            value.to_text().and_then(|s| s.trim().parse().ok())
        }
        _ => None,
    }
}

/// Decode one column of a row by its wire type.
/// Decode one result column. `column` is the catalog column the select list
/// put at `idx`; types read back as text are parsed by its declared type.
fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    column: Option<&Column>,
    table: &str,
) -> Result<SqlValue> {
    let ty = row.columns()[idx].type_().clone();
    let scan = |e: tokio_postgres::Error| {
        ExtractError::scan(table, format!("column {} ({}): {}", row.columns()[idx].name(), ty.name(), e))
    };

    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx).map_err(scan)?.into(),
        "int2" => row.try_get::<_, Option<i16>>(idx).map_err(scan)?.into(),
        "int4" => row.try_get::<_, Option<i32>>(idx).map_err(scan)?.into(),
        "int8" => row.try_get::<_, Option<i64>>(idx).map_err(scan)?.into(),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(scan)?
            .map_or(SqlValue::Null, SqlValue::F32),
        "float8" => row.try_get::<_, Option<f64>>(idx).map_err(scan)?.into(),
        "uuid" => row.try_get::<_, Option<Uuid>>(idx).map_err(scan)?.into(),
        "time" => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .map_err(scan)?
            .map_or(SqlValue::Null, SqlValue::Time),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx).map_err(scan)?.into(),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(scan)?
            .into(),
        "text" | "varchar" | "bpchar" | "name" => {
            match (row.try_get::<_, Option<String>>(idx).map_err(scan)?, column) {
                (None, _) => SqlValue::Null,
                (Some(s), Some(col)) if is_text_decoded(&col.data_type) => {
                    SqlValue::from_pg_text(&col.data_type, s)
                }
                (Some(s), _) => SqlValue::Text(s),
            }
        }
        other => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(s)) => SqlValue::Unknown(s),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                warn!("cannot decode column type {} in {}: {}", other, table, e);
                SqlValue::Unknown(format!("<{}>", other))
            }
        },
    };
    Ok(value)
}

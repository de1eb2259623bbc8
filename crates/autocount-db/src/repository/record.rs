//! # Record Repository
//!
//! Reads and writes the synchronized entity tables, driven by the
//! [`EntitySchema`] of each entity class rather than per-entity SQL.
//!
//! ## Partial Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_fields(Supplier, id, {phone: "088-1"})                         │
//! │                                                                         │
//! │  UPDATE suppliers SET phone = ?, updated_at = ? WHERE id = ?           │
//! │                                                                         │
//! │  payment_terms, notes, created_at ... are never mentioned, so a sync   │
//! │  cannot null out a local-only column.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Document lines live in a child table and are replaced as a whole when
//! the `lines` field is written.

use std::collections::HashMap;

use autocount_core::mapper::normalize_fields;
use autocount_core::schema::{schema_for, EntitySchema, FieldKind};
use autocount_core::{DocumentLine, EntityKind, FieldMap, FieldValue, LocalRecord, Money};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Local table holding an entity class.
pub fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::InventoryItem => "components",
        EntityKind::Supplier => "suppliers",
        EntityKind::PurchaseOrder => "purchase_orders",
    }
}

/// Child table and foreign key column for document lines.
fn lines_table(kind: EntityKind) -> Option<(&'static str, &'static str)> {
    match kind {
        EntityKind::PurchaseOrder => Some(("purchase_order_lines", "purchase_order_id")),
        _ => None,
    }
}

/// Sync bookkeeping written alongside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStamp {
    pub at: DateTime<Utc>,
    /// ERP document number, when the ERP returned one.
    pub doc_no: Option<String>,
}

impl SyncStamp {
    pub fn now(doc_no: Option<String>) -> Self {
        SyncStamp {
            at: Utc::now(),
            doc_no,
        }
    }
}

/// Sync bookkeeping as stored.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SyncState {
    pub autocount_doc_no: Option<String>,
    pub autocount_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    parent_id: String,
    item_code: String,
    description: Option<String>,
    quantity: i64,
    unit_cost_cents: i64,
}

impl From<LineRow> for DocumentLine {
    fn from(row: LineRow) -> Self {
        DocumentLine {
            item_code: row.item_code,
            description: row.description,
            quantity: row.quantity,
            unit_cost: Money::from_cents(row.unit_cost_cents),
        }
    }
}

/// Repository for the synchronized entity tables.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists every record of an entity class, ordered by natural key.
    pub async fn list(&self, kind: EntityKind) -> DbResult<Vec<LocalRecord>> {
        let schema = schema_for(kind);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list(schema),
            table(kind),
            schema.key.local
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut lines = self.load_lines(kind, None).await?;

        let records = rows
            .iter()
            .map(|row| decode_record(schema, row, &mut lines))
            .collect::<DbResult<Vec<_>>>()?;

        debug!(entity = %kind, count = records.len(), "Loaded local records");
        Ok(records)
    }

    /// Finds a record by natural key.
    pub async fn find_by_key(&self, kind: EntityKind, key: &str) -> DbResult<Option<LocalRecord>> {
        let schema = schema_for(kind);
        self.find_where(schema, schema.key.local, key).await
    }

    /// Finds a record by internal id.
    pub async fn find_by_id(&self, kind: EntityKind, id: &str) -> DbResult<Option<LocalRecord>> {
        self.find_where(schema_for(kind), "id", id).await
    }

    async fn find_where(
        &self,
        schema: &EntitySchema,
        column: &str,
        value: &str,
    ) -> DbResult<Option<LocalRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            select_list(schema),
            table(schema.kind),
            column
        );

        let Some(row) = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let mut lines = self.load_lines(schema.kind, Some(&id)).await?;
        decode_record(schema, &row, &mut lines).map(Some)
    }

    /// Reads a record's sync bookkeeping columns.
    pub async fn sync_state(&self, kind: EntityKind, id: &str) -> DbResult<SyncState> {
        let sql = format!(
            "SELECT autocount_doc_no, autocount_synced_at FROM {} WHERE id = ?1",
            table(kind)
        );
        sqlx::query_as::<_, SyncState>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(kind.as_str(), id))
    }

    /// Counts records of an entity class.
    pub async fn count(&self, kind: EntityKind) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table(kind));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn load_lines(
        &self,
        kind: EntityKind,
        parent_id: Option<&str>,
    ) -> DbResult<HashMap<String, Vec<DocumentLine>>> {
        let Some((lines_table, fk)) = lines_table(kind) else {
            return Ok(HashMap::new());
        };

        let filter = if parent_id.is_some() {
            format!("WHERE {fk} = ?1")
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT {fk} AS parent_id, item_code, description, quantity, unit_cost_cents \
             FROM {lines_table} {filter} ORDER BY {fk}, line_no"
        );

        let mut query = sqlx::query_as::<_, LineRow>(&sql);
        if let Some(id) = parent_id {
            query = query.bind(id);
        }

        let mut grouped: HashMap<String, Vec<DocumentLine>> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            grouped
                .entry(row.parent_id.clone())
                .or_default()
                .push(row.into());
        }
        Ok(grouped)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new record. Missing fields take their canonical empty value.
    ///
    /// ## Returns
    /// The new record's internal id.
    pub async fn insert(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &FieldMap,
        stamp: Option<&SyncStamp>,
    ) -> DbResult<String> {
        autocount_core::validation::validate_natural_key(schema_for(kind).key.local, key)?;

        let schema = schema_for(kind);
        let fields = normalize_fields(schema, fields);
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let columns: Vec<&str> = scalar_columns(schema).collect();
        let mut names = vec!["id", schema.key.local];
        names.extend(columns.iter().copied());
        names.extend(["autocount_doc_no", "autocount_synced_at", "created_at", "updated_at"]);

        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table(kind),
            names.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql).bind(id.clone()).bind(key.to_string());
        for column in &columns {
            query = bind_value(query, fields.get(*column).unwrap_or(&FieldValue::Null))?;
        }
        query = query
            .bind(stamp.and_then(|s| s.doc_no.clone()))
            .bind(stamp.map(|s| s.at))
            .bind(now)
            .bind(now);

        let mut tx = self.pool.begin().await?;
        query.execute(&mut *tx).await.map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, key),
            other => other,
        })?;
        write_lines(&mut tx, schema, &id, &fields).await?;
        tx.commit().await?;

        debug!(entity = %kind, key = %key, id = %id, "Inserted record");
        Ok(id)
    }

    /// Updates only the given fields of a record.
    ///
    /// Columns not named in `fields` keep their value.
    pub async fn update_fields(
        &self,
        kind: EntityKind,
        id: &str,
        fields: &FieldMap,
        stamp: Option<&SyncStamp>,
    ) -> DbResult<()> {
        let schema = schema_for(kind);

        let scalar: Vec<(&str, &FieldValue)> = scalar_columns(schema)
            .filter_map(|column| fields.get(column).map(|v| (column, v)))
            .collect();

        let mut sets: Vec<String> = scalar
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect();
        let mut next = scalar.len() + 1;
        sets.push(format!("updated_at = ?{next}"));
        next += 1;
        if stamp.is_some() {
            sets.push(format!("autocount_synced_at = ?{next}"));
            sets.push(format!(
                "autocount_doc_no = COALESCE(?{}, autocount_doc_no)",
                next + 1
            ));
            next += 2;
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table(kind),
            sets.join(", "),
            next
        );

        let mut query = sqlx::query(&sql);
        for (column, value) in &scalar {
            let spec_kind = schema.field(column).map(|f| f.kind);
            let value = match spec_kind {
                Some(k) => autocount_core::mapper::normalize(k, value),
                None => (*value).clone(),
            };
            query = bind_value(query, &value)?;
        }
        query = query.bind(Utc::now());
        if let Some(stamp) = stamp {
            query = query.bind(stamp.at).bind(stamp.doc_no.clone());
        }
        query = query.bind(id.to_string());

        let mut tx = self.pool.begin().await?;
        let result = query.execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.as_str(), id));
        }
        write_lines(&mut tx, schema, id, fields).await?;
        tx.commit().await?;

        debug!(entity = %kind, id = %id, fields = scalar.len(), "Updated record");
        Ok(())
    }

    /// Stamps sync bookkeeping without touching any field.
    pub async fn mark_synced(&self, kind: EntityKind, id: &str, stamp: &SyncStamp) -> DbResult<()> {
        self.update_fields(kind, id, &FieldMap::new(), Some(stamp)).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Declared fields stored as columns on the entity table (lines excluded).
fn scalar_columns(schema: &EntitySchema) -> impl Iterator<Item = &'static str> + '_ {
    schema
        .fields
        .iter()
        .filter(|f| f.kind != FieldKind::Lines)
        .map(|f| f.local)
}

fn select_list(schema: &EntitySchema) -> String {
    let mut columns = vec!["id", schema.key.local];
    columns.extend(scalar_columns(schema));
    columns.join(", ")
}

fn decode_record(
    schema: &EntitySchema,
    row: &SqliteRow,
    lines: &mut HashMap<String, Vec<DocumentLine>>,
) -> DbResult<LocalRecord> {
    let id: String = row.try_get("id")?;
    let key: String = row.try_get(schema.key.local)?;

    let mut fields = FieldMap::new();
    for spec in schema.fields {
        let value = match spec.kind {
            FieldKind::Text => FieldValue::text(row.try_get::<Option<String>, _>(spec.local)?),
            FieldKind::Integer => row
                .try_get::<Option<i64>, _>(spec.local)?
                .map_or(FieldValue::Null, FieldValue::Integer),
            FieldKind::Money => row
                .try_get::<Option<i64>, _>(spec.local)?
                .map_or(FieldValue::Null, |c| FieldValue::Money(Money::from_cents(c))),
            FieldKind::Flag { .. } => row
                .try_get::<Option<bool>, _>(spec.local)?
                .map_or(FieldValue::Null, FieldValue::Flag),
            FieldKind::Date => row
                .try_get::<Option<NaiveDate>, _>(spec.local)?
                .map_or(FieldValue::Null, FieldValue::Date),
            FieldKind::Lines => match lines.remove(&id) {
                Some(found) => FieldValue::Lines(found),
                None => FieldValue::Null,
            },
        };
        fields.insert(spec.local.to_string(), value);
    }

    Ok(LocalRecord { id, key, fields })
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> DbResult<SqliteQuery<'q>> {
    Ok(match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Integer(i) => query.bind(*i),
        FieldValue::Money(m) => query.bind(m.cents()),
        FieldValue::Flag(b) => query.bind(*b),
        FieldValue::Date(d) => query.bind(*d),
        FieldValue::Lines(_) => {
            return Err(DbError::Internal(
                "document lines are not a column value".to_string(),
            ))
        }
    })
}

/// Replaces a record's lines when the lines field is part of the write.
async fn write_lines(
    conn: &mut SqliteConnection,
    schema: &EntitySchema,
    parent_id: &str,
    fields: &FieldMap,
) -> DbResult<()> {
    let Some(spec) = schema.fields.iter().find(|f| f.kind == FieldKind::Lines) else {
        return Ok(());
    };
    let Some(value) = fields.get(spec.local) else {
        return Ok(());
    };
    let Some((lines_table, fk)) = lines_table(schema.kind) else {
        return Err(DbError::Internal(format!(
            "{} declares lines but has no line table",
            schema.kind
        )));
    };

    sqlx::query(&format!("DELETE FROM {lines_table} WHERE {fk} = ?1"))
        .bind(parent_id)
        .execute(&mut *conn)
        .await?;

    let FieldValue::Lines(lines) = value else {
        return Ok(());
    };

    let sql = format!(
        "INSERT INTO {lines_table} \
         (id, {fk}, line_no, item_code, description, quantity, unit_cost_cents) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    );
    for (idx, line) in lines.iter().enumerate() {
        sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(parent_id)
            .bind(idx as i64 + 1)
            .bind(&line.item_code)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_cost.cents())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

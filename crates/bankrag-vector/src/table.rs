//! LanceDB housekeeping: the connection, the `meta` table holding one pointer
//! value per alias, and removal of abandoned generation directories.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};

use crate::schema::meta_schema;

pub const META_TABLE: &str = "meta";

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.with_context(|| format!("opening lancedb at {uri}"))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

async fn meta_table(conn: &Connection) -> Result<Table> {
    if !table_exists(conn, META_TABLE).await? {
        conn.create_empty_table(META_TABLE, meta_schema())
            .execute()
            .await
            .context("creating meta table")?;
    }
    Ok(conn.open_table(META_TABLE).execute().await?)
}

/// Upsert `key` → `value`; `key` stays unique.
pub async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let schema = meta_schema();
    let row = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![key])),
            Arc::new(StringArray::from(vec![value])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let table = meta_table(conn).await?;
    let mut upsert = table.merge_insert(&["key"]);
    upsert.when_matched_update_all(None).when_not_matched_insert_all();
    upsert
        .execute(Box::new(RecordBatchIterator::new([Ok(row)], schema)))
        .await
        .with_context(|| format!("writing meta key {key}"))?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, META_TABLE).await? {
        return Ok(None);
    }
    let table = conn.open_table(META_TABLE).execute().await?;
    let batches: Vec<RecordBatch> = table
        .query()
        .only_if(format!("key = '{}'", key.replace('\'', "''")))
        .select(Select::columns(&["value"]))
        .limit(1)
        .execute()
        .await?
        .try_collect()
        .await?;
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(None);
    };
    let values = batch
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .context("meta.value is not a string column")?;
    Ok(Some(values.value(0).to_string()))
}

/// Delete a table's directory under a local database root. Missing tables are ignored.
pub fn remove_table_dir(db_root: &Path, name: &str) -> Result<()> {
    let dir = db_root.join(format!("{name}.lance"));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).with_context(|| format!("removing {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn meta_values_are_upserted_per_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let conn = open_db(&tmp.path().to_string_lossy()).await.unwrap();
        assert_eq!(get_meta(&conn, "active:banco_rag").await.unwrap(), None);

        set_meta(&conn, "active:banco_rag", "{\"table\":\"a\"}").await.unwrap();
        set_meta(&conn, "active:otro", "{\"table\":\"x\"}").await.unwrap();
        set_meta(&conn, "active:banco_rag", "{\"table\":\"b\"}").await.unwrap();

        assert_eq!(get_meta(&conn, "active:banco_rag").await.unwrap().as_deref(), Some("{\"table\":\"b\"}"));
        assert_eq!(get_meta(&conn, "active:otro").await.unwrap().as_deref(), Some("{\"table\":\"x\"}"));
        let rows = conn.open_table(META_TABLE).execute().await.unwrap().count_rows(None).await.unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn removing_a_missing_table_dir_is_a_no_op() {
        let tmp = tempfile::TempDir::new().unwrap();
        remove_table_dir(tmp.path(), "banco_rag_20240101000000000").unwrap();
    }
}

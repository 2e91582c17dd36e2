use anyhow::{anyhow, Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    ArrayRef, BooleanArray, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
};
use bankrag_core::metadata::{
    FlatMetadata, Scalar, KEY_CATEGORY, KEY_CONTENT_TYPE, KEY_HAS_KEYWORDS, KEY_HEADER_PATH, KEY_KEYWORDS,
    KEY_PRIORITY, KEY_SECTION, KEY_SUBSECTION,
};
use bankrag_core::types::VectorRecord;
use lancedb::Connection;
use std::sync::Arc;
use tracing::debug;

use crate::schema::generation_schema;

const WRITE_BATCH_ROWS: usize = 1024;

/// Create table `name` holding `records` in order. `row_ordinal` records the
/// insertion order so reads can restore it.
pub async fn write_generation(conn: &Connection, name: &str, records: &[VectorRecord], dim: usize) -> Result<()> {
    if records.is_empty() {
        return Err(anyhow!("refusing to write an empty generation"));
    }
    let dim = i32::try_from(dim).context("embedding dimension does not fit the schema")?;
    let schema = generation_schema(dim);
    let mut batches = Vec::new();
    for (n, part) in records.chunks(WRITE_BATCH_ROWS).enumerate() {
        batches.push(Ok(records_to_batch(part, n * WRITE_BATCH_ROWS, dim)?));
    }
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
    conn.create_table(name, reader).execute().await?;
    debug!(table = name, rows = records.len(), "generation table written");
    Ok(())
}

pub fn records_to_batch(records: &[VectorRecord], first_ordinal: usize, dim: i32) -> Result<RecordBatch> {
    let flats: Vec<FlatMetadata> = records.iter().map(|r| r.metadata.flatten()).collect::<Result<_, _>>()?;

    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
    for r in records {
        if r.vector.len() != dim as usize {
            return Err(anyhow!("record {} has {} values, schema expects {dim}", r.chunk.id, r.vector.len()));
        }
        vectors.push(Some(r.vector.iter().copied().map(Some).collect()));
    }

    let text = |f: fn(&VectorRecord) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
    };
    let int = |f: fn(&VectorRecord) -> usize| -> Result<ArrayRef> {
        let values = records.iter().map(|r| i32::try_from(f(r))).collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Int32Array::from(values)))
    };
    let flat_str = |key: &str| -> Result<ArrayRef> {
        let values = flats
            .iter()
            .map(|m| match m.get(key) {
                Some(Scalar::Str(s)) => Ok(s.as_str()),
                _ => Err(anyhow!("flattened metadata lacks string '{key}'")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(StringArray::from(values)))
    };
    let priority = flats
        .iter()
        .map(|m| match m.get(KEY_PRIORITY) {
            Some(Scalar::Int(p)) => i32::try_from(*p).map_err(|e| anyhow!("priority {p}: {e}")),
            _ => Err(anyhow!("flattened metadata lacks integer '{KEY_PRIORITY}'")),
        })
        .collect::<Result<Vec<_>>>()?;
    let has_keywords = flats
        .iter()
        .map(|m| matches!(m.get(KEY_HAS_KEYWORDS), Some(Scalar::Bool(true))))
        .collect::<Vec<_>>();
    let ordinals = (0..records.len()).map(|i| (first_ordinal + i) as i64).collect::<Vec<_>>();

    let batch = RecordBatch::try_new(
        generation_schema(dim),
        vec![
            text(|r| r.chunk.id.as_str()),
            text(|r| r.chunk.doc_id.as_str()),
            text(|r| r.chunk.doc_path.as_str()),
            text(|r| r.chunk.source.as_str()),
            int(|r| r.chunk.chunk_index)?,
            int(|r| r.chunk.total_chunks)?,
            int(|r| r.chunk.segment_index)?,
            int(|r| r.chunk.char_len)?,
            Arc::new(BooleanArray::from(records.iter().map(|r| r.chunk.oversized).collect::<Vec<_>>())),
            text(|r| r.chunk.content.as_str()),
            text(|r| r.chunk.content_hash.as_str()),
            flat_str(KEY_KEYWORDS)?,
            flat_str(KEY_CATEGORY)?,
            flat_str(KEY_CONTENT_TYPE)?,
            Arc::new(Int32Array::from(priority)),
            flat_str(KEY_HEADER_PATH)?,
            flat_str(KEY_SECTION)?,
            flat_str(KEY_SUBSECTION)?,
            Arc::new(BooleanArray::from(has_keywords)),
            Arc::new(Int64Array::from(ordinals)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
        ],
    )?;
    Ok(batch)
}

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, BooleanArray, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, StringArray};
use bankrag_core::metadata::{
    FlatMetadata, Metadata, Scalar, KEY_CATEGORY, KEY_CONTENT_TYPE, KEY_HAS_KEYWORDS, KEY_HEADER_PATH, KEY_KEYWORDS,
    KEY_PRIORITY, KEY_SECTION, KEY_SUBSECTION,
};
use bankrag_core::types::{Chunk, VectorRecord};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;

use crate::schema::*;

/// Every record of generation `name`, in insertion order.
pub async fn read_generation(conn: &Connection, name: &str) -> Result<Vec<VectorRecord>> {
    let table = conn.open_table(name).execute().await?;
    let mut stream = table.query().execute().await?;
    let mut rows: Vec<(i64, VectorRecord)> = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        decode_batch(&batch, &mut rows)?;
    }
    rows.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(rows.into_iter().map(|(_, r)| r).collect())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{name}' missing or of unexpected type"))
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<(i64, VectorRecord)>) -> Result<()> {
    let id = column::<StringArray>(batch, COL_ID)?;
    let doc_id = column::<StringArray>(batch, COL_DOC_ID)?;
    let doc_path = column::<StringArray>(batch, COL_DOC_PATH)?;
    let source = column::<StringArray>(batch, COL_SOURCE)?;
    let chunk_index = column::<Int32Array>(batch, COL_CHUNK_INDEX)?;
    let total_chunks = column::<Int32Array>(batch, COL_TOTAL_CHUNKS)?;
    let segment_index = column::<Int32Array>(batch, COL_SEGMENT_INDEX)?;
    let char_len = column::<Int32Array>(batch, COL_CHAR_LEN)?;
    let oversized = column::<BooleanArray>(batch, COL_OVERSIZED)?;
    let content = column::<StringArray>(batch, COL_CONTENT)?;
    let content_hash = column::<StringArray>(batch, COL_CONTENT_HASH)?;
    let keywords = column::<StringArray>(batch, KEY_KEYWORDS)?;
    let category = column::<StringArray>(batch, KEY_CATEGORY)?;
    let content_type = column::<StringArray>(batch, KEY_CONTENT_TYPE)?;
    let priority = column::<Int32Array>(batch, KEY_PRIORITY)?;
    let header_path = column::<StringArray>(batch, KEY_HEADER_PATH)?;
    let section = column::<StringArray>(batch, KEY_SECTION)?;
    let subsection = column::<StringArray>(batch, KEY_SUBSECTION)?;
    let has_keywords = column::<BooleanArray>(batch, KEY_HAS_KEYWORDS)?;
    let ordinal = column::<Int64Array>(batch, COL_ROW_ORDINAL)?;
    let vectors = column::<FixedSizeListArray>(batch, COL_VECTOR)?;

    for i in 0..batch.num_rows() {
        if !vectors.is_valid(i) {
            return Err(anyhow!("row {} has no vector", id.value(i)));
        }
        let vector = vectors.value(i).as_primitive::<Float32Type>().values().to_vec();

        let mut flat = FlatMetadata::new();
        flat.insert(KEY_KEYWORDS.to_string(), Scalar::Str(keywords.value(i).to_string()));
        flat.insert(KEY_CATEGORY.to_string(), Scalar::Str(category.value(i).to_string()));
        flat.insert(KEY_CONTENT_TYPE.to_string(), Scalar::Str(content_type.value(i).to_string()));
        flat.insert(KEY_PRIORITY.to_string(), Scalar::Int(i64::from(priority.value(i))));
        flat.insert(KEY_HEADER_PATH.to_string(), Scalar::Str(header_path.value(i).to_string()));
        flat.insert(KEY_SECTION.to_string(), Scalar::Str(section.value(i).to_string()));
        flat.insert(KEY_SUBSECTION.to_string(), Scalar::Str(subsection.value(i).to_string()));
        flat.insert(KEY_HAS_KEYWORDS.to_string(), Scalar::Bool(has_keywords.value(i)));
        let metadata = Metadata::from_flat(&flat)?;

        let chunk = Chunk {
            id: id.value(i).to_string(),
            doc_id: doc_id.value(i).to_string(),
            doc_path: doc_path.value(i).to_string(),
            source: source.value(i).to_string(),
            header_path: metadata.header_path.clone(),
            content: content.value(i).to_string(),
            chunk_index: usize::try_from(chunk_index.value(i))?,
            total_chunks: usize::try_from(total_chunks.value(i))?,
            segment_index: usize::try_from(segment_index.value(i))?,
            char_len: usize::try_from(char_len.value(i))?,
            oversized: oversized.value(i),
            content_hash: content_hash.value(i).to_string(),
        };
        out.push((ordinal.value(i), VectorRecord { chunk, metadata, vector }));
    }
    Ok(())
}

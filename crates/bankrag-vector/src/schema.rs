use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const COL_ID: &str = "id";
pub const COL_DOC_ID: &str = "doc_id";
pub const COL_DOC_PATH: &str = "doc_path";
pub const COL_SOURCE: &str = "source";
pub const COL_CHUNK_INDEX: &str = "chunk_index";
pub const COL_TOTAL_CHUNKS: &str = "total_chunks";
pub const COL_SEGMENT_INDEX: &str = "segment_index";
pub const COL_CHAR_LEN: &str = "char_len";
pub const COL_OVERSIZED: &str = "oversized";
pub const COL_CONTENT: &str = "content";
pub const COL_CONTENT_HASH: &str = "content_hash";
pub const COL_ROW_ORDINAL: &str = "row_ordinal";
pub const COL_VECTOR: &str = "vector";

/// One index generation. Metadata columns carry the flattened scalar form;
/// `keywords` and `header_path` hold canonical JSON.
pub fn generation_schema(dim: i32) -> Arc<Schema> {
    use bankrag_core::metadata::{
        KEY_CATEGORY, KEY_CONTENT_TYPE, KEY_HAS_KEYWORDS, KEY_HEADER_PATH, KEY_KEYWORDS, KEY_PRIORITY,
        KEY_SECTION, KEY_SUBSECTION,
    };
    Arc::new(Schema::new(vec![
        Field::new(COL_ID, DataType::Utf8, false),
        Field::new(COL_DOC_ID, DataType::Utf8, false),
        Field::new(COL_DOC_PATH, DataType::Utf8, false),
        Field::new(COL_SOURCE, DataType::Utf8, false),
        Field::new(COL_CHUNK_INDEX, DataType::Int32, false),
        Field::new(COL_TOTAL_CHUNKS, DataType::Int32, false),
        Field::new(COL_SEGMENT_INDEX, DataType::Int32, false),
        Field::new(COL_CHAR_LEN, DataType::Int32, false),
        Field::new(COL_OVERSIZED, DataType::Boolean, false),
        Field::new(COL_CONTENT, DataType::Utf8, false),
        Field::new(COL_CONTENT_HASH, DataType::Utf8, false),
        Field::new(KEY_KEYWORDS, DataType::Utf8, false),
        Field::new(KEY_CATEGORY, DataType::Utf8, false),
        Field::new(KEY_CONTENT_TYPE, DataType::Utf8, false),
        Field::new(KEY_PRIORITY, DataType::Int32, false),
        Field::new(KEY_HEADER_PATH, DataType::Utf8, false),
        Field::new(KEY_SECTION, DataType::Utf8, false),
        Field::new(KEY_SUBSECTION, DataType::Utf8, false),
        Field::new(KEY_HAS_KEYWORDS, DataType::Boolean, false),
        Field::new(COL_ROW_ORDINAL, DataType::Int64, false),
        Field::new(
            COL_VECTOR,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ]))
}

/// Key/value table holding the active generation pointer per alias.
pub fn meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

/// Vector width declared by a generation schema.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(COL_VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, dim) => usize::try_from(*dim).ok(),
        _ => None,
    }
}

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "request_stats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub vendor_id: i64,
    pub endpoint_id: i64,
    pub endpoint_name: String,
    pub path: String,
    /// `YYYY-MM-DD`, used by per-day aggregation queries.
    pub date: String,
    pub interface_type: String,
    pub duration_ms: i64,
    pub status_code: i32,
    pub status_tag: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub reasoning_tokens: i64,
    pub created_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::{ActiveValue, Database, DatabaseConnection, EntityTrait, Schema};
use time::OffsetDateTime;

use relayhub_core::StatsRecord;

use crate::entities;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Append-only stats store over a local SQLite file.
#[derive(Clone)]
pub struct StatsStorage {
    db: DatabaseConnection,
}

impl StatsStorage {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = Database::connect(dsn).await?;
        Ok(Self { db })
    }

    pub async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::RequestStats)
            .sync(&self.db)
            .await?;
        Ok(())
    }

    pub async fn insert_request(&self, record: &StatsRecord) -> StorageResult<()> {
        let active = entities::request_stats::ActiveModel {
            id: ActiveValue::NotSet,
            vendor_id: ActiveValue::Set(record.vendor_id),
            endpoint_id: ActiveValue::Set(record.endpoint_id),
            endpoint_name: ActiveValue::Set(record.endpoint_name.clone()),
            path: ActiveValue::Set(record.path.clone()),
            date: ActiveValue::Set(record.date.clone()),
            interface_type: ActiveValue::Set(record.interface_type.as_str().to_string()),
            duration_ms: ActiveValue::Set(record.duration_ms),
            status_code: ActiveValue::Set(record.status_code as i32),
            status_tag: ActiveValue::Set(record.status_tag.clone()),
            input_tokens: ActiveValue::Set(record.usage.input as i64),
            output_tokens: ActiveValue::Set(record.usage.output as i64),
            cache_creation_tokens: ActiveValue::Set(record.usage.cached_create as i64),
            cache_read_tokens: ActiveValue::Set(record.usage.cached_read as i64),
            reasoning_tokens: ActiveValue::Set(record.usage.reasoning as i64),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        entities::RequestStats::insert(active).exec(&self.db).await?;
        Ok(())
    }
}

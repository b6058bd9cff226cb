//! Queue Store (C3): durable job state over a dedicated Postgres database.
//!
//! Each operation is a single statement; this store never opens a
//! multi-statement transaction across operations (spec.md §4.3). The only
//! operation requiring an atomic compare-and-set is `try_acquire_lock`,
//! written as a single conditional `UPDATE`.

mod schema;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use thiserror::Error;

use crate::types::QueueRow;
use schema::doc_text_extraction_queue as dteq;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("queue row not found: {0}")]
    NotFound(String),
}

#[derive(Queryable)]
struct QueueRowModel {
    extraction_id: i64,
    doc_id: String,
    doc_name: String,
    file_ext: String,
    source_uri: String,
    datalake_raw_uri: Option<String>,
    password: Option<String>,
    text_extraction_status: i32,
    number_of_pages: i32,
    is_processing: bool,
}

impl From<QueueRowModel> for QueueRow {
    fn from(m: QueueRowModel) -> Self {
        QueueRow {
            extraction_id: m.extraction_id,
            doc_id: m.doc_id,
            doc_name: m.doc_name,
            file_ext: m.file_ext,
            source_uri: m.source_uri,
            datalake_raw_uri: m.datalake_raw_uri,
            password: m.password,
            text_extraction_status: m.text_extraction_status,
            number_of_pages: m.number_of_pages,
            is_processing: m.is_processing,
        }
    }
}

/// Which URI column `set_uri` targets.
#[derive(Debug, Clone, Copy)]
pub enum UriField {
    Raw,
    Text,
}

pub struct QueueStore {
    pool: Pool<AsyncPgConnection>,
}

impl QueueStore {
    pub async fn connect(database_url: &str) -> Result<Self, QueueError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .max_size(10)
            .build()
            .map_err(|e| QueueError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(
        &self,
    ) -> Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>, QueueError>
    {
        self.pool.get().await.map_err(|e| QueueError::Pool(e.to_string()))
    }

    /// Reads only rows with matching `extraction_id` and `is_active = true`.
    pub async fn fetch_pending(&self, ids: &[i64]) -> Result<Vec<QueueRow>, QueueError> {
        let mut conn = self.conn().await?;
        let rows: Vec<QueueRowModel> = dteq::table
            .filter(dteq::extraction_id.eq_any(ids.to_vec()))
            .filter(dteq::is_active.eq(true))
            .select((
                dteq::extraction_id,
                dteq::doc_id,
                dteq::doc_name,
                dteq::file_ext,
                dteq::source_uri,
                dteq::datalake_raw_uri,
                dteq::password,
                dteq::text_extraction_status,
                dteq::number_of_pages,
                dteq::is_processing,
            ))
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(QueueRow::from).collect())
    }

    /// Atomic compare-and-set: succeeds only if `is_processing` was false.
    pub async fn try_acquire_lock(&self, doc_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        let affected = diesel::update(
            dteq::table
                .filter(dteq::doc_id.eq(doc_id))
                .filter(dteq::is_processing.eq(false)),
        )
        .set((
            dteq::is_processing.eq(true),
            dteq::processing_started_at.eq(Some(now)),
            dteq::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;
        Ok(affected > 0)
    }

    /// Unconditionally clears the lock. Called on every exit path.
    pub async fn release_lock(&self, doc_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
            .set((
                dteq::is_processing.eq(false),
                dteq::processing_started_at.eq(None::<chrono::DateTime<Utc>>),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn set_status(&self, doc_id: &str, status: i32) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
            .set((
                dteq::text_extraction_status.eq(status),
                dteq::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn set_uri(&self, doc_id: &str, field: UriField, value: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        match field {
            UriField::Raw => {
                diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
                    .set(dteq::datalake_raw_uri.eq(Some(value)))
                    .execute(&mut conn)
                    .await?;
            }
            UriField::Text => {
                diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
                    .set(dteq::datalake_text_uri.eq(Some(value)))
                    .execute(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    /// Writes both `last_error_message` and `error_message` (same text).
    pub async fn set_error(&self, doc_id: &str, message: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
            .set((
                dteq::last_error_message.eq(Some(message)),
                dteq::error_message.eq(Some(message)),
                dteq::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn set_duration(&self, doc_id: &str, seconds: i32) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
            .set(dteq::text_extraction_duration_seconds.eq(Some(seconds)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Sets `last_processed_at`, `updated_at`, and `extracted_at` to now.
    pub async fn touch_last_processed(&self, doc_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        diesel::update(dteq::table.filter(dteq::doc_id.eq(doc_id)))
            .set((
                dteq::last_processed_at.eq(Some(now)),
                dteq::extracted_at.eq(Some(now)),
                dteq::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-memory double used by orchestrator tests so the suite never needs a
/// live Postgres instance (SPEC_FULL.md §8).
#[async_trait::async_trait]
pub trait QueueBackend: Send + Sync {
    async fn fetch_pending(&self, ids: &[i64]) -> Result<Vec<QueueRow>, QueueError>;
    async fn try_acquire_lock(&self, doc_id: &str) -> Result<bool, QueueError>;
    async fn release_lock(&self, doc_id: &str) -> Result<(), QueueError>;
    async fn set_status(&self, doc_id: &str, status: i32) -> Result<(), QueueError>;
    async fn set_uri(&self, doc_id: &str, field: UriField, value: &str) -> Result<(), QueueError>;
    async fn set_error(&self, doc_id: &str, message: &str) -> Result<(), QueueError>;
    async fn set_duration(&self, doc_id: &str, seconds: i32) -> Result<(), QueueError>;
    async fn touch_last_processed(&self, doc_id: &str) -> Result<(), QueueError>;
}

#[async_trait::async_trait]
impl QueueBackend for QueueStore {
    async fn fetch_pending(&self, ids: &[i64]) -> Result<Vec<QueueRow>, QueueError> {
        QueueStore::fetch_pending(self, ids).await
    }
    async fn try_acquire_lock(&self, doc_id: &str) -> Result<bool, QueueError> {
        QueueStore::try_acquire_lock(self, doc_id).await
    }
    async fn release_lock(&self, doc_id: &str) -> Result<(), QueueError> {
        QueueStore::release_lock(self, doc_id).await
    }
    async fn set_status(&self, doc_id: &str, status: i32) -> Result<(), QueueError> {
        QueueStore::set_status(self, doc_id, status).await
    }
    async fn set_uri(&self, doc_id: &str, field: UriField, value: &str) -> Result<(), QueueError> {
        QueueStore::set_uri(self, doc_id, field, value).await
    }
    async fn set_error(&self, doc_id: &str, message: &str) -> Result<(), QueueError> {
        QueueStore::set_error(self, doc_id, message).await
    }
    async fn set_duration(&self, doc_id: &str, seconds: i32) -> Result<(), QueueError> {
        QueueStore::set_duration(self, doc_id, seconds).await
    }
    async fn touch_last_processed(&self, doc_id: &str) -> Result<(), QueueError> {
        QueueStore::touch_last_processed(self, doc_id).await
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory `QueueBackend` double for orchestrator tests.
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct MockQueueStore {
        rows: Mutex<HashMap<String, QueueRow>>,
    }

    impl MockQueueStore {
        pub fn new(rows: Vec<QueueRow>) -> Self {
            let map = rows.into_iter().map(|r| (r.doc_id.clone(), r)).collect();
            Self {
                rows: Mutex::new(map),
            }
        }

        pub fn snapshot(&self, doc_id: &str) -> Option<QueueRow> {
            self.rows.lock().unwrap().get(doc_id).cloned()
        }
    }

    #[async_trait::async_trait]
    impl QueueBackend for MockQueueStore {
        async fn fetch_pending(&self, ids: &[i64]) -> Result<Vec<QueueRow>, QueueError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| ids.contains(&r.extraction_id))
                .cloned()
                .collect())
        }

        async fn try_acquire_lock(&self, doc_id: &str) -> Result<bool, QueueError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(doc_id).ok_or_else(|| QueueError::NotFound(doc_id.to_string()))?;
            if row.is_processing {
                return Ok(false);
            }
            row.is_processing = true;
            Ok(true)
        }

        async fn release_lock(&self, doc_id: &str) -> Result<(), QueueError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(doc_id) {
                row.is_processing = false;
            }
            Ok(())
        }

        async fn set_status(&self, doc_id: &str, status: i32) -> Result<(), QueueError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(doc_id) {
                row.text_extraction_status = status;
            }
            Ok(())
        }

        async fn set_uri(&self, doc_id: &str, field: UriField, value: &str) -> Result<(), QueueError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(doc_id) {
                match field {
                    UriField::Raw => row.datalake_raw_uri = Some(value.to_string()),
                    UriField::Text => {}
                }
            }
            Ok(())
        }

        async fn set_error(&self, _doc_id: &str, _message: &str) -> Result<(), QueueError> {
            Ok(())
        }

        async fn set_duration(&self, _doc_id: &str, _seconds: i32) -> Result<(), QueueError> {
            Ok(())
        }

        async fn touch_last_processed(&self, _doc_id: &str) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let store = MockQueueStore::new(vec![QueueRow {
            extraction_id: 1,
            doc_id: "D1".to_string(),
            doc_name: "a.pdf".to_string(),
            file_ext: "pdf".to_string(),
            source_uri: "file:///tmp/a.pdf".to_string(),
            datalake_raw_uri: None,
            password: None,
            text_extraction_status: 0,
            number_of_pages: 1,
            is_processing: false,
        }]);

        assert!(store.try_acquire_lock("D1").await.unwrap());
        assert!(!store.try_acquire_lock("D1").await.unwrap());
        store.release_lock("D1").await.unwrap();
        assert!(store.try_acquire_lock("D1").await.unwrap());
    }
}

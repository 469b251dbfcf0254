/// Postgres 문서 저장소
/// `documents(path, doc)` 단일 테이블 위에 문서 트리를 올린다.
/// 변경 피드는 트리거의 pg_notify를 PgListener로 받아 broadcast로 중계한다.
// region:    --- Imports
use crate::error::Result;
use crate::store::{DocumentStore, StoreChange, CHANGE_FEED_CAPACITY};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Constants

/// 알림 채널 이름 (트리거와 일치해야 한다)
const NOTIFY_CHANNEL: &str = "documents_changed";

/// 리스너 재접속 백오프 (초기/최대)
const LISTEN_RETRY_BASE_MS: u64 = 200;
const LISTEN_RETRY_MAX_MS: u64 = 10_000;

// endregion: --- Constants

// region:    --- PostgresDocumentStore

pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    feed: broadcast::Sender<StoreChange>,
}

impl PostgresDocumentStore {
    /// 저장소 생성 및 리스너 기동
    pub async fn new() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("Failed to create pool");

        let pool = Arc::new(pool);
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let store = PostgresDocumentStore {
            pool: Arc::clone(&pool),
            feed: feed.clone(),
        };
        store.spawn_listener();
        store
    }

    /// 데이터베이스 풀 가져오기
    pub fn get_pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// 데이터베이스 초기화
    pub async fn initialize_database(&self) -> Result<()> {
        // 00-recreate-db.sql 실행
        let recreate_db_sql = include_str!("../sql/00-recreate-db.sql");
        sqlx::raw_sql(recreate_db_sql).execute(&*self.pool).await?;

        // 01-create-schema.sql 실행
        let create_schema_sql = include_str!("../sql/01-create-schema.sql");
        sqlx::raw_sql(create_schema_sql).execute(&*self.pool).await?;

        Ok(())
    }

    /// pg_notify 수신 태스크 기동.
    /// 접속이 끊기면 지수 백오프로 재접속한다. 재접속 공백 동안의 변경 복구는
    /// 브리지의 전체 스냅샷 재구독이 담당한다.
    fn spawn_listener(&self) {
        let pool = Arc::clone(&self.pool);
        let feed = self.feed.clone();
        tokio::spawn(async move {
            let mut backoff_ms = LISTEN_RETRY_BASE_MS;
            loop {
                match Self::pump_notifications(&pool, &feed).await {
                    Ok(()) => backoff_ms = LISTEN_RETRY_BASE_MS,
                    Err(e) => {
                        warn!(
                            "{:<12} --> 변경 리스너 중단, {}ms 후 재접속: {:?}",
                            "Store", backoff_ms, e
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(LISTEN_RETRY_MAX_MS);
                    }
                }
            }
        });
    }

    /// 알림 수신 루프. 에러 시 반환하여 재접속을 유도한다.
    async fn pump_notifications(
        pool: &PgPool,
        feed: &broadcast::Sender<StoreChange>,
    ) -> std::result::Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        info!(
            "{:<12} --> 변경 리스너 구독 시작: {}",
            "Store", NOTIFY_CHANNEL
        );

        loop {
            let notification = listener.recv().await?;
            let path = notification.payload().to_string();

            // 알림 페이로드는 경로만 담는다. 최신 문서를 다시 읽어 전달한다.
            let doc: Option<Value> =
                sqlx::query_scalar("SELECT doc FROM documents WHERE path = $1")
                    .bind(&path)
                    .fetch_optional(pool)
                    .await?;

            // 구독자가 없는 동안의 변경은 버려도 된다.
            // 소비자는 구독 시 전체 스냅샷부터 시작한다.
            let _ = feed.send(StoreChange { path, doc });
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let doc = sqlx::query_scalar("SELECT doc FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(doc)
    }

    async fn put(&self, path: &str, doc: Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (path, doc, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (path) DO UPDATE SET doc = EXCLUDED.doc, updated_at = now()",
        )
        .bind(path)
        .bind(&doc)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn put_if(&self, path: &str, field: &str, expected: &Value, doc: Value) -> Result<bool> {
        // 단일 UPDATE 문으로 조건 검사와 쓰기를 원자화한다.
        let result = sqlx::query(
            "UPDATE documents SET doc = $4, updated_at = now()
             WHERE path = $1 AND doc -> $2 = $3",
        )
        .bind(path)
        .bind(field)
        .bind(expected)
        .bind(&doc)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE path = $1")
            .bind(path)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let needle = format!("{}/%", prefix.trim_end_matches('/'));
        let rows = sqlx::query("SELECT path, doc FROM documents WHERE path LIKE $1 ORDER BY path")
            .bind(&needle)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("path"), row.get::<Value, _>("doc")))
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}

// endregion: --- PostgresDocumentStore

// region:    --- Startup Helper

/// 접속과 스키마 초기화를 묶어 기동 시점 실패를 바로 드러낸다.
pub async fn connect_and_initialize() -> Result<Arc<PostgresDocumentStore>> {
    let store = Arc::new(PostgresDocumentStore::new().await);
    if let Err(e) = store.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Store", e);
        return Err(e);
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Store");
    Ok(store)
}

// endregion: --- Startup Helper

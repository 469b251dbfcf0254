/// 문서 저장소 추상화
/// 계층적 경로(`a/b/c`)로 식별되는 JSON 문서 트리.
/// 문서 단위 last-write-wins이며, 문서 간 트랜잭션은 제공하지 않는다.
// region:    --- Imports
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod paths;

pub use memory::MemoryDocumentStore;

// endregion: --- Modules

// region:    --- Change Feed

/// 변경 피드 채널 용량. 소비자가 이만큼 뒤처지면 Lagged가 발생하고,
/// 브리지는 전체 스냅샷으로 재구독한다.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// 저장소 변경 이벤트. `doc == None`은 삭제를 의미한다.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub path: String,
    pub doc: Option<Value>,
}

// endregion: --- Change Feed

// region:    --- DocumentStore Trait

/// 문서 저장소 트레이트
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 경로의 문서 조회
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// 문서 쓰기 (무조건 덮어쓰기)
    async fn put(&self, path: &str, doc: Value) -> Result<()>;

    /// 조건부 쓰기: 현재 문서의 `field` 값이 `expected`와 같을 때만 덮어쓴다.
    /// 낙관적 상태 전이에 사용하는 유일한 원자적 갱신 수단.
    /// 조건 불일치 또는 문서 없음이면 `Ok(false)`.
    async fn put_if(&self, path: &str, field: &str, expected: &Value, doc: Value) -> Result<bool>;

    /// 문서 삭제. 문서가 없어도 성공으로 처리한다 (멱등).
    async fn delete(&self, path: &str) -> Result<()>;

    /// 접두사 아래 전체 문서 나열 (전체 스냅샷 읽기)
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>>;

    /// 전역 변경 피드 구독. 접두사 필터링은 소비자 몫이다.
    fn watch(&self) -> broadcast::Receiver<StoreChange>;
}

// endregion: --- DocumentStore Trait

// region:    --- Decode Helpers
// 원격 문서는 형식이 깨져 있을 수 있다. 필드 해석은 절대 실패하지 않고,
// 누락 시 문서화된 기본값으로 대체한다.

use chrono::{DateTime, Utc};

/// 필수 문자열 필드. 없으면 None (문서 드롭 대상).
pub(crate) fn req_str(doc: &Value, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 선택 문자열 필드. 없으면 빈 문자열.
pub(crate) fn opt_str(doc: &Value, field: &str) -> String {
    doc.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// 문자열 배열 필드. 없으면 빈 목록, 문자열이 아닌 원소는 버린다.
pub(crate) fn str_list(doc: &Value, field: &str) -> Vec<String> {
    doc.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 정수 필드. 없으면 기본값 0.
pub(crate) fn opt_i64(doc: &Value, field: &str) -> i64 {
    doc.get(field).and_then(Value::as_i64).unwrap_or(0)
}

/// 불리언 필드. 없으면 false.
pub(crate) fn opt_bool(doc: &Value, field: &str) -> bool {
    doc.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// RFC3339 시각 필드. 없거나 깨졌으면 UNIX epoch.
pub(crate) fn opt_time(doc: &Value, field: &str) -> DateTime<Utc> {
    doc.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// endregion: --- Decode Helpers

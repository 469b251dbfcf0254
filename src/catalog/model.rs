/// 상품 모델
// region:    --- Imports
use crate::store::{opt_i64, opt_str, opt_time, req_str, str_list};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// endregion: --- Imports

// region:    --- Product

/// 상품 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Published,
}

/// 상품 모델. 소유자(ownerId)만 수정할 수 있으며 id는 불변이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub price_start: i64,
    pub price_end: i64,
    pub status: ProductStatus,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// 원격 문서 방어적 해석.
    /// id 또는 ownerId가 없으면 해석 불가로 None을 반환한다 (호출자가 드롭 로그).
    /// 그 외 필드 기본값: 목록은 빈 목록, 가격은 0, 시각은 epoch, 상태는 draft.
    pub fn decode(doc: &Value) -> Option<Product> {
        let id = req_str(doc, "id")?;
        let owner_id = req_str(doc, "ownerId")?;
        let status = match doc.get("status").and_then(Value::as_str) {
            Some("published") => ProductStatus::Published,
            _ => ProductStatus::Draft,
        };
        Some(Product {
            id,
            owner_id,
            name: opt_str(doc, "name"),
            description: opt_str(doc, "description"),
            images: str_list(doc, "images"),
            price_start: opt_i64(doc, "priceStart"),
            price_end: opt_i64(doc, "priceEnd"),
            status,
            categories: str_list(doc, "categories"),
            created_at: opt_time(doc, "createdAt"),
        })
    }

    pub fn is_published(&self) -> bool {
        self.status == ProductStatus::Published
    }
}

// endregion: --- Product

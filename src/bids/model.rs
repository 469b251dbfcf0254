/// 교환 제안(Bid) 모델
/// 하나의 제안은 두 인덱스 루트(byBidder, byOwner)에 같은 내용으로 복제된다.
// region:    --- Imports
use crate::store::{opt_bool, opt_str, opt_time, req_str, str_list};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// endregion: --- Imports

// region:    --- Status

/// 제안 상태. pending에서 accepted 또는 rejected로만 전이하며, 둘 다 종결 상태다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BidStatus::Accepted | BidStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        }
    }
}

// endregion: --- Status

// region:    --- Bid

/// 제안 이력 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidHistoryEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// 교환 제안 모델
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub bidder_id: String,
    pub target_product_id: String,
    pub target_product_owner_id: String,
    pub offered_product_ids: Vec<String>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub notified: bool,
    pub history: Vec<BidHistoryEntry>,
}

impl Bid {
    /// 새 제안 생성 (pending 상태, 생성 이력 1건)
    pub fn new(
        id: String,
        bidder_id: String,
        target_product_id: String,
        target_product_owner_id: String,
        offered_product_ids: Vec<String>,
    ) -> Bid {
        let now = Utc::now();
        Bid {
            id,
            bidder_id,
            target_product_id,
            target_product_owner_id,
            offered_product_ids,
            status: BidStatus::Pending,
            created_at: now,
            notified: false,
            history: vec![BidHistoryEntry {
                action: "created".to_string(),
                timestamp: now,
            }],
        }
    }

    /// 상태 전이본 생성: 새 상태와 이력 항목을 더한 사본
    pub fn transitioned(&self, status: BidStatus) -> Bid {
        let mut next = self.clone();
        next.status = status;
        next.history.push(BidHistoryEntry {
            action: status.as_str().to_string(),
            timestamp: Utc::now(),
        });
        next
    }

    /// 저장소 문서로 직렬화
    pub fn encode(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 원격 문서 방어적 해석.
    /// id와 외래 키(bidderId, targetProductId, targetProductOwnerId)가 없으면
    /// 해석 불가로 None을 반환한다 (호출자가 드롭 로그).
    /// 알 수 없는 상태 문자열은 pending으로, notified 누락은 false로,
    /// 목록 누락은 빈 목록으로 처리한다.
    pub fn decode(doc: &Value) -> Option<Bid> {
        let id = req_str(doc, "id")?;
        let bidder_id = req_str(doc, "bidderId")?;
        let target_product_id = req_str(doc, "targetProductId")?;
        let target_product_owner_id = req_str(doc, "targetProductOwnerId")?;

        let status = match doc.get("status").and_then(Value::as_str) {
            Some("accepted") => BidStatus::Accepted,
            Some("rejected") => BidStatus::Rejected,
            _ => BidStatus::Pending,
        };

        let history = doc
            .get("history")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.is_object())
                    .map(|entry| BidHistoryEntry {
                        action: opt_str(entry, "action"),
                        timestamp: opt_time(entry, "timestamp"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Bid {
            id,
            bidder_id,
            target_product_id,
            target_product_owner_id,
            offered_product_ids: str_list(doc, "offeredProductIds"),
            status,
            created_at: opt_time(doc, "createdAt"),
            notified: opt_bool(doc, "notified"),
            history,
        })
    }
}

// endregion: --- Bid

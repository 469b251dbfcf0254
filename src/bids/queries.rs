/// 제안 읽기 전용 조회
// region:    --- Imports
use crate::bids::model::Bid;
use crate::error::Result;
use crate::store::{paths, DocumentStore};
use serde::Deserialize;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Queries

/// 조회 역할: 내가 보낸 제안(bidder) / 내 상품에 들어온 제안(owner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidRole {
    Bidder,
    Owner,
}

/// 역할별 제안 목록 조회. 순수 읽기이며 최신 생성 순으로 반환한다.
/// 해석 불가 문서는 경고 로그와 함께 버린다.
pub async fn list_bids_for(
    store: &dyn DocumentStore,
    user_id: &str,
    role: BidRole,
) -> Result<Vec<Bid>> {
    let prefix = match role {
        BidRole::Bidder => paths::bids_of_bidder(user_id),
        BidRole::Owner => paths::bids_of_owner(user_id),
    };
    info!("{:<12} --> 제안 목록 조회: {}", "Query", prefix);

    let docs = store.list(&prefix).await?;
    let mut bids = Vec::with_capacity(docs.len());
    for (path, doc) in docs {
        match Bid::decode(&doc) {
            Some(bid) => bids.push(bid),
            None => warn!("{:<12} --> 해석 불가 제안 문서 드롭: {}", "Query", path),
        }
    }
    bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(bids)
}

/// 제안 id로 양쪽 인덱스를 차례로 탐색.
/// 행위자를 모르는 상태에서 NotFound와 Unauthorized를 구분할 때 쓴다.
pub async fn find_bid(store: &dyn DocumentStore, bid_id: &str) -> Result<Option<Bid>> {
    for root in [paths::BIDS_BY_BIDDER, paths::BIDS_BY_OWNER] {
        for (path, doc) in store.list(root).await? {
            if paths::leaf(&path) != bid_id {
                continue;
            }
            match Bid::decode(&doc) {
                Some(bid) => return Ok(Some(bid)),
                None => warn!("{:<12} --> 해석 불가 제안 문서 드롭: {}", "Query", path),
            }
        }
    }
    Ok(None)
}

// endregion: --- Queries

/// 교환 제안 커맨드 처리
/// 1. 제안 생성
/// 2. 수락 / 거절 (낙관적 상태 전이)
/// 3. 취소
// region:    --- Imports
use crate::bids::model::{Bid, BidStatus};
use crate::bids::queries;
use crate::catalog::ProductCatalog;
use crate::error::{ExchangeError, Result};
use crate::store::{paths, DocumentStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// 제안 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateBidCommand {
    pub target_product_id: String,
    pub offered_product_ids: Vec<String>,
}

// endregion: --- Commands

// region:    --- BidLedger

/// 제안 원장: 생성·조회·전이·취소와 두 인덱스의 논리적 일관성을 책임진다.
/// 두 인덱스 쓰기는 트랜잭션으로 묶이지 않으며, 부분 실패는 읽기 경로가 복구한다.
pub struct BidLedger {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn ProductCatalog>,
}

impl BidLedger {
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<dyn ProductCatalog>) -> Self {
        BidLedger { store, catalog }
    }

    /// 1. 제안 생성
    /// 입찰자 인덱스를 먼저 쓴다 (존재의 기준 사본). 소유자 인덱스 쓰기가
    /// 실패하면 부분 상태로 남고, 브리지의 스냅샷 복구가 나중에 메운다.
    /// 같은 논리적 요청의 재제출은 중복 제거하지 않는다 (UI 계층 책임).
    pub async fn create_bid(&self, bidder_id: &str, cmd: CreateBidCommand) -> Result<String> {
        info!("{:<12} --> 제안 생성 요청: bidder={}", "Command", bidder_id);

        if cmd.offered_product_ids.is_empty() {
            return Err(ExchangeError::Validation(
                "제시할 상품을 하나 이상 선택해야 합니다.".to_string(),
            ));
        }

        // 대상 상품 검증: 존재해야 하고, 본인 소유가 아니어야 한다
        let target = self
            .catalog
            .get(&cmd.target_product_id)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(cmd.target_product_id.clone()))?;
        if target.owner_id == bidder_id {
            return Err(ExchangeError::Validation(
                "자신의 상품에는 제안할 수 없습니다.".to_string(),
            ));
        }

        // 제시 상품 검증: 모두 존재하고, 입찰자 소유이며, 공개 상태여야 한다
        for product_id in &cmd.offered_product_ids {
            let product = self
                .catalog
                .get(product_id)
                .await?
                .ok_or_else(|| ExchangeError::NotFound(product_id.clone()))?;
            if product.owner_id != bidder_id {
                return Err(ExchangeError::Validation(format!(
                    "본인 소유가 아닌 상품은 제시할 수 없습니다: {}",
                    product_id
                )));
            }
            if !product.is_published() {
                return Err(ExchangeError::Validation(format!(
                    "공개되지 않은 상품은 제시할 수 없습니다: {}",
                    product_id
                )));
            }
        }

        let bid = Bid::new(
            uuid::Uuid::new_v4().to_string(),
            bidder_id.to_string(),
            cmd.target_product_id.clone(),
            target.owner_id.clone(),
            cmd.offered_product_ids.clone(),
        );

        // 입찰자 인덱스 쓰기: 실패하면 제안 자체가 생성되지 않은 것이다
        self.store
            .put(&paths::bid_by_bidder(bidder_id, &bid.id), bid.encode())
            .await?;

        // 소유자 인덱스 쓰기: 실패해도 롤백하지 않는다 (허용된 부분 상태)
        if let Err(e) = self
            .store
            .put(&paths::bid_by_owner(&target.owner_id, &bid.id), bid.encode())
            .await
        {
            warn!(
                "{:<12} --> 소유자 인덱스 쓰기 실패 (읽기 경로가 복구): bid={}, {:?}",
                "Command", bid.id, e
            );
        }

        info!("{:<12} --> 제안 생성 완료: bid={}", "Command", bid.id);
        Ok(bid.id)
    }

    /// 2-1. 제안 수락
    pub async fn accept_bid(&self, bid_id: &str, actor_id: &str) -> Result<()> {
        self.resolve_bid(bid_id, actor_id, BidStatus::Accepted).await
    }

    /// 2-2. 제안 거절
    pub async fn reject_bid(&self, bid_id: &str, actor_id: &str) -> Result<()> {
        self.resolve_bid(bid_id, actor_id, BidStatus::Rejected).await
    }

    /// 종결 전이 공통 처리.
    /// 소유자 인덱스 사본에 대한 단일 조건부 쓰기(status == pending일 때만)가
    /// 유일한 동시성 제어다. 조건 불일치는 StateConflict로 반환하고 재시도하지
    /// 않는다 — 먼저 쓴 쪽이 이긴다.
    async fn resolve_bid(&self, bid_id: &str, actor_id: &str, status: BidStatus) -> Result<()> {
        info!(
            "{:<12} --> 제안 {} 요청: bid={}, actor={}",
            "Command",
            status.as_str(),
            bid_id,
            actor_id
        );

        let bid = self.load_for_owner(bid_id, actor_id).await?;
        if bid.status.is_terminal() {
            return Err(ExchangeError::StateConflict(bid_id.to_string()));
        }

        let next = bid.transitioned(status);
        let owner_path = paths::bid_by_owner(actor_id, bid_id);
        let updated = self
            .store
            .put_if(&owner_path, "status", &json!("pending"), next.encode())
            .await?;
        if !updated {
            // 동시 전이 경합에서 진 경우
            return Err(ExchangeError::StateConflict(bid_id.to_string()));
        }

        // 입찰자 인덱스 미러링: 실패는 허용된 부분 상태 (종결 상태 우선 복구)
        if let Err(e) = self
            .store
            .put(&paths::bid_by_bidder(&next.bidder_id, bid_id), next.encode())
            .await
        {
            warn!(
                "{:<12} --> 입찰자 인덱스 미러 실패 (읽기 경로가 복구): bid={}, {:?}",
                "Command", bid_id, e
            );
        }

        info!(
            "{:<12} --> 제안 {} 완료: bid={}",
            "Command",
            status.as_str(),
            bid_id
        );
        Ok(())
    }

    /// 3. 제안 취소 (pending 상태에서만, 입찰자 본인만)
    /// 입찰자 인덱스부터 지운다. 소유자 사본만 남은 부분 상태는
    /// 소유자 측 스냅샷 복구가 정리한다.
    pub async fn cancel_bid(&self, bid_id: &str, actor_id: &str) -> Result<()> {
        info!(
            "{:<12} --> 제안 취소 요청: bid={}, actor={}",
            "Command", bid_id, actor_id
        );

        let bid = self.load_for_bidder(bid_id, actor_id).await?;
        if bid.status.is_terminal() {
            return Err(ExchangeError::StateConflict(bid_id.to_string()));
        }

        self.store
            .delete(&paths::bid_by_bidder(actor_id, bid_id))
            .await?;
        if let Err(e) = self
            .store
            .delete(&paths::bid_by_owner(&bid.target_product_owner_id, bid_id))
            .await
        {
            warn!(
                "{:<12} --> 소유자 인덱스 삭제 실패 (읽기 경로가 복구): bid={}, {:?}",
                "Command", bid_id, e
            );
        }

        info!("{:<12} --> 제안 취소 완료: bid={}", "Command", bid_id);
        Ok(())
    }

    /// 4. 역할별 제안 목록 조회 (순수 읽기)
    pub async fn list_bids_for(
        &self,
        user_id: &str,
        role: queries::BidRole,
    ) -> Result<Vec<Bid>> {
        queries::list_bids_for(self.store.as_ref(), user_id, role).await
    }

    /// 소유자 행위자 기준으로 제안 로드.
    /// 소유자 사본이 없고 입찰자 사본만 있으면 부분 생성 상태다:
    /// 소유자 사본을 재발행(복구)한 뒤 진행한다.
    async fn load_for_owner(&self, bid_id: &str, actor_id: &str) -> Result<Bid> {
        let owner_path = paths::bid_by_owner(actor_id, bid_id);
        if let Some(doc) = self.store.get(&owner_path).await? {
            if let Some(bid) = Bid::decode(&doc) {
                return Ok(bid);
            }
            warn!("{:<12} --> 해석 불가 제안 문서: {}", "Command", owner_path);
        }

        match queries::find_bid(self.store.as_ref(), bid_id).await? {
            Some(bid) if bid.target_product_owner_id == actor_id => {
                warn!(
                    "{:<12} --> 소유자 인덱스 누락 복구: bid={}",
                    "Command", bid_id
                );
                self.store.put(&owner_path, bid.encode()).await?;
                Ok(bid)
            }
            Some(_) => Err(ExchangeError::Unauthorized(
                "대상 상품 소유자만 제안을 처리할 수 있습니다.".to_string(),
            )),
            None => Err(ExchangeError::NotFound(bid_id.to_string())),
        }
    }

    /// 입찰자 행위자 기준으로 제안 로드.
    /// 상태의 기준은 소유자 사본이다: 전이 직후 미러 쓰기가 실패하면
    /// 입찰자 사본이 낡은 pending으로 남으므로, 소유자 사본의 종결 상태를
    /// 먼저 반영한 뒤 반환한다. 낡은 사본만 믿고 취소하면 이미 수락된
    /// 제안을 지우게 된다.
    async fn load_for_bidder(&self, bid_id: &str, actor_id: &str) -> Result<Bid> {
        let bidder_path = paths::bid_by_bidder(actor_id, bid_id);
        if let Some(doc) = self.store.get(&bidder_path).await? {
            if let Some(bid) = Bid::decode(&doc) {
                return Ok(self.adopt_owner_status(bid).await);
            }
            warn!("{:<12} --> 해석 불가 제안 문서: {}", "Command", bidder_path);
        }

        match queries::find_bid(self.store.as_ref(), bid_id).await? {
            Some(bid) if bid.bidder_id == actor_id => Ok(self.adopt_owner_status(bid).await),
            Some(_) => Err(ExchangeError::Unauthorized(
                "제안한 본인만 취소할 수 있습니다.".to_string(),
            )),
            None => Err(ExchangeError::NotFound(bid_id.to_string())),
        }
    }

    /// 소유자 사본의 종결 상태 반영.
    /// 소유자 사본이 종결 상태이고 입찰자 사본이 다르면 소유자 사본을
    /// 채택하고, 낡은 입찰자 미러도 고쳐 둔다. 조회 실패 시에는 입찰자
    /// 사본으로 진행한다 — 다음 읽기가 다시 시도한다.
    async fn adopt_owner_status(&self, bid: Bid) -> Bid {
        let owner_path = paths::bid_by_owner(&bid.target_product_owner_id, &bid.id);
        let owner_doc = match self.store.get(&owner_path).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "{:<12} --> 소유자 사본 조회 실패 (입찰자 사본으로 진행): bid={}, {:?}",
                    "Command", bid.id, e
                );
                return bid;
            }
        };

        match owner_doc.as_ref().and_then(Bid::decode) {
            Some(owner) if owner.status.is_terminal() && owner.status != bid.status => {
                warn!(
                    "{:<12} --> 낡은 입찰자 미러 복구: bid={}, status={}",
                    "Command",
                    owner.id,
                    owner.status.as_str()
                );
                if let Err(e) = self
                    .store
                    .put(&paths::bid_by_bidder(&owner.bidder_id, &owner.id), owner.encode())
                    .await
                {
                    warn!(
                        "{:<12} --> 입찰자 인덱스 미러 실패 (읽기 경로가 복구): bid={}, {:?}",
                        "Command", owner.id, e
                    );
                }
                owner
            }
            _ => bid,
        }
    }
}

// endregion: --- BidLedger

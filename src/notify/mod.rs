/// 알림 디스패처
/// 브리지 스냅샷에서 종결 전이(accepted/rejected)를 관찰해
/// 프로세스당 (bidId, status) 쌍마다 최대 한 번만 외부 알림을 보낸다.
// region:    --- Imports
use crate::bids::model::{Bid, BidStatus};
use crate::error::Result;
use crate::store::{paths, DocumentStore};
use crate::sync::RealtimeSyncBridge;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Modules
pub mod model;

pub use model::{Notification, NotificationData, PushMessage};

// endregion: --- Modules

// region:    --- PushSender

/// 푸시 전달 트레이트. 전달은 fire-and-forget이다:
/// 실패는 로그만 남기고 무한 재시도하지 않는다.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, recipient_id: &str, message: &PushMessage)
        -> std::result::Result<(), String>;
}

/// 푸시 게이트웨이 HTTP 구현체
pub struct HttpPushSender {
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpPushSender {
    pub fn new(gateway_url: String) -> Self {
        HttpPushSender {
            client: reqwest::Client::new(),
            gateway_url,
        }
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(
        &self,
        recipient_id: &str,
        message: &PushMessage,
    ) -> std::result::Result<(), String> {
        let payload = json!({
            "to": recipient_id,
            "title": message.title,
            "body": message.body,
            "data": message.data,
        });
        self.client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

// endregion: --- PushSender

// region:    --- NotificationDispatcher

pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    sender: Arc<dyn PushSender>,
    /// 프로세스 수명 동안 유지되는 멱등 집합.
    /// notified 플래그 쓰기는 관찰과 원자적이지 않으므로, 같은 스냅샷이
    /// 중복 전달되어도 이 집합이 외부 발송을 한 번으로 접는다.
    seen: Mutex<HashSet<(String, BidStatus)>>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, sender: Arc<dyn PushSender>) -> Self {
        NotificationDispatcher {
            store,
            sender,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// 디스패처 시작: 입찰자 인덱스 전체를 구독하고 스냅샷을 소비한다
    pub async fn start(&self) {
        let bridge = RealtimeSyncBridge::new(Arc::clone(&self.store));
        let handle = bridge.subscribe(paths::BIDS_BY_BIDDER);
        let mut rx = handle.receiver();
        info!("{:<12} --> 알림 디스패처 시작", "Dispatcher");

        loop {
            if rx.changed().await.is_err() {
                error!("{:<12} --> 브리지 스트림 종료", "Dispatcher");
                return;
            }
            let bids: Vec<Bid> = rx.borrow_and_update().bids.values().cloned().collect();
            for bid in bids {
                self.observe(&bid).await;
            }
        }
    }

    /// 스냅샷 1건 관찰. 종결 상태이고 미통지인 제안만 발화 대상이다.
    pub async fn observe(&self, bid: &Bid) {
        if !bid.status.is_terminal() || bid.notified {
            return;
        }

        // 부수 효과 전에 멱등 집합부터 갱신한다
        {
            let mut seen = self.seen.lock().expect("seen lock poisoned");
            if !seen.insert((bid.id.clone(), bid.status)) {
                return;
            }
        }

        info!(
            "{:<12} --> 알림 발화: bid={}, status={}",
            "Dispatcher",
            bid.id,
            bid.status.as_str()
        );

        let message = build_message(bid);

        // 1. 외부 푸시 발송 (fire-and-forget)
        if let Err(e) = self.sender.send(&bid.bidder_id, &message).await {
            warn!(
                "{:<12} --> 푸시 발송 실패 (재시도 없음): bid={}, {}",
                "Dispatcher", bid.id, e
            );
        }

        // 2. 수신함 문서 기록
        let notification = Notification::new(bid.bidder_id.clone(), &message);
        if let Err(e) = self
            .store
            .put(
                &paths::notification(&bid.bidder_id, &notification.id),
                notification.encode(),
            )
            .await
        {
            warn!(
                "{:<12} --> 수신함 기록 실패: bid={}, {:?}",
                "Dispatcher", bid.id, e
            );
        }

        // 3. notified 플래그 영속화 (notified == false일 때만, 양쪽 인덱스)
        let mut flagged = bid.clone();
        flagged.notified = true;
        for path in [
            paths::bid_by_owner(&bid.target_product_owner_id, &bid.id),
            paths::bid_by_bidder(&bid.bidder_id, &bid.id),
        ] {
            match self
                .store
                .put_if(&path, "notified", &json!(false), flagged.encode())
                .await
            {
                Ok(_) => {}
                Err(e) => warn!(
                    "{:<12} --> notified 플래그 쓰기 실패: {}, {:?}",
                    "Dispatcher", path, e
                ),
            }
        }
    }
}

/// 상태별 푸시 메시지 구성
fn build_message(bid: &Bid) -> PushMessage {
    let (title, body) = match bid.status {
        BidStatus::Accepted => (
            "교환 제안이 수락되었습니다",
            "상대방이 회원님의 교환 제안을 수락했습니다. 대화를 시작해 보세요.",
        ),
        BidStatus::Rejected => (
            "교환 제안이 거절되었습니다",
            "상대방이 회원님의 교환 제안을 거절했습니다.",
        ),
        // 발화 조건에서 걸러지므로 도달하지 않는다
        BidStatus::Pending => ("교환 제안 상태 변경", ""),
    };
    PushMessage {
        title: title.to_string(),
        body: body.to_string(),
        data: NotificationData {
            bid_id: bid.id.clone(),
            target_product_id: bid.target_product_id.clone(),
        },
    }
}

// endregion: --- NotificationDispatcher

// region:    --- Inbox Queries

/// 수신함 목록 조회 (최신 순)
pub async fn list_notifications(
    store: &dyn DocumentStore,
    recipient_id: &str,
) -> Result<Vec<Notification>> {
    let docs = store.list(&paths::notifications_of(recipient_id)).await?;
    let mut notifications = Vec::with_capacity(docs.len());
    for (path, doc) in docs {
        match Notification::decode(&doc) {
            Some(notification) => notifications.push(notification),
            None => warn!("{:<12} --> 해석 불가 알림 문서 드롭: {}", "Dispatcher", path),
        }
    }
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(notifications)
}

/// 알림 읽음 처리
pub async fn mark_notification_read(
    store: &dyn DocumentStore,
    recipient_id: &str,
    notification_id: &str,
) -> Result<()> {
    let path = paths::notification(recipient_id, notification_id);
    let doc = store
        .get(&path)
        .await?
        .ok_or_else(|| crate::error::ExchangeError::NotFound(notification_id.to_string()))?;
    let mut notification = Notification::decode(&doc)
        .ok_or_else(|| crate::error::ExchangeError::NotFound(notification_id.to_string()))?;
    notification.read = true;
    store.put(&path, notification.encode()).await
}

// endregion: --- Inbox Queries

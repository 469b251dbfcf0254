use async_trait::async_trait;
use barter_service::bids::{Bid, BidLedger, BidRole, BidStatus, CreateBidCommand};
use barter_service::catalog::{ProductCatalog, StoreProductCatalog};
use barter_service::error::{ExchangeError, Result};
use barter_service::handlers::{self, AppState};
use barter_service::notify::{self, NotificationDispatcher, PushMessage, PushSender};
use barter_service::session::SessionManager;
use barter_service::store::{paths, DocumentStore, MemoryDocumentStore, StoreChange};
use barter_service::sync::RealtimeSyncBridge;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};

/// 트레이싱 초기화
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 인메모리 저장소 기반 원장 설정
fn setup() -> (Arc<dyn DocumentStore>, Arc<BidLedger>) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let catalog: Arc<dyn ProductCatalog> = Arc::new(StoreProductCatalog::new(Arc::clone(&store)));
    let ledger = Arc::new(BidLedger::new(Arc::clone(&store), catalog));
    (store, ledger)
}

/// 테스트용 상품 문서 생성
async fn create_test_product(
    store: &dyn DocumentStore,
    owner_id: &str,
    product_id: &str,
    name: &str,
    published: bool,
) {
    let status = if published { "published" } else { "draft" };
    let doc = json!({
        "id": product_id,
        "ownerId": owner_id,
        "name": name,
        "description": "교환 테스트를 위한 상품입니다.",
        "images": [],
        "priceStart": 10000,
        "priceEnd": 20000,
        "status": status,
        "categories": ["교환"],
        "createdAt": chrono::Utc::now().to_rfc3339(),
    });
    store
        .put(&paths::product(owner_id, product_id), doc)
        .await
        .expect("상품 생성 실패");
}

/// 기본 시나리오 상품 구성: u1이 p10, p11을 제시해 u2의 p99에 제안한다
async fn seed_exchange_products(store: &dyn DocumentStore) {
    create_test_product(store, "u1", "p10", "필름 카메라", true).await;
    create_test_product(store, "u1", "p11", "단렌즈", true).await;
    create_test_product(store, "u2", "p99", "빈티지 턴테이블", true).await;
}

/// 기본 시나리오 제안 생성
async fn create_scenario_bid(ledger: &BidLedger) -> String {
    ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "p99".to_string(),
                offered_product_ids: vec!["p10".to_string(), "p11".to_string()],
            },
        )
        .await
        .expect("제안 생성 실패")
}

/// 발송 내역을 기록하는 테스트용 푸시 전달자
struct RecordingPushSender {
    pushes: Mutex<Vec<(String, PushMessage)>>,
}

impl RecordingPushSender {
    fn new() -> Self {
        RecordingPushSender {
            pushes: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<(String, PushMessage)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send(
        &self,
        recipient_id: &str,
        message: &PushMessage,
    ) -> std::result::Result<(), String> {
        self.pushes
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), message.clone()));
        Ok(())
    }
}

/// 지정된 접두사에 대한 put을 정해진 횟수만큼 실패시키는 저장소 래퍼
struct FlakyDocumentStore {
    inner: MemoryDocumentStore,
    fail_prefix: String,
    remaining_failures: AtomicUsize,
}

impl FlakyDocumentStore {
    fn new(fail_prefix: &str, failures: usize) -> Self {
        FlakyDocumentStore {
            inner: MemoryDocumentStore::new(),
            fail_prefix: fail_prefix.to_string(),
            remaining_failures: AtomicUsize::new(failures),
        }
    }

    /// 이후 put 호출부터 실패시킬 횟수 설정
    fn fail_next(&self, failures: usize) {
        self.remaining_failures.store(failures, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, doc: Value) -> Result<()> {
        if path.starts_with(&self.fail_prefix)
            && self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ExchangeError::TransientNetwork(
                "주입된 쓰기 실패".to_string(),
            ));
        }
        self.inner.put(path, doc).await
    }

    async fn put_if(&self, path: &str, field: &str, expected: &Value, doc: Value) -> Result<bool> {
        self.inner.put_if(path, field, expected, doc).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        self.inner.list(prefix).await
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.watch()
    }
}

/// 제안 생성이 양쪽 인덱스에 복제되는지 테스트
#[tokio::test]
async fn test_create_bid_replicates_to_both_indices() {
    init_tracing();
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;

    let bid_id = create_scenario_bid(&ledger).await;

    // 입찰자 화면: 보낸 제안
    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, bid_id);
    assert_eq!(sent[0].status, BidStatus::Pending);
    assert_eq!(sent[0].offered_product_ids, vec!["p10", "p11"]);
    assert_eq!(sent[0].history.len(), 1);
    assert_eq!(sent[0].history[0].action, "created");

    // 소유자 화면: 받은 제안
    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, bid_id);
    assert_eq!(received[0].target_product_id, "p99");
}

/// 제안 생성 검증 규칙 테스트
#[tokio::test]
async fn test_create_bid_validation() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    create_test_product(store.as_ref(), "u3", "p30", "타인 소유 상품", true).await;
    create_test_product(store.as_ref(), "u1", "p12", "비공개 상품", false).await;

    // 제시 상품 없음
    let err = ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "p99".to_string(),
                offered_product_ids: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));

    // 자기 상품에 제안
    let err = ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "p10".to_string(),
                offered_product_ids: vec!["p11".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));

    // 본인 소유가 아닌 상품 제시
    let err = ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "p99".to_string(),
                offered_product_ids: vec!["p30".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));

    // 공개되지 않은 상품 제시
    let err = ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "p99".to_string(),
                offered_product_ids: vec!["p12".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));

    // 존재하지 않는 대상 상품
    let err = ledger
        .create_bid(
            "u1",
            CreateBidCommand {
                target_product_id: "missing".to_string(),
                offered_product_ids: vec!["p10".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::NotFound(_)));

    // 실패한 생성은 어떤 인덱스에도 남지 않는다
    assert!(ledger
        .list_bids_for("u1", BidRole::Bidder)
        .await
        .unwrap()
        .is_empty());
    assert!(ledger
        .list_bids_for("u2", BidRole::Owner)
        .await
        .unwrap()
        .is_empty());
}

/// 수락 전이가 양쪽 인덱스에 반영되는지 테스트
#[tokio::test]
async fn test_accept_bid_mirrors_to_bidder_index() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    ledger.accept_bid(&bid_id, "u2").await.unwrap();

    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent[0].status, BidStatus::Accepted);
    assert_eq!(sent[0].history.len(), 2);
    assert_eq!(sent[0].history[1].action, "accepted");

    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received[0].status, BidStatus::Accepted);
}

/// 전이와 취소의 권한 검사 테스트
#[tokio::test]
async fn test_transition_authorization() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    // 대상 상품 소유자가 아닌 사용자의 수락
    let err = ledger.accept_bid(&bid_id, "u3").await.unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized(_)));

    // 입찰자 본인이 아닌 사용자의 취소
    let err = ledger.cancel_bid(&bid_id, "u2").await.unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized(_)));

    // 존재하지 않는 제안
    let err = ledger.accept_bid("missing", "u2").await.unwrap_err();
    assert!(matches!(err, ExchangeError::NotFound(_)));

    // 아무 것도 변하지 않았다
    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received[0].status, BidStatus::Pending);
}

/// 종결된 제안은 어떤 전이도 거부하는지 테스트
#[tokio::test]
async fn test_terminal_bid_rejects_further_transitions() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    ledger.accept_bid(&bid_id, "u2").await.unwrap();

    let err = ledger.accept_bid(&bid_id, "u2").await.unwrap_err();
    assert!(matches!(err, ExchangeError::StateConflict(_)));
    let err = ledger.reject_bid(&bid_id, "u2").await.unwrap_err();
    assert!(matches!(err, ExchangeError::StateConflict(_)));
    let err = ledger.cancel_bid(&bid_id, "u1").await.unwrap_err();
    assert!(matches!(err, ExchangeError::StateConflict(_)));

    // 상태와 이력이 그대로다
    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received[0].status, BidStatus::Accepted);
    assert_eq!(received[0].history.len(), 2);
}

/// 동시 전이 경합에서 한쪽만 이기는지 테스트
#[tokio::test]
async fn test_concurrent_resolution_single_winner() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    let (accept, reject) = tokio::join!(
        ledger.accept_bid(&bid_id, "u2"),
        ledger.reject_bid(&bid_id, "u2"),
    );

    // 정확히 한쪽만 성공하고, 진 쪽은 StateConflict를 받는다
    assert_eq!(accept.is_ok() as u8 + reject.is_ok() as u8, 1);
    let winner_status = if accept.is_ok() {
        let err = reject.unwrap_err();
        assert!(matches!(err, ExchangeError::StateConflict(_)));
        BidStatus::Accepted
    } else {
        let err = accept.unwrap_err();
        assert!(matches!(err, ExchangeError::StateConflict(_)));
        BidStatus::Rejected
    };

    // 양쪽 인덱스가 이긴 쪽의 종결 상태로 일치한다
    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(sent[0].status, winner_status);
    assert_eq!(received[0].status, winner_status);
    assert_eq!(received[0].history.len(), 2);
}

/// 취소가 양쪽 사본을 제거하는지 테스트
#[tokio::test]
async fn test_cancel_bid_removes_both_copies() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    ledger.cancel_bid(&bid_id, "u1").await.unwrap();

    assert!(ledger
        .list_bids_for("u1", BidRole::Bidder)
        .await
        .unwrap()
        .is_empty());
    assert!(ledger
        .list_bids_for("u2", BidRole::Owner)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .get(&paths::bid_by_owner("u2", &bid_id))
        .await
        .unwrap()
        .is_none());
}

/// 같은 종결 전이에 대해 알림이 정확히 한 번만 나가는지 테스트
#[tokio::test]
async fn test_dispatcher_sends_exactly_once() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;
    ledger.accept_bid(&bid_id, "u2").await.unwrap();

    let sender = Arc::new(RecordingPushSender::new());
    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&sender) as Arc<dyn PushSender>,
    );

    let doc = store
        .get(&paths::bid_by_bidder("u1", &bid_id))
        .await
        .unwrap()
        .unwrap();
    let bid = Bid::decode(&doc).unwrap();

    // 같은 스냅샷이 두 번 도착해도 발송은 한 번이다
    dispatcher.observe(&bid).await;
    dispatcher.observe(&bid).await;

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "u1");
    assert_eq!(sent[0].1.data.bid_id, bid_id);
    assert_eq!(sent[0].1.data.target_product_id, "p99");

    // notified 플래그가 양쪽 사본에 영속화된다
    let owner_doc = store
        .get(&paths::bid_by_owner("u2", &bid_id))
        .await
        .unwrap()
        .unwrap();
    let bidder_doc = store
        .get(&paths::bid_by_bidder("u1", &bid_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner_doc["notified"], json!(true));
    assert_eq!(bidder_doc["notified"], json!(true));

    // 수신함에 알림 문서가 기록된다
    let inbox = notify::list_notifications(store.as_ref(), "u1")
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].data.bid_id, bid_id);
    assert!(!inbox[0].read);

    // 이미 notified인 스냅샷은 새 프로세스에서도 발화하지 않는다
    let restarted = NotificationDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&sender) as Arc<dyn PushSender>,
    );
    let flagged = Bid::decode(&bidder_doc).unwrap();
    restarted.observe(&flagged).await;
    assert_eq!(sender.sent().len(), 1);
}

/// 수락부터 알림·수신함·읽음 처리까지 전체 흐름 테스트
#[tokio::test]
async fn test_dispatcher_end_to_end_flow() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    let sender = Arc::new(RecordingPushSender::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&sender) as Arc<dyn PushSender>,
    ));
    let runner = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        runner.start().await;
    });
    sleep(Duration::from_millis(200)).await;

    // 수락 전이 전파 대기
    ledger.accept_bid(&bid_id, "u2").await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "u1");
    assert_eq!(sent[0].1.data.bid_id, bid_id);

    // 오래된 스냅샷 재전달(notified 플래그 이전 상태)에도 중복 발송하지 않는다
    let bidder_path = paths::bid_by_bidder("u1", &bid_id);
    let mut stale = store.get(&bidder_path).await.unwrap().unwrap();
    stale["notified"] = json!(false);
    store.put(&bidder_path, stale).await.unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(sender.sent().len(), 1);

    // 수신함 조회와 읽음 처리
    let inbox = notify::list_notifications(store.as_ref(), "u1")
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    notify::mark_notification_read(store.as_ref(), "u1", &inbox[0].id)
        .await
        .unwrap();
    let inbox = notify::list_notifications(store.as_ref(), "u1")
        .await
        .unwrap();
    assert!(inbox[0].read);
}

/// 부분 생성(소유자 인덱스 쓰기 실패)을 스냅샷이 복구하는지 테스트
#[tokio::test]
async fn test_snapshot_repairs_partial_create() {
    let store: Arc<dyn DocumentStore> = Arc::new(FlakyDocumentStore::new(paths::BIDS_BY_OWNER, 1));
    let catalog: Arc<dyn ProductCatalog> = Arc::new(StoreProductCatalog::new(Arc::clone(&store)));
    let ledger = BidLedger::new(Arc::clone(&store), catalog);
    seed_exchange_products(store.as_ref()).await;

    // 소유자 인덱스 쓰기가 실패해도 생성 자체는 성공한다
    let bid_id = create_scenario_bid(&ledger).await;
    assert!(ledger
        .list_bids_for("u2", BidRole::Owner)
        .await
        .unwrap()
        .is_empty());

    // 입찰자 측 구독의 전체 스냅샷이 누락 사본을 재발행한다
    let bridge = RealtimeSyncBridge::new(Arc::clone(&store));
    let _handle = bridge.subscribe(paths::BIDS_BY_BIDDER);
    sleep(Duration::from_millis(300)).await;

    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, bid_id);

    // 입찰자 사본이 중복 생성되지 않았다
    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent.len(), 1);
}

/// 미러가 낡아 있는 동안의 취소가 종결 상태를 파괴하지 못하는지 테스트
#[tokio::test]
async fn test_cancel_respects_terminal_status_on_stale_mirror() {
    let flaky = Arc::new(FlakyDocumentStore::new(paths::BIDS_BY_BIDDER, 0));
    let store: Arc<dyn DocumentStore> = flaky.clone();
    let catalog: Arc<dyn ProductCatalog> = Arc::new(StoreProductCatalog::new(Arc::clone(&store)));
    let ledger = BidLedger::new(Arc::clone(&store), catalog);
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    // 수락 전이의 입찰자 미러 쓰기만 실패시킨다
    flaky.fail_next(1);
    ledger.accept_bid(&bid_id, "u2").await.unwrap();

    // 입찰자 사본은 낡은 pending으로 남아 있다
    let stale = Bid::decode(
        &store
            .get(&paths::bid_by_bidder("u1", &bid_id))
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(stale.status, BidStatus::Pending);

    // 취소는 소유자 사본의 종결 상태를 읽고 거부된다
    let err = ledger.cancel_bid(&bid_id, "u1").await.unwrap_err();
    assert!(matches!(err, ExchangeError::StateConflict(_)));

    // 어떤 사본도 지워지지 않았고, 낡은 미러는 종결 상태로 복구된다
    let received = ledger.list_bids_for("u2", BidRole::Owner).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, BidStatus::Accepted);
    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, BidStatus::Accepted);
}

/// 상태가 갈라진 두 사본을 스냅샷이 종결 상태로 수렴시키는지 테스트
#[tokio::test]
async fn test_snapshot_converges_diverged_status() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    // 소유자 사본만 accepted로 전이된 갈라진 상태를 만든다
    let owner_path = paths::bid_by_owner("u2", &bid_id);
    let owner = Bid::decode(&store.get(&owner_path).await.unwrap().unwrap()).unwrap();
    store
        .put(&owner_path, owner.transitioned(BidStatus::Accepted).encode())
        .await
        .unwrap();
    let bidder_doc = store
        .get(&paths::bid_by_bidder("u1", &bid_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bidder_doc["status"], json!("pending"));

    // 입찰자 측 전체 스냅샷이 종결 상태를 입찰자 사본에 재미러링한다
    let bridge = RealtimeSyncBridge::new(Arc::clone(&store));
    let handle = bridge.subscribe(paths::BIDS_BY_BIDDER);
    let mut rx = handle.receiver();
    rx.changed().await.unwrap();
    sleep(Duration::from_millis(300)).await;

    let bidder_doc = store
        .get(&paths::bid_by_bidder("u1", &bid_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bidder_doc["status"], json!("accepted"));

    // 스냅샷 자체도 종결 상태를 담는다
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.find(&bid_id).unwrap().status, BidStatus::Accepted);
}

/// 부분 취소로 고아가 된 소유자 사본을 스냅샷이 정리하는지 테스트
#[tokio::test]
async fn test_snapshot_clears_orphaned_owner_copy() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    // 입찰자 사본만 지워진 부분 취소 상태를 만든다
    store
        .delete(&paths::bid_by_bidder("u1", &bid_id))
        .await
        .unwrap();
    assert_eq!(
        ledger
            .list_bids_for("u2", BidRole::Owner)
            .await
            .unwrap()
            .len(),
        1
    );

    let bridge = RealtimeSyncBridge::new(Arc::clone(&store));
    let _handle = bridge.subscribe(paths::BIDS_BY_OWNER);
    sleep(Duration::from_millis(300)).await;

    assert!(ledger
        .list_bids_for("u2", BidRole::Owner)
        .await
        .unwrap()
        .is_empty());
}

/// 짧은 윈도 안의 연속 변경이 최신 스냅샷 하나로 병합되는지 테스트
#[tokio::test]
async fn test_stream_coalesces_rapid_changes() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    let bridge = RealtimeSyncBridge::new(Arc::clone(&store));
    let handle = bridge.subscribe(paths::BIDS_BY_BIDDER);
    let mut rx = handle.receiver();

    // 초기 전체 스냅샷 대기
    rx.changed().await.unwrap();
    let first_revision = rx.borrow_and_update().revision;

    // 같은 제안을 빠르게 연속 갱신한다
    let bidder_path = paths::bid_by_bidder("u1", &bid_id);
    let base = store.get(&bidder_path).await.unwrap().unwrap();
    for i in 0..10 {
        let mut doc = base.clone();
        doc["offeredProductIds"] = json!(["p10", format!("v{}", i)]);
        store.put(&bidder_path, doc).await.unwrap();
    }
    sleep(Duration::from_millis(300)).await;

    // 변경 10건이 소수의 병합 스냅샷으로 접힌다
    let snapshot = rx.borrow().clone();
    assert!(snapshot.revision > first_revision);
    assert!(
        snapshot.revision - first_revision <= 3,
        "병합되지 않은 스냅샷 과다: {}",
        snapshot.revision - first_revision
    );

    // 최종 스냅샷은 마지막 쓰기 상태다
    let bid = snapshot.find(&bid_id).unwrap();
    assert_eq!(bid.offered_product_ids, vec!["p10", "v9"]);
}

/// 해석 불가 문서가 스트림과 목록에서 드롭되는지 테스트
#[tokio::test]
async fn test_malformed_documents_are_dropped() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    // id 누락, 외래 키 누락, 비객체 문서를 섞어 넣는다
    store
        .put(
            &paths::bid_by_bidder("u1", "broken-1"),
            json!({ "bidderId": "u1", "status": "pending" }),
        )
        .await
        .unwrap();
    store
        .put(
            &paths::bid_by_bidder("u1", "broken-2"),
            json!({ "id": "broken-2", "status": "pending" }),
        )
        .await
        .unwrap();
    store
        .put(&paths::bid_by_bidder("u1", "broken-3"), json!("문자열"))
        .await
        .unwrap();

    // 목록 조회는 유효한 제안만 반환한다
    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, bid_id);

    // 스냅샷도 유효한 제안만 담는다
    let bridge = RealtimeSyncBridge::new(Arc::clone(&store));
    let handle = bridge.subscribe(paths::BIDS_BY_BIDDER);
    let mut rx = handle.receiver();
    rx.changed().await.unwrap();
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.bids.len(), 1);
    assert!(snapshot.find(&bid_id).is_some());
}

/// 알 수 없는 상태 문자열이 pending으로 해석되는지 테스트
#[tokio::test]
async fn test_unknown_status_decodes_as_pending() {
    let (store, ledger) = setup();
    seed_exchange_products(store.as_ref()).await;
    let bid_id = create_scenario_bid(&ledger).await;

    let bidder_path = paths::bid_by_bidder("u1", &bid_id);
    let mut doc = store.get(&bidder_path).await.unwrap().unwrap();
    doc["status"] = json!("archived");
    store.put(&bidder_path, doc).await.unwrap();

    let sent = ledger.list_bids_for("u1", BidRole::Bidder).await.unwrap();
    assert_eq!(sent[0].status, BidStatus::Pending);
}

/// HTTP 라우터 설정 및 서버 기동
async fn spawn_server() -> (String, Arc<dyn DocumentStore>) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let catalog: Arc<dyn ProductCatalog> = Arc::new(StoreProductCatalog::new(Arc::clone(&store)));
    let ledger = Arc::new(BidLedger::new(Arc::clone(&store), Arc::clone(&catalog)));
    let sessions = Arc::new(SessionManager::new());

    let state: AppState = (ledger, catalog, Arc::clone(&store), sessions);
    let router = handlers::routes(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("리스너 바인드 실패");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("서버 실행 실패");
    });
    (format!("http://{}", addr), store)
}

/// 세션 발급 헬퍼
async fn issue_session(client: &Client, base_url: &str, user_id: &str) -> String {
    let response = client
        .post(format!("{}/sessions", base_url))
        .json(&json!({ "userId": user_id }))
        .send()
        .await
        .expect("세션 발급 요청 실패");
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

/// HTTP 경계에서의 제안 수명 주기 테스트
#[tokio::test]
async fn test_http_bid_lifecycle() {
    let (base_url, store) = spawn_server().await;
    seed_exchange_products(store.as_ref()).await;
    let client = Client::new();

    let bidder_token = issue_session(&client, &base_url, "u1").await;
    let owner_token = issue_session(&client, &base_url, "u2").await;

    // 세션 없이 생성하면 401
    let response = client
        .post(format!("{}/bids", base_url))
        .json(&json!({ "targetProductId": "p99", "offeredProductIds": ["p10"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // 검증 실패는 400과 에러 코드
    let response = client
        .post(format!("{}/bids", base_url))
        .bearer_auth(&bidder_token)
        .json(&json!({ "targetProductId": "p99", "offeredProductIds": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION");

    // 정상 생성
    let response = client
        .post(format!("{}/bids", base_url))
        .bearer_auth(&bidder_token)
        .json(&json!({ "targetProductId": "p99", "offeredProductIds": ["p10", "p11"] }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    let bid_id = body["bidId"].as_str().unwrap().to_string();

    // 소유자의 받은 제안 목록
    let response = client
        .get(format!("{}/bids?role=owner", base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    let received: Value = response.json().await.unwrap();
    assert_eq!(received.as_array().unwrap().len(), 1);
    assert_eq!(received[0]["id"], bid_id.as_str());
    assert_eq!(received[0]["status"], "pending");

    // 입찰자가 수락을 시도하면 403
    let response = client
        .post(format!("{}/bids/{}/accept", base_url, bid_id))
        .bearer_auth(&bidder_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // 소유자의 수락
    let response = client
        .post(format!("{}/bids/{}/accept", base_url, bid_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // 중복 수락은 409
    let response = client
        .post(format!("{}/bids/{}/accept", base_url, bid_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // 입찰자의 보낸 제안 목록에 수락 상태가 반영된다
    let response = client
        .get(format!("{}/bids?role=bidder", base_url))
        .bearer_auth(&bidder_token)
        .send()
        .await
        .unwrap();
    let sent: Value = response.json().await.unwrap();
    assert_eq!(sent[0]["status"], "accepted");
}

/// 상품·알림 HTTP 조회 테스트
#[tokio::test]
async fn test_http_products_and_notifications() {
    let (base_url, store) = spawn_server().await;
    seed_exchange_products(store.as_ref()).await;
    create_test_product(store.as_ref(), "u2", "p98", "비공개 상품", false).await;
    let client = Client::new();
    let token = issue_session(&client, &base_url, "u1").await;

    // 공개 상품 탐색: 비공개 상품은 제외된다
    let response = client
        .get(format!("{}/products", base_url))
        .send()
        .await
        .unwrap();
    let products: Value = response.json().await.unwrap();
    assert_eq!(products.as_array().unwrap().len(), 3);

    // 사용자별 상품 조회
    let response = client
        .get(format!("{}/products/u1", base_url))
        .send()
        .await
        .unwrap();
    let products: Value = response.json().await.unwrap();
    assert_eq!(products.as_array().unwrap().len(), 2);

    // 비공개 상품은 타인과 비로그인 조회에서 숨겨진다
    let response = client
        .get(format!("{}/products/u2", base_url))
        .send()
        .await
        .unwrap();
    let products: Value = response.json().await.unwrap();
    assert_eq!(products.as_array().unwrap().len(), 1);
    assert_eq!(products[0]["status"], "published");

    let response = client
        .get(format!("{}/products/u2", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let products: Value = response.json().await.unwrap();
    assert_eq!(products.as_array().unwrap().len(), 1);

    // 소유자 본인 세션에는 비공개 상품까지 보인다
    let owner_token = issue_session(&client, &base_url, "u2").await;
    let response = client
        .get(format!("{}/products/u2", base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    let products: Value = response.json().await.unwrap();
    assert_eq!(products.as_array().unwrap().len(), 2);

    // 수신함 문서를 심고 조회·읽음 처리
    let notification = json!({
        "id": "n1",
        "recipientId": "u1",
        "title": "교환 제안이 수락되었습니다",
        "body": "상대방이 회원님의 교환 제안을 수락했습니다.",
        "data": { "bidId": "b1", "targetProductId": "p99" },
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "read": false,
    });
    store
        .put(&paths::notification("u1", "n1"), notification)
        .await
        .unwrap();

    let response = client
        .get(format!("{}/notifications", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let inbox: Value = response.json().await.unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["read"], json!(false));

    let response = client
        .post(format!("{}/notifications/n1/read", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/notifications", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let inbox: Value = response.json().await.unwrap();
    assert_eq!(inbox[0]["read"], json!(true));
}

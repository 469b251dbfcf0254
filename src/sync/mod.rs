/// 실시간 동기화 브리지
/// 저장소의 원시 변경 피드를 타입이 있는 제안 스냅샷 스트림으로 바꾼다.
/// - (재)구독 시 항상 전체 스냅샷부터 시작한다 (버퍼된 델타는 신뢰하지 않는다)
/// - 짧은 윈도 안의 연속 변경은 병합해 최신 상태만 전달한다
/// - 소비자가 뒤처지면 최신 스냅샷만 남긴다 (watch 채널)
/// - 전체 스냅샷마다 두 인덱스의 불일치를 기회적으로 복구한다
// region:    --- Imports
use crate::bids::model::Bid;
use crate::store::{paths, DocumentStore, StoreChange};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Constants

/// 변경 병합 윈도: 이 안에 도착한 변경은 하나의 스냅샷으로 합쳐진다
pub const COALESCE_WINDOW_MS: u64 = 50;

/// 일시적 저장소 장애 재시도 백오프 (초기/최대)
const RETRY_BASE_MS: u64 = 200;
const RETRY_MAX_MS: u64 = 10_000;

// endregion: --- Constants

// region:    --- Snapshot

/// 병합된 제안 스냅샷. 경로를 키로 하며, 항상 가장 최근 상태만 담는다.
#[derive(Debug, Clone, Default)]
pub struct BidSnapshot {
    /// 스냅샷 세대. 전체 재구독과 병합 반영마다 증가한다.
    pub revision: u64,
    pub bids: HashMap<String, Bid>,
}

impl BidSnapshot {
    /// id로 제안 찾기
    pub fn find(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.values().find(|bid| bid.id == bid_id)
    }
}

// endregion: --- Snapshot

// region:    --- Subscription Handle

/// 구독 핸들. 세션이 끝나면 명시적으로 내리거나 드롭한다 — 스트림 누수 방지.
pub struct BidStreamHandle {
    rx: watch::Receiver<BidSnapshot>,
    task: JoinHandle<()>,
}

impl BidStreamHandle {
    /// 최신 스냅샷 수신기. watch 채널이므로 중간 상태는 건너뛴다.
    pub fn receiver(&self) -> watch::Receiver<BidSnapshot> {
        self.rx.clone()
    }

    /// 구독 해제
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for BidStreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// endregion: --- Subscription Handle

// region:    --- RealtimeSyncBridge

pub struct RealtimeSyncBridge {
    store: Arc<dyn DocumentStore>,
}

impl RealtimeSyncBridge {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        RealtimeSyncBridge { store }
    }

    /// 접두사 구독 시작. 반환된 핸들이 펌프 태스크의 수명을 소유한다.
    pub fn subscribe(&self, prefix: &str) -> BidStreamHandle {
        let (tx, rx) = watch::channel(BidSnapshot::default());
        let store = Arc::clone(&self.store);
        let prefix = prefix.trim_end_matches('/').to_string();
        let task = tokio::spawn(async move {
            pump(store, prefix, tx).await;
        });
        BidStreamHandle { rx, task }
    }
}

/// 구독 펌프 본체.
/// 바깥 루프 1회가 한 번의 (재)구독이다: 피드 구독 → 전체 스냅샷 → 스트리밍.
/// 피드를 스냅샷보다 먼저 구독해 공백을 없앤다.
async fn pump(store: Arc<dyn DocumentStore>, prefix: String, tx: watch::Sender<BidSnapshot>) {
    let mut backoff_ms = RETRY_BASE_MS;
    let mut revision: u64 = 0;

    loop {
        if tx.is_closed() {
            return;
        }

        let mut feed = store.watch();

        // 전체 스냅샷 (델타가 아니라). 실패는 일시 장애로 보고 백오프 재시도.
        let mut state = match load_snapshot(store.as_ref(), &prefix).await {
            Ok(state) => {
                backoff_ms = RETRY_BASE_MS;
                state
            }
            Err(e) => {
                warn!(
                    "{:<12} --> 스냅샷 읽기 실패, {}ms 후 재시도: {:?}",
                    "SyncBridge", backoff_ms, e
                );
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(RETRY_MAX_MS);
                continue;
            }
        };

        // 전체 스냅샷을 본 김에 짝 인덱스와의 불일치를 복구한다
        reconcile(store.as_ref(), &prefix, &mut state).await;

        revision += 1;
        tx.send_replace(BidSnapshot {
            revision,
            bids: state.clone(),
        });

        // 스트리밍: 윈도 단위로 변경을 병합해 반영
        loop {
            let first = match feed.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "{:<12} --> 피드 지연({}건 유실), 전체 스냅샷으로 재구독",
                        "SyncBridge", skipped
                    );
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("{:<12} --> 변경 피드 종료: {}", "SyncBridge", prefix);
                    return;
                }
            };

            let mut pending: HashMap<String, Option<Value>> = HashMap::new();
            if in_prefix(&prefix, &first.path) {
                pending.insert(first.path, first.doc);
            }

            // 병합 윈도: 마감까지 도착한 변경은 경로별 최신값만 남긴다
            let deadline = Instant::now() + Duration::from_millis(COALESCE_WINDOW_MS);
            let mut lagged = false;
            loop {
                tokio::select! {
                    change = feed.recv() => match change {
                        Ok(change) => {
                            if in_prefix(&prefix, &change.path) {
                                pending.insert(change.path, change.doc);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            lagged = true;
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = sleep_until(deadline) => break,
                }
            }

            if !pending.is_empty() {
                apply_changes(&mut state, pending);
                revision += 1;
                tx.send_replace(BidSnapshot {
                    revision,
                    bids: state.clone(),
                });
            }

            if tx.is_closed() {
                return;
            }
            if lagged {
                warn!(
                    "{:<12} --> 병합 중 피드 지연, 전체 스냅샷으로 재구독",
                    "SyncBridge"
                );
                break;
            }
        }
    }
}

/// 경로가 구독 접두사 아래인지 판정
fn in_prefix(prefix: &str, path: &str) -> bool {
    path.len() > prefix.len() + 1
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

/// 접두사 아래 전체 문서를 읽어 방어적으로 해석한 상태 맵 구성
async fn load_snapshot(
    store: &dyn DocumentStore,
    prefix: &str,
) -> crate::error::Result<HashMap<String, Bid>> {
    let docs = store.list(prefix).await?;
    let mut state = HashMap::with_capacity(docs.len());
    for (path, doc) in docs {
        match Bid::decode(&doc) {
            Some(bid) => {
                state.insert(path, bid);
            }
            None => warn!(
                "{:<12} --> 해석 불가 제안 문서 드롭: {}",
                "SyncBridge", path
            ),
        }
    }
    Ok(state)
}

/// 병합된 변경을 상태 맵에 반영
fn apply_changes(state: &mut HashMap<String, Bid>, pending: HashMap<String, Option<Value>>) {
    for (path, doc) in pending {
        match doc {
            Some(doc) => match Bid::decode(&doc) {
                Some(bid) => {
                    state.insert(path, bid);
                }
                None => warn!(
                    "{:<12} --> 해석 불가 제안 문서 드롭: {}",
                    "SyncBridge", path
                ),
            },
            None => {
                state.remove(&path);
            }
        }
    }
}

// endregion: --- RealtimeSyncBridge

// region:    --- Reconcile

/// 읽기 시점 자가 복구.
/// 기준: 입찰자 인덱스가 존재의 기준(먼저 생성되고 먼저 삭제된다),
/// 소유자 인덱스가 상태의 기준(전이가 먼저 반영된다).
/// - 입찰자 측 스냅샷: 소유자 사본이 없으면 재발행 (부분 생성 복구)
/// - 소유자 측 스냅샷: 입찰자 사본이 없으면 소유자 사본 삭제 (부분 취소 복구)
/// - 양쪽 상태가 다르면 종결 상태가 이긴다 (단조성)
/// 복구 실패는 로그만 남긴다 — 다음 스냅샷이 다시 시도한다.
async fn reconcile(store: &dyn DocumentStore, prefix: &str, state: &mut HashMap<String, Bid>) {
    let bidder_side = in_root(prefix, paths::BIDS_BY_BIDDER);
    let owner_side = in_root(prefix, paths::BIDS_BY_OWNER);
    if !bidder_side && !owner_side {
        return;
    }

    let mut removed: Vec<String> = Vec::new();
    let mut updated: Vec<(String, Bid)> = Vec::new();

    for (path, bid) in state.iter() {
        let paired_path = if bidder_side {
            paths::bid_by_owner(&bid.target_product_owner_id, &bid.id)
        } else {
            paths::bid_by_bidder(&bid.bidder_id, &bid.id)
        };

        let paired_doc = match store.get(&paired_path).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "{:<12} --> 짝 인덱스 조회 실패 (다음 스냅샷에서 재시도): {:?}",
                    "SyncBridge", e
                );
                continue;
            }
        };

        match paired_doc.as_ref().and_then(Bid::decode) {
            None if bidder_side => {
                // 부분 생성: 소유자 사본 재발행
                warn!(
                    "{:<12} --> 소유자 인덱스 누락 복구: bid={}",
                    "SyncBridge", bid.id
                );
                if let Err(e) = store.put(&paired_path, bid.encode()).await {
                    warn!("{:<12} --> 인덱스 복구 실패: {:?}", "SyncBridge", e);
                }
            }
            None => {
                // 부분 취소: 고아가 된 소유자 사본 정리
                warn!(
                    "{:<12} --> 고아 소유자 사본 정리: bid={}",
                    "SyncBridge", bid.id
                );
                if let Err(e) = store.delete(path).await {
                    warn!("{:<12} --> 인덱스 정리 실패: {:?}", "SyncBridge", e);
                } else {
                    removed.push(path.clone());
                }
            }
            Some(paired) if paired.status != bid.status => {
                // 상태 불일치: 종결 상태가 이긴다
                let (winner, loser_path) = if paired.status.is_terminal() {
                    (paired, path.clone())
                } else {
                    (bid.clone(), paired_path.clone())
                };
                warn!(
                    "{:<12} --> 상태 불일치 복구: bid={}, status={}",
                    "SyncBridge",
                    winner.id,
                    winner.status.as_str()
                );
                if let Err(e) = store.put(&loser_path, winner.encode()).await {
                    warn!("{:<12} --> 상태 복구 실패: {:?}", "SyncBridge", e);
                } else if loser_path == *path {
                    updated.push((path.clone(), winner));
                }
            }
            Some(_) => {}
        }
    }

    for path in removed {
        state.remove(&path);
    }
    for (path, bid) in updated {
        state.insert(path, bid);
    }
}

/// 접두사가 해당 인덱스 루트이거나 그 아래인지 판정
fn in_root(prefix: &str, root: &str) -> bool {
    prefix == root || prefix.starts_with(&format!("{}/", root))
}

// endregion: --- Reconcile

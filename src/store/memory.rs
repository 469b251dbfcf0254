/// 인메모리 문서 저장소
/// 로컬 개발과 테스트에서 사용한다. 변경 피드는 broadcast 채널로 전달한다.
// region:    --- Imports
use crate::error::Result;
use crate::store::{DocumentStore, StoreChange, CHANGE_FEED_CAPACITY};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

// endregion: --- Imports

// region:    --- MemoryDocumentStore

pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Value>>,
    feed: broadcast::Sender<StoreChange>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryDocumentStore {
            docs: RwLock::new(BTreeMap::new()),
            feed,
        }
    }

    /// 변경 알림 전송. 구독자가 없으면 조용히 버린다.
    fn notify(&self, path: &str, doc: Option<Value>) {
        let _ = self.feed.send(StoreChange {
            path: path.to_string(),
            doc,
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let docs = self.docs.read().expect("store lock poisoned");
        Ok(docs.get(path).cloned())
    }

    async fn put(&self, path: &str, doc: Value) -> Result<()> {
        {
            let mut docs = self.docs.write().expect("store lock poisoned");
            docs.insert(path.to_string(), doc.clone());
        }
        self.notify(path, Some(doc));
        Ok(())
    }

    async fn put_if(&self, path: &str, field: &str, expected: &Value, doc: Value) -> Result<bool> {
        let updated = {
            let mut docs = self.docs.write().expect("store lock poisoned");
            match docs.get(path) {
                Some(current) if current.get(field) == Some(expected) => {
                    docs.insert(path.to_string(), doc.clone());
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.notify(path, Some(doc));
        }
        Ok(updated)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let removed = {
            let mut docs = self.docs.write().expect("store lock poisoned");
            docs.remove(path).is_some()
        };
        if removed {
            self.notify(path, None);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let needle = format!("{}/", prefix.trim_end_matches('/'));
        let docs = self.docs.read().expect("store lock poisoned");
        Ok(docs
            .range(needle.clone()..)
            .take_while(|(path, _)| path.starts_with(&needle))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}

// endregion: --- MemoryDocumentStore

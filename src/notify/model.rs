/// 알림 모델
// region:    --- Imports
use crate::store::{opt_bool, opt_str, opt_time, req_str};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// endregion: --- Imports

// region:    --- Notification

/// 푸시 페이로드의 data 필드.
/// 수신 UI는 (bidId, status)를 자연 키로 삼아 정확히 같은 알림의
/// 반복 수신을 무시해야 한다 (프로세스 간 중복의 최종 방어선).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub bid_id: String,
    pub target_product_id: String,
}

/// 발신 푸시 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

/// 알림 수신함 문서. 디스패처만 생성하며 read 플래그는 수신자가 바꾼다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(recipient_id: String, message: &PushMessage) -> Notification {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id,
            title: message.title.clone(),
            body: message.body.clone(),
            data: message.data.clone(),
            created_at: Utc::now(),
            read: false,
        }
    }

    /// 저장소 문서로 직렬화
    pub fn encode(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 원격 문서 방어적 해석. id와 recipientId가 없으면 드롭 대상.
    pub fn decode(doc: &Value) -> Option<Notification> {
        let id = req_str(doc, "id")?;
        let recipient_id = req_str(doc, "recipientId")?;
        let data = doc.get("data").cloned().unwrap_or(Value::Null);
        Some(Notification {
            id,
            recipient_id,
            title: opt_str(doc, "title"),
            body: opt_str(doc, "body"),
            data: NotificationData {
                bid_id: opt_str(&data, "bidId"),
                target_product_id: opt_str(&data, "targetProductId"),
            },
            created_at: opt_time(doc, "createdAt"),
            read: opt_bool(doc, "read"),
        })
    }
}

// endregion: --- Notification

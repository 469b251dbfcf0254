/// 세션 협력자
/// 실제 인증 공급자는 외부에 있다고 가정한다. 여기서는 베어러 토큰을
/// 사용자 id로 해석하는 최소 인터페이스와 개발용 인메모리 구현만 둔다.
// region:    --- Imports
use crate::error::{ExchangeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

// endregion: --- Imports

// region:    --- SessionProvider Trait

/// 세션 해석 트레이트. 모든 제안 변경 작업은 해석된 신원을 요구한다.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// 토큰을 사용자 id로 해석. 없으면 None.
    async fn current_user_id(&self, token: &str) -> Option<String>;
}

// endregion: --- SessionProvider Trait

// region:    --- SessionManager

/// 인메모리 세션 관리자 (개발/테스트용)
pub struct SessionManager {
    sessions: RwLock<HashMap<String, String>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 세션 발급: 새 토큰을 만들어 사용자에 매핑한다
    pub fn issue(&self, user_id: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        sessions.insert(token.clone(), user_id.to_string());
        info!("{:<12} --> 세션 발급: user={}", "Session", user_id);
        token
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    async fn current_user_id(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.get(token).cloned()
    }
}

/// 토큰을 신원으로 해석하거나 Auth 에러 반환
pub async fn require_user(provider: &dyn SessionProvider, token: Option<&str>) -> Result<String> {
    match token {
        Some(token) => provider
            .current_user_id(token)
            .await
            .ok_or(ExchangeError::Auth),
        None => Err(ExchangeError::Auth),
    }
}

// endregion: --- SessionManager

// region:    --- Imports
use crate::bids::{BidLedger, BidRole, CreateBidCommand};
use crate::catalog::ProductCatalog;
use crate::error::Result;
use crate::notify;
use crate::session::{require_user, SessionManager, SessionProvider};
use crate::store::DocumentStore;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Router

/// 라우터 공유 상태
pub type AppState = (
    Arc<BidLedger>,
    Arc<dyn ProductCatalog>,
    Arc<dyn DocumentStore>,
    Arc<SessionManager>,
);

/// 라우터 구성
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(handle_issue_session))
        .route("/bids", post(handle_create_bid).get(handle_list_bids))
        .route("/bids/:id/accept", post(handle_accept_bid))
        .route("/bids/:id/reject", post(handle_reject_bid))
        .route("/bids/:id", delete(handle_cancel_bid))
        .route("/products", get(handle_get_products))
        .route("/products/:owner_id", get(handle_get_user_products))
        .route("/notifications", get(handle_list_notifications))
        .route(
            "/notifications/:id/read",
            post(handle_mark_notification_read),
        )
        .with_state(state)
}

/// Authorization 헤더에서 베어러 토큰 추출
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

// endregion: --- Router

// region:    --- Session Handlers

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRequest {
    pub user_id: String,
}

/// 개발용 세션 발급 (실제 인증 공급자는 외부 협력자)
pub async fn handle_issue_session(
    State((_, _, _, sessions)): State<AppState>,
    Json(req): Json<IssueSessionRequest>,
) -> impl IntoResponse {
    let token = sessions.issue(&req.user_id);
    Json(json!({ "token": token }))
}

// endregion: --- Session Handlers

// region:    --- Command Handlers

/// 제안 생성 요청 처리
pub async fn handle_create_bid(
    State((ledger, _, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<CreateBidCommand>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    info!("{:<12} --> 제안 생성 요청: {:?}", "Handler", cmd);

    let bid_id = ledger.create_bid(&user_id, cmd).await?;
    Ok(Json(json!({ "bidId": bid_id })))
}

/// 제안 수락 요청 처리
pub async fn handle_accept_bid(
    State((ledger, _, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    info!("{:<12} --> 제안 수락 요청: bid={}", "Handler", bid_id);

    ledger.accept_bid(&bid_id, &user_id).await?;
    Ok(Json(json!({ "message": "제안이 수락되었습니다." })))
}

/// 제안 거절 요청 처리
pub async fn handle_reject_bid(
    State((ledger, _, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    info!("{:<12} --> 제안 거절 요청: bid={}", "Handler", bid_id);

    ledger.reject_bid(&bid_id, &user_id).await?;
    Ok(Json(json!({ "message": "제안이 거절되었습니다." })))
}

/// 제안 취소 요청 처리
pub async fn handle_cancel_bid(
    State((ledger, _, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    info!("{:<12} --> 제안 취소 요청: bid={}", "Handler", bid_id);

    ledger.cancel_bid(&bid_id, &user_id).await?;
    Ok(Json(json!({ "message": "제안이 취소되었습니다." })))
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

#[derive(Debug, Deserialize)]
pub struct ListBidsParams {
    pub role: BidRole,
}

/// 역할별 제안 목록 조회
pub async fn handle_list_bids(
    State((ledger, _, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListBidsParams>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    let bids = ledger.list_bids_for(&user_id, params.role).await?;
    Ok(Json(bids))
}

/// 공개 상품 전체 조회
pub async fn handle_get_products(
    State((_, catalog, _, _)): State<AppState>,
) -> Result<impl IntoResponse> {
    let products = catalog.list_published().await?;
    Ok(Json(products))
}

/// 사용자 상품 조회. 비공개(draft) 상품은 소유자 본인 세션에만 보인다.
pub async fn handle_get_user_products(
    State((_, catalog, _, sessions)): State<AppState>,
    headers: HeaderMap,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse> {
    let viewer = match bearer_token(&headers) {
        Some(token) => sessions.current_user_id(token).await,
        None => None,
    };

    let mut products = catalog.list_owned_by(&owner_id).await?;
    if viewer.as_deref() != Some(owner_id.as_str()) {
        products.retain(|product| product.is_published());
    }
    Ok(Json(products))
}

/// 알림 수신함 조회
pub async fn handle_list_notifications(
    State((_, _, store, sessions)): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    let notifications = notify::list_notifications(store.as_ref(), &user_id).await?;
    Ok(Json(notifications))
}

/// 알림 읽음 처리
pub async fn handle_mark_notification_read(
    State((_, _, store, sessions)): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user_id = require_user(sessions.as_ref(), bearer_token(&headers)).await?;
    notify::mark_notification_read(store.as_ref(), &user_id, &notification_id).await?;
    Ok(Json(json!({ "message": "읽음 처리되었습니다." })))
}

// endregion: --- Query Handlers

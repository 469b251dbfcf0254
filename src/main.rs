// region:    --- Imports
use crate::bids::BidLedger;
use crate::catalog::{ProductCatalog, StoreProductCatalog};
use crate::handlers::AppState;
use crate::notify::{HttpPushSender, NotificationDispatcher};
use crate::session::SessionManager;
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Modules
mod bids;
mod catalog;
mod database;
mod error;
mod handlers;
mod notify;
mod session;
mod store;
mod sync;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 문서 저장소 생성 및 초기화
    let store: Arc<dyn DocumentStore> = database::connect_and_initialize().await?;

    // 도메인 구성 요소 생성
    let catalog: Arc<dyn ProductCatalog> =
        Arc::new(StoreProductCatalog::new(Arc::clone(&store)));
    let ledger = Arc::new(BidLedger::new(Arc::clone(&store), Arc::clone(&catalog)));
    let sessions = Arc::new(SessionManager::new());

    // 알림 디스패처 시작
    let gateway_url = std::env::var("PUSH_GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:9090/push".to_string());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&store),
        Arc::new(HttpPushSender::new(gateway_url)),
    ));
    tokio::spawn(async move {
        dispatcher.start().await;
    });

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let state: AppState = (ledger, catalog, store, sessions);
    let routes_all = handlers::routes(state).layer(cors);

    // 리스너 생성
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main

/// 저장소 경로 빌더
/// 모든 저장소 경로는 이 모듈을 통해서만 생성한다.

/// 입찰자 인덱스 루트
pub const BIDS_BY_BIDDER: &str = "bids/byBidder";

/// 소유자 인덱스 루트
pub const BIDS_BY_OWNER: &str = "bids/byOwner";

/// 상품 루트
pub const PRODUCTS: &str = "products";

/// 알림 수신함 루트
pub const NOTIFICATIONS: &str = "notifications";

/// 입찰자 인덱스의 제안 문서 경로
pub fn bid_by_bidder(bidder_id: &str, bid_id: &str) -> String {
    format!("{}/{}/{}", BIDS_BY_BIDDER, bidder_id, bid_id)
}

/// 입찰자 인덱스의 사용자 접두사
pub fn bids_of_bidder(bidder_id: &str) -> String {
    format!("{}/{}", BIDS_BY_BIDDER, bidder_id)
}

/// 소유자 인덱스의 제안 문서 경로
pub fn bid_by_owner(owner_id: &str, bid_id: &str) -> String {
    format!("{}/{}/{}", BIDS_BY_OWNER, owner_id, bid_id)
}

/// 소유자 인덱스의 사용자 접두사
pub fn bids_of_owner(owner_id: &str) -> String {
    format!("{}/{}", BIDS_BY_OWNER, owner_id)
}

/// 상품 문서 경로
pub fn product(owner_id: &str, product_id: &str) -> String {
    format!("{}/{}/{}", PRODUCTS, owner_id, product_id)
}

/// 사용자의 상품 접두사
pub fn products_of(owner_id: &str) -> String {
    format!("{}/{}", PRODUCTS, owner_id)
}

/// 알림 문서 경로
pub fn notification(recipient_id: &str, notification_id: &str) -> String {
    format!("{}/{}/{}", NOTIFICATIONS, recipient_id, notification_id)
}

/// 사용자의 알림 접두사
pub fn notifications_of(recipient_id: &str) -> String {
    format!("{}/{}", NOTIFICATIONS, recipient_id)
}

/// 경로의 마지막 구획 (문서 id)
pub fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

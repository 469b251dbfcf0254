/// 상품 카탈로그 (외부 협력자)
/// 핵심 로직은 상품의 존재/소유/공개 여부만 읽는다. 상품을 변경하지 않는다.
// region:    --- Imports
use crate::error::Result;
use crate::store::{paths, DocumentStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

// endregion: --- Imports

// region:    --- Modules
pub mod model;

pub use model::{Product, ProductStatus};

// endregion: --- Modules

// region:    --- ProductCatalog Trait

/// 상품 읽기 전용 트레이트
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// 상품 id로 조회. 경로에 소유자 구획이 있으므로 전체 상품 루트를 훑는다.
    async fn get(&self, product_id: &str) -> Result<Option<Product>>;

    /// 사용자의 상품 전체 조회
    async fn list_owned_by(&self, user_id: &str) -> Result<Vec<Product>>;

    /// 공개 상태 상품 전체 조회 (탐색 화면용)
    async fn list_published(&self) -> Result<Vec<Product>>;
}

// endregion: --- ProductCatalog Trait

// region:    --- StoreProductCatalog

/// 문서 저장소 기반 카탈로그 구현체
pub struct StoreProductCatalog {
    store: Arc<dyn DocumentStore>,
}

impl StoreProductCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        StoreProductCatalog { store }
    }
}

#[async_trait]
impl ProductCatalog for StoreProductCatalog {
    async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        let docs = self.store.list(paths::PRODUCTS).await?;
        for (path, doc) in docs {
            if paths::leaf(&path) != product_id {
                continue;
            }
            match Product::decode(&doc) {
                Some(product) => return Ok(Some(product)),
                None => {
                    warn!("{:<12} --> 해석 불가 상품 문서 드롭: {}", "Catalog", path);
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    async fn list_owned_by(&self, user_id: &str) -> Result<Vec<Product>> {
        let docs = self.store.list(&paths::products_of(user_id)).await?;
        let mut products = Vec::with_capacity(docs.len());
        for (path, doc) in docs {
            match Product::decode(&doc) {
                Some(product) => products.push(product),
                None => warn!("{:<12} --> 해석 불가 상품 문서 드롭: {}", "Catalog", path),
            }
        }
        Ok(products)
    }

    async fn list_published(&self) -> Result<Vec<Product>> {
        let docs = self.store.list(paths::PRODUCTS).await?;
        let mut products = Vec::new();
        for (path, doc) in docs {
            match Product::decode(&doc) {
                Some(product) if product.is_published() => products.push(product),
                Some(_) => {}
                None => warn!("{:<12} --> 해석 불가 상품 문서 드롭: {}", "Catalog", path),
            }
        }
        Ok(products)
    }
}

// endregion: --- StoreProductCatalog

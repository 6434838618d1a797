//! Read-only boundary to the article catalog.

pub mod postgres;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use medstock_core::{ArticleId, CategoryId};
use medstock_inventory::CatalogArticle;

use crate::error::StoreError;

pub use postgres::PostgresCatalog;

#[async_trait::async_trait]
pub trait ArticleCatalog: Send + Sync {
    /// Articles in `category`, or every article when `None`, ordered by id.
    async fn list_articles(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<CatalogArticle>, StoreError>;
}

#[async_trait::async_trait]
impl<A> ArticleCatalog for Arc<A>
where
    A: ArticleCatalog + ?Sized,
{
    async fn list_articles(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<CatalogArticle>, StoreError> {
        (**self).list_articles(category).await
    }
}

/// Catalog fixture for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    articles: RwLock<BTreeMap<ArticleId, CatalogArticle>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, article_id: i64, category_id: Option<i64>) -> Result<(), StoreError> {
        let article = CatalogArticle {
            article_id: ArticleId::from_raw(article_id),
            category_id: category_id.map(CategoryId::from_raw),
        };
        let mut articles = self.articles.write().map_err(|_| poisoned())?;
        articles.insert(article.article_id, article);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArticleCatalog for InMemoryCatalog {
    async fn list_articles(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<CatalogArticle>, StoreError> {
        let articles = self.articles.read().map_err(|_| poisoned())?;
        Ok(articles
            .values()
            .filter(|a| a.in_category(category))
            .copied()
            .collect())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

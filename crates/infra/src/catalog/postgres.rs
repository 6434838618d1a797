use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use medstock_core::{ArticleId, CategoryId};
use medstock_inventory::CatalogArticle;

use super::ArticleCatalog;
use crate::error::{StoreError, map_sqlx_error};

/// Reads `articulos` (owned by the catalog service).
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl ArticleCatalog for PostgresCatalog {
    #[instrument(skip(self), fields(category = ?category, article_count), err)]
    async fn list_articles(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<CatalogArticle>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, categoria_id
            FROM articulos
            WHERE ($1::bigint IS NULL OR categoria_id = $1)
            ORDER BY id ASC
            "#,
        )
        .bind(category.map(CategoryId::get))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_articles", e))?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| map_sqlx_error("list_articles", e))?;
            let category_id: Option<i64> = row
                .try_get("categoria_id")
                .map_err(|e| map_sqlx_error("list_articles", e))?;
            articles.push(CatalogArticle {
                article_id: ArticleId::from_raw(id),
                category_id: category_id.map(CategoryId::from_raw),
            });
        }

        Span::current().record("article_count", articles.len());
        Ok(articles)
    }
}

use serde::{Deserialize, Serialize};

use medstock_core::{ArticleId, CategoryId};

/// Article as seen through the read-only catalog boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogArticle {
    #[serde(rename = "articulo_id")]
    pub article_id: ArticleId,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<CategoryId>,
}

impl CatalogArticle {
    pub fn in_category(&self, category: Option<CategoryId>) -> bool {
        match category {
            None => true,
            Some(c) => self.category_id == Some(c),
        }
    }
}

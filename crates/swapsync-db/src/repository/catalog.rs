//! # Catalog Repository
//!
//! Categories and brands. Both are global lookup tables keyed by a
//! case-insensitive unique name, created on first use (phone intake, bulk
//! import) rather than managed up front.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use swapsync_core::validation::validate_required;
use swapsync_core::{Brand, Category};

use crate::error::DbResult;

/// Repository for categories and brands.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Returns the category with this name, creating it if needed.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let a = db.catalog().find_or_create_category("Chargers").await?;
    /// let b = db.catalog().find_or_create_category("chargers").await?;
    /// assert_eq!(a.id, b.id);
    /// ```
    pub async fn find_or_create_category(&self, name: &str) -> DbResult<Category> {
        let mut conn = self.pool.acquire().await?;
        find_or_create_category(&mut conn, name).await
    }

    /// Returns the brand with this name, creating it if needed.
    pub async fn find_or_create_brand(&self, name: &str) -> DbResult<Brand> {
        let mut conn = self.pool.acquire().await?;
        find_or_create_brand(&mut conn, name).await
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as("SELECT * FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    pub async fn list_brands(&self) -> DbResult<Vec<Brand>> {
        let brands = sqlx::query_as("SELECT * FROM brands ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(brands)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) async fn find_or_create_category(conn: &mut SqliteConnection, name: &str) -> DbResult<Category> {
    let name = validate_required("category", name, 100)?;
    let inserted = sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(&name)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 1 {
        debug!(name = %name, "Created category");
    }

    // name is COLLATE NOCASE, so this matches any casing
    let category = sqlx::query_as("SELECT * FROM categories WHERE name = ?")
        .bind(&name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(category)
}

pub(crate) async fn find_or_create_brand(conn: &mut SqliteConnection, name: &str) -> DbResult<Brand> {
    let name = validate_required("brand", name, 100)?;
    let inserted = sqlx::query("INSERT INTO brands (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(&name)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 1 {
        debug!(name = %name, "Created brand");
    }

    let brand = sqlx::query_as("SELECT * FROM brands WHERE name = ?")
        .bind(&name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(brand)
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_find_or_create_is_case_insensitive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let a = catalog.find_or_create_category("Chargers").await.unwrap();
        let b = catalog.find_or_create_category("chargers").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.name, "Chargers");

        catalog.find_or_create_brand("Samsung").await.unwrap();
        catalog.find_or_create_brand("SAMSUNG").await.unwrap();
        catalog.find_or_create_brand("Tecno").await.unwrap();
        let brands = catalog.list_brands().await.unwrap();
        assert_eq!(brands.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.catalog().find_or_create_category("   ").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}

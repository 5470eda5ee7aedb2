//! Persistence client for the `genes` and `internal_fields` tables.
//!
//! Two backends implement [`GeneStore`]: a JSON file database for local and
//! test use, and a hosted PostgREST (Supabase) database.

mod json;
mod supabase;

pub use json::JsonStore;
pub use supabase::SupabaseStore;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::error::AppResult;
use crate::model::{CloneFields, CloneRecord, Gene, NewGene};

/// Typed access to genes and their owner-scoped clones.
///
/// Clone queries always take the owner id and filter on it, so a clone owned
/// by another user is never returned, updated or deleted.
#[async_trait]
pub trait GeneStore: Send + Sync {
    /// All genes, newest first
    async fn list_genes(&self) -> AppResult<Vec<Gene>>;

    async fn get_gene(&self, id: Uuid) -> AppResult<Option<Gene>>;

    /// Exact, case-insensitive symbol match
    async fn find_gene_by_symbol(&self, symbol: &str) -> AppResult<Option<Gene>>;

    /// Case-insensitive substring match on symbol
    async fn search_genes(&self, fragment: &str, limit: usize) -> AppResult<Vec<Gene>>;

    /// Insert, or update the gene whose symbol matches case-insensitively.
    async fn upsert_gene(&self, gene: NewGene) -> AppResult<Gene>;

    async fn list_clones(&self, owner: Uuid, gene_ids: &[Uuid]) -> AppResult<Vec<CloneRecord>>;

    async fn insert_clone(
        &self,
        owner: Uuid,
        gene_id: Uuid,
        fields: CloneFields,
    ) -> AppResult<CloneRecord>;

    /// Merge `patch` into the owner's clone; last write wins.
    async fn update_clone(
        &self,
        owner: Uuid,
        clone_id: Uuid,
        patch: CloneFields,
    ) -> AppResult<CloneRecord>;

    async fn delete_clone(&self, owner: Uuid, clone_id: Uuid) -> AppResult<()>;
}

/// Open the backend named by `GENE_STORE`.
pub fn open_store(config: &Config) -> AppResult<Arc<dyn GeneStore>> {
    let backend: Arc<dyn GeneStore> = match config.store {
        StoreBackend::Json => Arc::new(JsonStore::open(&config.database_path)?),
        StoreBackend::Supabase => {
            let (url, key) = config.supabase_credentials()?;
            Arc::new(SupabaseStore::new(url, key))
        }
    };
    Ok(backend)
}

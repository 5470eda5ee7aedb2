use std::sync::RwLock;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::model::Gene;
use crate::store::GeneStore;

/// In-memory copy of the gene list, reloaded after every mutation
///
/// Reconciliation consults this before going to the network; the table view
/// reads it instead of re-querying the store.
#[derive(Default)]
pub struct GeneCache {
    genes: RwLock<Vec<Gene>>,
}

impl GeneCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached list with the store's current contents.
    pub async fn refresh(&self, store: &dyn GeneStore) -> AppResult<usize> {
        let genes = store.list_genes().await?;
        let count = genes.len();
        *self
            .genes
            .write()
            .map_err(|_| AppError::Storage("gene cache lock poisoned".to_string()))? = genes;
        debug!("Gene cache refreshed with {count} genes");
        Ok(count)
    }

    pub fn find_by_symbol(&self, symbol: &str) -> Option<Gene> {
        self.genes
            .read()
            .ok()?
            .iter()
            .find(|gene| gene.matches_symbol(symbol))
            .cloned()
    }

    /// Current contents, newest first
    pub fn snapshot(&self) -> Vec<Gene> {
        self.genes.read().map(|genes| genes.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.genes.read().map(|genes| genes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewGene;
    use crate::store::JsonStore;

    #[tokio::test]
    async fn refresh_picks_up_new_genes() {
        let store = JsonStore::in_memory();
        let cache = GeneCache::new();
        assert!(cache.is_empty());

        store.upsert_gene(NewGene::new("BRCA1")).await.unwrap();
        assert!(cache.find_by_symbol("BRCA1").is_none());

        assert_eq!(cache.refresh(&store).await.unwrap(), 1);
        assert_eq!(cache.find_by_symbol("brca1").unwrap().symbol, "BRCA1");
        assert_eq!(cache.snapshot().len(), 1);
    }
}

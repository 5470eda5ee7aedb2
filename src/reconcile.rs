//! Local-first, external-fallback resolution of gene symbols.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::GeneCache;
use crate::error::{AppError, AppResult};
use crate::gateway::{GeneHit, GeneLookupGateway};
use crate::model::{CloneRecord, Gene, GeneRecord, NewGene};
use crate::store::GeneStore;

/// Maximum number of rows returned by a local symbol search
pub const SEARCH_LIMIT: usize = 10;

/// Map the first upstream hit onto a gene upsert payload.
///
/// A hit without a symbol is keyed by the symbol the user typed.
pub fn gene_from_hit(hit: &GeneHit, requested: &str) -> NewGene {
    let symbol = hit
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(requested)
        .to_string();

    NewGene {
        symbol,
        entrez_id: hit.entrez_id(),
        name: hit.name.clone(),
        description: hit.summary.clone(),
        map_location: hit.chromosome(),
        uniprot_id: hit.swiss_prot(),
        ensembl_id: hit.ensembl_gene(),
        type_of_gene: hit.type_of_gene.clone(),
        alias: hit.aliases(),
        summary: hit.summary.clone(),
    }
}

/// Attach clones to genes, keeping the gene order.
pub fn join_clones(genes: Vec<Gene>, clones: Vec<CloneRecord>) -> Vec<GeneRecord> {
    let mut by_gene: HashMap<Uuid, Vec<CloneRecord>> = HashMap::new();
    for clone in clones {
        by_gene.entry(clone.gene_id).or_default().push(clone);
    }

    genes
        .into_iter()
        .map(|gene| {
            let clones = by_gene.remove(&gene.id).unwrap_or_default();
            GeneRecord::new(gene, clones)
        })
        .collect()
}

/// Resolves symbols against the cache, the store and the external gateway.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn GeneStore>,
    gateway: Arc<dyn GeneLookupGateway>,
    cache: Arc<GeneCache>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn GeneStore>,
        gateway: Arc<dyn GeneLookupGateway>,
        cache: Arc<GeneCache>,
    ) -> Self {
        Reconciler {
            store,
            gateway,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn GeneStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<GeneCache> {
        &self.cache
    }

    /// Resolve a user-supplied symbol to a persisted gene with its clones.
    ///
    /// A cached gene is returned without any network call. Otherwise the
    /// gateway is asked with the trimmed (not upper-cased) symbol, the first
    /// hit is upserted by symbol and the cache is refreshed.
    pub async fn resolve(&self, symbol: &str, viewer: Option<Uuid>) -> AppResult<GeneRecord> {
        let requested = symbol.trim();
        if requested.is_empty() {
            return Err(AppError::InvalidInput("Gene symbol is required".to_string()));
        }

        if let Some(gene) = self.cache.find_by_symbol(requested) {
            debug!("Cache hit for {requested}");
            return self.attach(gene, viewer).await;
        }

        info!("Fetching gene data for {requested}");
        let response = self.gateway.lookup(requested).await?;
        let hit = response
            .hits
            .first()
            .ok_or_else(|| AppError::GeneNotFound(requested.to_string()))?;

        let gene = self.store.upsert_gene(gene_from_hit(hit, requested)).await?;
        info!("Saved gene {} ({})", gene.symbol, gene.id);

        self.cache.refresh(self.store.as_ref()).await?;
        self.attach(gene, viewer).await
    }

    /// Every gene, newest first, with the viewer's clones attached.
    ///
    /// Anonymous viewers see genes without clones.
    pub async fn records(&self, viewer: Option<Uuid>) -> AppResult<Vec<GeneRecord>> {
        self.cache.refresh(self.store.as_ref()).await?;
        let genes = self.cache.snapshot();

        let clones = match viewer {
            Some(owner) => {
                let ids: Vec<Uuid> = genes.iter().map(|gene| gene.id).collect();
                self.store.list_clones(owner, &ids).await?
            }
            None => Vec::new(),
        };

        Ok(join_clones(genes, clones))
    }

    pub async fn record(&self, gene_id: Uuid, viewer: Option<Uuid>) -> AppResult<GeneRecord> {
        let gene = self
            .store
            .get_gene(gene_id)
            .await?
            .ok_or_else(|| AppError::RecordNotFound(format!("Gene {gene_id}")))?;
        self.attach(gene, viewer).await
    }

    /// Case-insensitive substring search over stored symbols.
    pub async fn search(&self, fragment: &str) -> AppResult<Vec<Gene>> {
        if fragment.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_genes(fragment, SEARCH_LIMIT).await
    }

    async fn attach(&self, gene: Gene, viewer: Option<Uuid>) -> AppResult<GeneRecord> {
        let clones = match viewer {
            Some(owner) => self.store.list_clones(owner, &[gene.id]).await?,
            None => Vec::new(),
        };
        Ok(GeneRecord::new(gene, clones))
    }
}

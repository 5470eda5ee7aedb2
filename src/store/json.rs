use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::GeneStore;
use crate::error::{AppError, AppResult};
use crate::model::{CloneFields, CloneRecord, Gene, NewGene};

/// On-disk layout of the JSON database
#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    genes: Vec<Gene>,
    #[serde(default)]
    internal_fields: Vec<CloneRecord>,
}

/// File-backed gene database
///
/// The whole database lives behind one lock, so the case-insensitive symbol
/// uniqueness check and the insert in [`GeneStore::upsert_gene`] are atomic.
/// Every operation reloads the file under the lock and every mutation rewrites
/// it before the lock is released, so rows written by another process sharing
/// the file (the server and `gene-cli`) are kept.
pub struct JsonStore {
    path: Option<PathBuf>,
    db: Mutex<Database>,
}

impl JsonStore {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        JsonStore {
            path: None,
            db: Mutex::new(Database::default()),
        }
    }

    /// Open the database file, creating it (and its directory) if missing.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                create_dir_all(dir)?;
            }
        }

        let db = if path.exists() {
            read_database(&path)?
        } else {
            let db = Database::default();
            write_database(&path, &db)?;
            db
        };

        info!(
            "Opened gene database at {} ({} genes, {} clones)",
            path.display(),
            db.genes.len(),
            db.internal_fields.len()
        );

        Ok(JsonStore {
            path: Some(path),
            db: Mutex::new(db),
        })
    }

    /// Lock the database and bring it up to date with the file.
    fn lock(&self) -> AppResult<MutexGuard<'_, Database>> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| AppError::Storage("database lock poisoned".to_string()))?;

        if let Some(path) = &self.path {
            if path.exists() {
                *db = read_database(path)?;
            }
        }
        Ok(db)
    }

    fn save(&self, db: &Database) -> AppResult<()> {
        match &self.path {
            Some(path) => write_database(path, db),
            None => Ok(()),
        }
    }
}

fn read_database(path: &Path) -> AppResult<Database> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        Ok(Database::default())
    } else {
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Write through a sibling temp file so readers never see a partial document.
fn write_database(path: &Path, db: &Database) -> AppResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_string_pretty(db)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl GeneStore for JsonStore {
    async fn list_genes(&self) -> AppResult<Vec<Gene>> {
        let db = self.lock()?;
        // Reverse first so equal timestamps still list the latest insert first
        let mut genes: Vec<Gene> = db.genes.iter().rev().cloned().collect();
        genes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(genes)
    }

    async fn get_gene(&self, id: Uuid) -> AppResult<Option<Gene>> {
        let db = self.lock()?;
        Ok(db.genes.iter().find(|gene| gene.id == id).cloned())
    }

    async fn find_gene_by_symbol(&self, symbol: &str) -> AppResult<Option<Gene>> {
        let db = self.lock()?;
        Ok(db.genes.iter().find(|gene| gene.matches_symbol(symbol)).cloned())
    }

    async fn search_genes(&self, fragment: &str, limit: usize) -> AppResult<Vec<Gene>> {
        let needle = fragment.trim().to_lowercase();
        let db = self.lock()?;
        let mut hits: Vec<Gene> = db
            .genes
            .iter()
            .filter(|gene| gene.symbol.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert_gene(&self, gene: NewGene) -> AppResult<Gene> {
        if gene.symbol.trim().is_empty() {
            return Err(AppError::InvalidInput("Gene symbol is required".to_string()));
        }

        let now = Utc::now();
        let mut db = self.lock()?;

        let stored = match db.genes.iter_mut().find(|g| g.matches_symbol(&gene.symbol)) {
            Some(existing) => {
                debug!("Updating gene {}", existing.symbol);
                existing.apply(gene, now);
                existing.clone()
            }
            None => {
                let created = Gene::create(gene, now);
                debug!("Inserting gene {}", created.symbol);
                db.genes.push(created.clone());
                created
            }
        };

        self.save(&db)?;
        Ok(stored)
    }

    async fn list_clones(&self, owner: Uuid, gene_ids: &[Uuid]) -> AppResult<Vec<CloneRecord>> {
        let db = self.lock()?;
        Ok(db
            .internal_fields
            .iter()
            .filter(|clone| clone.user_id == owner && gene_ids.contains(&clone.gene_id))
            .cloned()
            .collect())
    }

    async fn insert_clone(
        &self,
        owner: Uuid,
        gene_id: Uuid,
        fields: CloneFields,
    ) -> AppResult<CloneRecord> {
        let mut db = self.lock()?;
        if !db.genes.iter().any(|gene| gene.id == gene_id) {
            return Err(AppError::RecordNotFound(format!("Gene {gene_id}")));
        }

        let record = CloneRecord::create(gene_id, owner, fields, Utc::now());
        db.internal_fields.push(record.clone());
        self.save(&db)?;
        Ok(record)
    }

    async fn update_clone(
        &self,
        owner: Uuid,
        clone_id: Uuid,
        patch: CloneFields,
    ) -> AppResult<CloneRecord> {
        let mut db = self.lock()?;
        let record = db
            .internal_fields
            .iter_mut()
            .find(|clone| clone.id == clone_id && clone.user_id == owner)
            .ok_or_else(|| AppError::RecordNotFound(format!("Clone {clone_id}")))?;

        record.fields.merge(patch);
        record.updated_at = Utc::now();
        let updated = record.clone();

        self.save(&db)?;
        Ok(updated)
    }

    async fn delete_clone(&self, owner: Uuid, clone_id: Uuid) -> AppResult<()> {
        let mut db = self.lock()?;
        let before = db.internal_fields.len();
        db.internal_fields
            .retain(|clone| !(clone.id == clone_id && clone.user_id == owner));

        if db.internal_fields.len() == before {
            return Err(AppError::RecordNotFound(format!("Clone {clone_id}")));
        }

        self.save(&db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn clone_named(name: &str) -> CloneFields {
        CloneFields {
            clone: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_symbol_case_insensitively() {
        let store = JsonStore::in_memory();
        let first = store
            .upsert_gene(NewGene {
                name: Some("BRCA1 DNA repair associated".to_string()),
                ..NewGene::new("BRCA1")
            })
            .await
            .unwrap();
        let second = store
            .upsert_gene(NewGene {
                entrez_id: Some("672".to_string()),
                ..NewGene::new("brca1")
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.symbol, "BRCA1");
        assert_eq!(second.entrez_id.as_deref(), Some("672"));
        assert_eq!(second.name.as_deref(), Some("BRCA1 DNA repair associated"));
        assert_eq!(store.list_genes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_symbol_is_rejected() {
        let store = JsonStore::in_memory();
        let err = store.upsert_gene(NewGene::new("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn clones_are_owner_scoped() {
        let store = JsonStore::in_memory();
        let gene = store.upsert_gene(NewGene::new("TP53")).await.unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let clone = store
            .insert_clone(alice, gene.id, clone_named("TP53-001"))
            .await
            .unwrap();

        assert_eq!(store.list_clones(alice, &[gene.id]).await.unwrap().len(), 1);
        assert!(store.list_clones(bob, &[gene.id]).await.unwrap().is_empty());

        let err = store
            .update_clone(bob, clone.id, clone_named("hijacked"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound(_)));

        let err = store.delete_clone(bob, clone.id).await.unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound(_)));

        store.delete_clone(alice, clone.id).await.unwrap();
        assert!(store.list_clones(alice, &[gene.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_clone_requires_existing_gene() {
        let store = JsonStore::in_memory();
        let err = store
            .insert_clone(Uuid::new_v4(), Uuid::new_v4(), clone_named("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn search_matches_substrings() {
        let store = JsonStore::in_memory();
        for symbol in ["BRCA1", "BRCA2", "TP53"] {
            store.upsert_gene(NewGene::new(symbol)).await.unwrap();
        }
        let hits = store.search_genes("brca", 10).await.unwrap();
        let symbols: Vec<&str> = hits.iter().map(|g| g.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BRCA1", "BRCA2"]);
        assert_eq!(store.search_genes("brca", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stores_sharing_a_file_keep_each_others_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("genes.json");
        let server = JsonStore::open(&path).unwrap();
        let cli = JsonStore::open(&path).unwrap();
        let owner = Uuid::new_v4();

        let imported = cli.upsert_gene(NewGene::new("CLI1")).await.unwrap();
        server.upsert_gene(NewGene::new("SRV1")).await.unwrap();
        server
            .insert_clone(owner, imported.id, clone_named("CLI1-001"))
            .await
            .unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        let mut symbols: Vec<String> = reopened
            .list_genes()
            .await
            .unwrap()
            .into_iter()
            .map(|gene| gene.symbol)
            .collect();
        symbols.sort();
        assert_eq!(symbols, vec!["CLI1", "SRV1"]);
        assert_eq!(cli.list_clones(owner, &[imported.id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn database_file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("genes.json");
        let owner = Uuid::new_v4();

        {
            let store = JsonStore::open(&path).unwrap();
            let gene = store.upsert_gene(NewGene::new("EGFR")).await.unwrap();
            store
                .insert_clone(owner, gene.id, clone_named("EGFR-7"))
                .await
                .unwrap();
        }

        let reopened = JsonStore::open(&path).unwrap();
        let gene = reopened.find_gene_by_symbol("egfr").await.unwrap().unwrap();
        let clones = reopened.list_clones(owner, &[gene.id]).await.unwrap();
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].fields.clone.as_deref(), Some("EGFR-7"));
    }
}

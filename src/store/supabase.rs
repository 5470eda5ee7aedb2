use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::GeneStore;
use crate::error::{AppError, AppResult};
use crate::model::{CloneFields, CloneRecord, Gene, NewGene};

const GENES: &str = "genes";
const CLONES: &str = "internal_fields";

/// Hosted database accessed through its PostgREST interface.
///
/// Inserts use `on_conflict=symbol`, which needs a plain unique constraint on
/// the `genes.symbol` column. Case-insensitive matching comes only from the
/// `ilike` lookup that runs before the insert, so two concurrent first-time
/// upserts differing only in case can still produce two rows.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        SupabaseStore {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, name)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    /// Send a request and decode the returned rows.
    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> AppResult<Vec<T>> {
        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("{what} request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!("{what} failed: {status} - {text}")));
        }

        resp.json()
            .await
            .map_err(|e| AppError::Storage(format!("{what} returned malformed rows: {e}")))
    }

    async fn first<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> AppResult<Option<T>> {
        Ok(self.rows(request, what).await?.into_iter().next())
    }
}

/// Escape LIKE metacharacters so `ilike` behaves as case-insensitive equality.
fn like_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

#[async_trait]
impl GeneStore for SupabaseStore {
    async fn list_genes(&self) -> AppResult<Vec<Gene>> {
        let request = self
            .client
            .get(self.table(GENES))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.rows(request, "list genes").await
    }

    async fn get_gene(&self, id: Uuid) -> AppResult<Option<Gene>> {
        let request = self
            .client
            .get(self.table(GENES))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        self.first(request, "get gene").await
    }

    async fn find_gene_by_symbol(&self, symbol: &str) -> AppResult<Option<Gene>> {
        let request = self.client.get(self.table(GENES)).query(&[
            ("select", "*".to_string()),
            ("symbol", format!("ilike.{}", like_literal(symbol.trim()))),
        ]);
        let genes: Vec<Gene> = self.rows(request, "find gene").await?;
        Ok(genes.into_iter().find(|gene| gene.matches_symbol(symbol)))
    }

    async fn search_genes(&self, fragment: &str, limit: usize) -> AppResult<Vec<Gene>> {
        let request = self.client.get(self.table(GENES)).query(&[
            ("select", "*".to_string()),
            ("symbol", format!("ilike.*{}*", like_literal(fragment.trim()))),
            ("order", "symbol.asc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.rows(request, "search genes").await
    }

    async fn upsert_gene(&self, gene: NewGene) -> AppResult<Gene> {
        if gene.symbol.trim().is_empty() {
            return Err(AppError::InvalidInput("Gene symbol is required".to_string()));
        }

        if let Some(existing) = self.find_gene_by_symbol(&gene.symbol).await? {
            let mut body = object(serde_json::to_value(&gene)?);
            body.remove("symbol");
            body.insert("updated_at".to_string(), json!(Utc::now()));

            debug!("Updating gene {}", existing.symbol);
            let request = self
                .client
                .patch(self.table(GENES))
                .query(&[("id", format!("eq.{}", existing.id))])
                .header("Prefer", "return=representation")
                .json(&body);
            return self
                .first(request, "update gene")
                .await?
                .ok_or_else(|| AppError::RecordNotFound(format!("Gene {}", existing.id)));
        }

        let gene = NewGene {
            symbol: gene.symbol.trim().to_string(),
            ..gene
        };
        debug!("Inserting gene {}", gene.symbol);
        let request = self
            .client
            .post(self.table(GENES))
            .query(&[("on_conflict", "symbol")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&gene);
        self.first(request, "insert gene")
            .await?
            .ok_or_else(|| AppError::Storage(format!("insert of {} returned no row", gene.symbol)))
    }

    async fn list_clones(&self, owner: Uuid, gene_ids: &[Uuid]) -> AppResult<Vec<CloneRecord>> {
        if gene_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = gene_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self.client.get(self.table(CLONES)).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{owner}")),
            ("gene_id", format!("in.({ids})")),
        ]);
        self.rows(request, "list clones").await
    }

    async fn insert_clone(
        &self,
        owner: Uuid,
        gene_id: Uuid,
        fields: CloneFields,
    ) -> AppResult<CloneRecord> {
        if self.get_gene(gene_id).await?.is_none() {
            return Err(AppError::RecordNotFound(format!("Gene {gene_id}")));
        }

        let mut body = object(serde_json::to_value(&fields)?);
        body.insert("gene_id".to_string(), json!(gene_id));
        body.insert("user_id".to_string(), json!(owner));

        let request = self
            .client
            .post(self.table(CLONES))
            .header("Prefer", "return=representation")
            .json(&body);
        self.first(request, "insert clone")
            .await?
            .ok_or_else(|| AppError::Storage("insert clone returned no row".to_string()))
    }

    async fn update_clone(
        &self,
        owner: Uuid,
        clone_id: Uuid,
        patch: CloneFields,
    ) -> AppResult<CloneRecord> {
        let mut body = object(serde_json::to_value(&patch)?);
        body.insert("updated_at".to_string(), json!(Utc::now()));

        let request = self
            .client
            .patch(self.table(CLONES))
            .query(&[
                ("id", format!("eq.{clone_id}")),
                ("user_id", format!("eq.{owner}")),
            ])
            .header("Prefer", "return=representation")
            .json(&body);
        self.first(request, "update clone")
            .await?
            .ok_or_else(|| AppError::RecordNotFound(format!("Clone {clone_id}")))
    }

    async fn delete_clone(&self, owner: Uuid, clone_id: Uuid) -> AppResult<()> {
        let request = self
            .client
            .delete(self.table(CLONES))
            .query(&[
                ("id", format!("eq.{clone_id}")),
                ("user_id", format!("eq.{owner}")),
            ])
            .header("Prefer", "return=representation");
        let deleted: Vec<CloneRecord> = self.rows(request, "delete clone").await?;
        if deleted.is_empty() {
            return Err(AppError::RecordNotFound(format!("Clone {clone_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_literal_escapes_wildcards() {
        assert_eq!(like_literal("BRCA1"), "BRCA1");
        assert_eq!(like_literal("A_B%C*"), "A\\_B\\%C\\*");
    }
}

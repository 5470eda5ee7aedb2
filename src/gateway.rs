//! External gene-information lookups.
//!
//! [`MyGeneClient`] talks to the public MyGene.info service directly and also
//! backs the pass-through proxy endpoint. [`EdgeFunctionGateway`] reaches the
//! same data through the hosted `fetch-gene-data` function.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{Config, LookupMode};
use crate::error::{AppError, AppResult};

/// Fields requested from the upstream query endpoint
pub const QUERY_FIELDS: &str =
    "symbol,name,summary,entrezgene,uniprot,ensembl,genomic_pos,genomic_pos_hg19,type_of_gene,alias";

/// Upstream response shape: `{hits: [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneQueryResponse {
    #[serde(default)]
    pub hits: Vec<GeneHit>,
}

/// One upstream hit.
///
/// Several upstream fields come back either as a single value or as a list
/// depending on the gene, so they are kept as raw JSON and read through the
/// accessor methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneHit {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub entrezgene: Option<Value>,
    #[serde(default)]
    pub uniprot: Option<Value>,
    #[serde(default)]
    pub ensembl: Option<Value>,
    #[serde(default)]
    pub genomic_pos: Option<Value>,
    #[serde(default)]
    pub genomic_pos_hg19: Option<Value>,
    #[serde(default)]
    pub type_of_gene: Option<String>,
    #[serde(default)]
    pub alias: Option<Value>,
}

fn first(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GeneHit {
    pub fn entrez_id(&self) -> Option<String> {
        self.entrezgene.as_ref().and_then(first).and_then(text)
    }

    /// `genomic_pos.chr`, from the first position when several are reported
    pub fn chromosome(&self) -> Option<String> {
        self.genomic_pos
            .as_ref()
            .and_then(first)
            .and_then(|pos| pos.get("chr"))
            .and_then(text)
    }

    /// `uniprot["Swiss-Prot"]`
    pub fn swiss_prot(&self) -> Option<String> {
        self.uniprot
            .as_ref()
            .and_then(|u| u.get("Swiss-Prot"))
            .and_then(first)
            .and_then(text)
    }

    /// `ensembl.gene`
    pub fn ensembl_gene(&self) -> Option<String> {
        self.ensembl
            .as_ref()
            .and_then(first)
            .and_then(|e| e.get("gene"))
            .and_then(first)
            .and_then(text)
    }

    pub fn aliases(&self) -> Vec<String> {
        match &self.alias {
            Some(Value::Array(items)) => items.iter().filter_map(text).collect(),
            Some(other) => text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Narrow interface the reconciliation logic depends on
#[async_trait]
pub trait GeneLookupGateway: Send + Sync {
    async fn lookup(&self, symbol: &str) -> AppResult<GeneQueryResponse>;
}

/// Upstream body as received, with its declared content type
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Direct client for the MyGene.info query API
#[derive(Clone)]
pub struct MyGeneClient {
    client: Client,
    base_url: String,
}

impl MyGeneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        MyGeneClient {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Raw upstream response for `symbol`, body bytes untouched.
    pub async fn fetch_raw(&self, symbol: &str) -> AppResult<RawResponse> {
        let url = format!("{}/query", self.base_url);
        debug!("Querying {url} for {symbol}");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", symbol),
                ("species", "human"),
                ("fields", QUERY_FIELDS),
                ("size", "5"),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!("MyGene.info returned {status} for {symbol}");
            return Err(AppError::ExternalService(format!(
                "MyGene.info API error: {}",
                status.as_u16()
            )));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| AppError::ExternalService(format!("malformed MyGene.info response: {e}")))?;

        Ok(RawResponse {
            content_type,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl GeneLookupGateway for MyGeneClient {
    async fn lookup(&self, symbol: &str) -> AppResult<GeneQueryResponse> {
        let raw = self.fetch_raw(symbol).await?;
        serde_json::from_slice(&raw.body)
            .map_err(|e| AppError::ExternalService(format!("unexpected gene API payload: {e}")))
    }
}

/// Invokes the hosted `fetch-gene-data` function, which proxies MyGene.info
#[derive(Clone)]
pub struct EdgeFunctionGateway {
    client: Client,
    url: String,
    api_key: String,
}

impl EdgeFunctionGateway {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        EdgeFunctionGateway {
            client: Client::new(),
            url: format!("{}/functions/v1/fetch-gene-data", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl GeneLookupGateway for EdgeFunctionGateway {
    async fn lookup(&self, symbol: &str) -> AppResult<GeneQueryResponse> {
        let resp = self
            .client
            .post(&self.url)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&json!({ "geneSymbol": symbol }))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("fetch-gene-data returned {status}"));
            return Err(AppError::ExternalService(message));
        }

        resp.json()
            .await
            .map_err(|e| AppError::ExternalService(format!("unexpected gene API payload: {e}")))
    }
}

/// Build the gateway named by `GENE_LOOKUP`.
pub fn lookup_gateway(config: &Config) -> AppResult<Arc<dyn GeneLookupGateway>> {
    let backend: Arc<dyn GeneLookupGateway> = match config.lookup {
        LookupMode::Direct => Arc::new(MyGeneClient::new(config.mygene_url.as_str())),
        LookupMode::Function => {
            let (url, key) = config.supabase_credentials()?;
            Arc::new(EdgeFunctionGateway::new(url, key))
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_handle_single_values() {
        let hit: GeneHit = serde_json::from_value(json!({
            "symbol": "BRCA1",
            "entrezgene": 672,
            "genomic_pos": {"chr": "17", "start": 43044295, "end": 43170245},
            "uniprot": {"Swiss-Prot": "P38398"},
            "ensembl": {"gene": "ENSG00000012048"},
            "alias": "RNF53"
        }))
        .unwrap();

        assert_eq!(hit.entrez_id().as_deref(), Some("672"));
        assert_eq!(hit.chromosome().as_deref(), Some("17"));
        assert_eq!(hit.swiss_prot().as_deref(), Some("P38398"));
        assert_eq!(hit.ensembl_gene().as_deref(), Some("ENSG00000012048"));
        assert_eq!(hit.aliases(), vec!["RNF53".to_string()]);
    }

    #[test]
    fn accessors_handle_lists() {
        let hit: GeneHit = serde_json::from_value(json!({
            "entrezgene": "7157",
            "genomic_pos": [{"chr": "17"}, {"chr": "HSCHR17_1_CTG1"}],
            "uniprot": {"Swiss-Prot": ["P04637", "Q00000"]},
            "ensembl": [{"gene": "ENSG00000141510"}, {"gene": "ENSG00000999999"}],
            "alias": ["BCC7", "LFS1", "TRP53"]
        }))
        .unwrap();

        assert_eq!(hit.entrez_id().as_deref(), Some("7157"));
        assert_eq!(hit.chromosome().as_deref(), Some("17"));
        assert_eq!(hit.swiss_prot().as_deref(), Some("P04637"));
        assert_eq!(hit.ensembl_gene().as_deref(), Some("ENSG00000141510"));
        assert_eq!(hit.aliases().len(), 3);
    }

    #[test]
    fn missing_fields_are_none() {
        let hit = GeneHit::default();
        assert!(hit.entrez_id().is_none());
        assert!(hit.chromosome().is_none());
        assert!(hit.swiss_prot().is_none());
        assert!(hit.ensembl_gene().is_none());
        assert!(hit.aliases().is_empty());
    }
}

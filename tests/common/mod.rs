#![allow(dead_code)]

use async_trait::async_trait;
use gene_annotator::config::Config;
use gene_annotator::error::{AppError, AppResult};
use gene_annotator::gateway::{GeneLookupGateway, GeneQueryResponse};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upstream-shaped payload with a single BRCA1 hit
pub fn brca1_response() -> Value {
    json!({
        "took": 3,
        "total": 1,
        "max_score": 92.1,
        "hits": [{
            "_id": "672",
            "_score": 92.1,
            "symbol": "BRCA1",
            "name": "BRCA1 DNA repair associated",
            "summary": "This gene encodes a 190 kD nuclear phosphoprotein.",
            "entrezgene": 672,
            "genomic_pos": {"chr": "17", "start": 43044295, "end": 43170245, "strand": -1},
            "genomic_pos_hg19": {"chr": "17", "start": 41196312, "end": 41277500},
            "uniprot": {"Swiss-Prot": "P38398", "TrEMBL": ["A0A024R1V0"]},
            "ensembl": {"gene": "ENSG00000012048"},
            "type_of_gene": "protein-coding",
            "alias": ["BRCAI", "BRCC1", "RNF53"]
        }]
    })
}

/// Gateway double that answers from a fixed table and counts calls
#[derive(Default)]
pub struct CountingGateway {
    pub calls: AtomicUsize,
    pub requested: Mutex<Vec<String>>,
    responses: HashMap<String, Value>,
    fail_with: Option<String>,
}

impl CountingGateway {
    pub fn with_hit(symbol: &str, response: Value) -> Self {
        let mut responses = HashMap::new();
        responses.insert(symbol.to_lowercase(), response);
        CountingGateway {
            responses,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        CountingGateway {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeneLookupGateway for CountingGateway {
    async fn lookup(&self, symbol: &str) -> AppResult<GeneQueryResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbol.to_string());

        if let Some(message) = &self.fail_with {
            return Err(AppError::ExternalService(message.clone()));
        }

        match self.responses.get(&symbol.to_lowercase()) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(GeneQueryResponse::default()),
        }
    }
}

/// Config with defaults plus the given overrides
pub fn test_config(pairs: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned()).unwrap()
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Gene record as stored in the `genes` table
///
/// `symbol` is the business key and is compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub id: Uuid,
    pub symbol: String,
    #[serde(default)]
    pub entrez_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub map_location: Option<String>,
    #[serde(default)]
    pub uniprot_id: Option<String>,
    #[serde(default)]
    pub ensembl_id: Option<String>,
    #[serde(default)]
    pub type_of_gene: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub alias: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert/upsert payload for a gene, keyed by `symbol`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGene {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrez_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniprot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensembl_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_gene: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NewGene {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }
}

impl Gene {
    /// Create a fresh record with a generated id.
    pub fn create(new: NewGene, now: DateTime<Utc>) -> Self {
        Gene {
            id: Uuid::new_v4(),
            symbol: new.symbol.trim().to_string(),
            entrez_id: new.entrez_id,
            name: new.name,
            description: new.description,
            map_location: new.map_location,
            uniprot_id: new.uniprot_id,
            ensembl_id: new.ensembl_id,
            type_of_gene: new.type_of_gene,
            alias: new.alias,
            summary: new.summary,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the fields `new` carries; the stored symbol keeps its casing.
    pub fn apply(&mut self, new: NewGene, now: DateTime<Utc>) {
        macro_rules! take {
            ($($field:ident),*) => {
                $( if new.$field.is_some() { self.$field = new.$field; } )*
            };
        }
        take!(
            entrez_id,
            name,
            description,
            map_location,
            uniprot_id,
            ensembl_id,
            type_of_gene,
            summary
        );
        if !new.alias.is_empty() {
            self.alias = new.alias;
        }
        self.updated_at = now;
    }

    pub fn matches_symbol(&self, symbol: &str) -> bool {
        same_symbol(&self.symbol, symbol)
    }
}

/// Case-insensitive, whitespace-trimmed symbol comparison
pub fn same_symbol(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

macro_rules! clone_fields {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
        /// Descriptive attributes of a clone (internal field record)
        ///
        /// Every attribute is optional so the same type serves as a full record
        /// and as a partial update; `None` means "not provided".
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct CloneFields {
            $(
                $(#[$meta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl CloneFields {
            /// Merge a partial update: provided attributes win, the rest are kept.
            pub fn merge(&mut self, patch: CloneFields) {
                $( if patch.$field.is_some() { self.$field = patch.$field; } )*
            }
        }
    };
}

clone_fields! {
    /// Clone identifier, required when a clone is created
    clone: String,
    notes: String,
    assigned_to: String,
    tags: BTreeSet<String>,
    parent_product_id: String,
    nbt_num: String,
    catalog_num: String,
    host: String,
    clonality: String,
    isotype: String,
    light_chain: String,
    storage_temperature: String,
    lead_time: String,
    country_of_origin: String,
    datasheet_url: String,
    sds_url: String,
    website_url_to_product: String,
    price_usd: f64,
    product_application: String,
    research_area: String,
    image_url: String,
    image_filename: String,
    image_caption: String,
    positive_control: String,
    expression_system: String,
    purification: String,
    supplied_as: String,
    immunogen: String,
    species_reactivity: String,
    product_cellular_localization: String,
    molecular_wt: String,
    vector: String,
    bacterial_strain: String,
    antibiotic_resistance: String,
    concentration: f64,
    location: String,
}

impl CloneFields {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_ref().is_some_and(|tags| tags.contains(tag))
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.get_or_insert_with(BTreeSet::new).insert(tag.into());
    }
}

/// Clone row from the `internal_fields` table, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneRecord {
    pub id: Uuid,
    pub gene_id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub fields: CloneFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CloneRecord {
    pub fn create(gene_id: Uuid, user_id: Uuid, fields: CloneFields, now: DateTime<Utc>) -> Self {
        CloneRecord {
            id: Uuid::new_v4(),
            gene_id,
            user_id,
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A gene together with the clones visible to the current viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    #[serde(flatten)]
    pub gene: Gene,
    #[serde(default)]
    pub clones: Vec<CloneRecord>,
}

impl GeneRecord {
    pub fn new(gene: Gene, clones: Vec<CloneRecord>) -> Self {
        GeneRecord { gene, clones }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unspecified_fields() {
        let mut fields = CloneFields {
            clone: Some("BRCA1-001".to_string()),
            host: Some("Mouse".to_string()),
            price_usd: Some(120.0),
            ..Default::default()
        };
        fields.merge(CloneFields {
            host: Some("Rabbit".to_string()),
            notes: Some("re-validated".to_string()),
            ..Default::default()
        });

        assert_eq!(fields.clone.as_deref(), Some("BRCA1-001"));
        assert_eq!(fields.host.as_deref(), Some("Rabbit"));
        assert_eq!(fields.notes.as_deref(), Some("re-validated"));
        assert_eq!(fields.price_usd, Some(120.0));
    }

    #[test]
    fn clone_record_serializes_flat() {
        let now = Utc::now();
        let mut fields = CloneFields {
            clone: Some("C1".to_string()),
            ..Default::default()
        };
        fields.add_tag("complete");
        let record = CloneRecord::create(Uuid::new_v4(), Uuid::new_v4(), fields, now);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["clone"], "C1");
        assert_eq!(value["tags"], serde_json::json!(["complete"]));
        assert!(value.get("host").is_none());

        let back: CloneRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn gene_accepts_null_alias() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "symbol": "TP53",
            "alias": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let gene: Gene = serde_json::from_value(json).unwrap();
        assert!(gene.alias.is_empty());
        assert!(gene.matches_symbol(" tp53 "));
    }

    #[test]
    fn apply_overwrites_only_provided_fields() {
        let now = Utc::now();
        let mut gene = Gene::create(
            NewGene {
                name: Some("old name".to_string()),
                entrez_id: Some("7157".to_string()),
                ..NewGene::new("TP53")
            },
            now,
        );
        gene.apply(
            NewGene {
                name: Some("tumor protein p53".to_string()),
                ..NewGene::new("tp53")
            },
            now,
        );
        assert_eq!(gene.symbol, "TP53");
        assert_eq!(gene.name.as_deref(), Some("tumor protein p53"));
        assert_eq!(gene.entrez_id.as_deref(), Some("7157"));
    }
}

use tracing::info;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::error::{AppError, AppResult};
use crate::model::{CloneFields, CloneRecord};
use crate::store::GeneStore;

fn require_user(auth: &dyn AuthProvider) -> AppResult<Uuid> {
    auth.current_user_id().ok_or(AppError::AuthenticationRequired)
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Attach a new clone to a gene, owned by the signed-in user.
pub async fn add_clone(
    store: &dyn GeneStore,
    auth: &dyn AuthProvider,
    gene_id: Uuid,
    fields: CloneFields,
) -> AppResult<CloneRecord> {
    let owner = require_user(auth)?;
    if blank(fields.clone.as_deref()) {
        return Err(AppError::Validation(vec!["Clone ID is required".to_string()]));
    }

    let record = store.insert_clone(owner, gene_id, fields).await?;
    info!("Added clone {} to gene {gene_id}", record.id);
    Ok(record)
}

/// Partial update: only the attributes present in `patch` change.
///
/// Concurrent edits are last-write-wins.
pub async fn update_clone(
    store: &dyn GeneStore,
    auth: &dyn AuthProvider,
    clone_id: Uuid,
    patch: CloneFields,
) -> AppResult<CloneRecord> {
    let owner = require_user(auth)?;
    if patch.clone.is_some() && blank(patch.clone.as_deref()) {
        return Err(AppError::Validation(vec!["Clone ID cannot be empty".to_string()]));
    }

    store.update_clone(owner, clone_id, patch).await
}

pub async fn delete_clone(
    store: &dyn GeneStore,
    auth: &dyn AuthProvider,
    clone_id: Uuid,
) -> AppResult<()> {
    let owner = require_user(auth)?;
    store.delete_clone(owner, clone_id).await?;
    info!("Deleted clone {clone_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FixedUser;
    use crate::model::NewGene;
    use crate::store::JsonStore;

    fn named(clone: &str) -> CloneFields {
        CloneFields {
            clone: Some(clone.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn anonymous_users_cannot_mutate() {
        let store = JsonStore::in_memory();
        let gene = store.upsert_gene(NewGene::new("BRCA1")).await.unwrap();

        let err = add_clone(&store, &FixedUser::anonymous(), gene.id, named("BRCA1-001"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationRequired));

        let err = delete_clone(&store, &FixedUser::anonymous(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn clone_identifier_is_required() {
        let store = JsonStore::in_memory();
        let gene = store.upsert_gene(NewGene::new("BRCA1")).await.unwrap();
        let user = FixedUser::signed_in(Uuid::new_v4());

        let err = add_clone(&store, &user, gene.id, named("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_merges_and_delete_removes() {
        let store = JsonStore::in_memory();
        let gene = store.upsert_gene(NewGene::new("EGFR")).await.unwrap();
        let user = FixedUser::signed_in(Uuid::new_v4());

        let record = add_clone(
            &store,
            &user,
            gene.id,
            CloneFields {
                host: Some("Mouse".to_string()),
                ..named("EGFR-01")
            },
        )
        .await
        .unwrap();

        let updated = update_clone(
            &store,
            &user,
            record.id,
            CloneFields {
                notes: Some("lot 42".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.fields.clone.as_deref(), Some("EGFR-01"));
        assert_eq!(updated.fields.host.as_deref(), Some("Mouse"));
        assert_eq!(updated.fields.notes.as_deref(), Some("lot 42"));

        delete_clone(&store, &user, record.id).await.unwrap();
        let owner = user.current_user_id().unwrap();
        assert!(store.list_clones(owner, &[gene.id]).await.unwrap().is_empty());
    }
}

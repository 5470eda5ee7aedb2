use gene_annotator::auth::FixedUser;
use gene_annotator::error::AppError;
use gene_annotator::import::{ImportKind, import_csv, parse_csv};
use gene_annotator::store::{GeneStore, JsonStore};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use uuid::Uuid;

#[tokio::test]
async fn imported_genes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db").join("genes.json");

    {
        let store = JsonStore::open(&path).unwrap();
        let csv = "Symbol,Name,Entrez ID,Chromosome\nBRCA1,BRCA1 DNA repair associated,672,17q21.31\nTP53,tumor protein p53,7157,17p13.1\n";
        let mut progress = Vec::new();
        let summary = import_csv(
            csv.as_bytes(),
            ImportKind::Genes,
            &FixedUser::anonymous(),
            &store,
            |p| progress.push(p),
        )
        .await
        .unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(progress, vec![50, 100]);
    }

    let reopened = JsonStore::open(&path).unwrap();
    let tp53 = reopened.find_gene_by_symbol("tp53").await.unwrap().unwrap();
    assert_eq!(tp53.entrez_id.as_deref(), Some("7157"));
    assert_eq!(tp53.map_location.as_deref(), Some("17p13.1"));
}

#[tokio::test]
async fn clone_rows_for_unknown_genes_fail_individually() {
    let dir = tempdir().unwrap();
    let store = JsonStore::open(dir.path().join("genes.json")).unwrap();
    let user = Uuid::new_v4();

    import_csv(
        "symbol\nBRCA1\n".as_bytes(),
        ImportKind::Genes,
        &FixedUser::anonymous(),
        &store,
        |_| {},
    )
    .await
    .unwrap();

    let csv = "gene_symbol,clone_id,host,priority,status\nbrca1,BRCA1-001,Rabbit,High,Complete\nNOPE9,NOPE9-001,Mouse,,\n";
    let summary = import_csv(
        csv.as_bytes(),
        ImportKind::Clones,
        &FixedUser::signed_in(user),
        &store,
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.fail_count, 1);
    assert_eq!(summary.failures, vec!["Row 2: Gene NOPE9 not found".to_string()]);

    let gene = store.find_gene_by_symbol("BRCA1").await.unwrap().unwrap();
    let clones = store.list_clones(user, &[gene.id]).await.unwrap();
    assert_eq!(clones.len(), 1);
    assert!(clones[0].fields.has_tag("high-priority"));
    assert!(clones[0].fields.has_tag("complete"));
}

#[tokio::test]
async fn missing_symbol_column_blocks_the_whole_file() {
    let store = JsonStore::in_memory();
    let err = import_csv(
        "name\nno symbol here\n".as_bytes(),
        ImportKind::Genes,
        &FixedUser::anonymous(),
        &store,
        |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.list_genes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_records_block_the_whole_file() {
    let mut csv = b"symbol,name\nBRCA1,ok\nTP53,".to_vec();
    csv.extend_from_slice(&[0xff, 0xfe]);
    csv.push(b'\n');

    let parsed = parse_csv(csv.as_slice()).unwrap();
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.errors.len(), 1);
    assert!(parsed.errors[0].starts_with("Line 3: "), "{:?}", parsed.errors);

    let store = JsonStore::in_memory();
    let err = import_csv(
        csv.as_slice(),
        ImportKind::Genes,
        &FixedUser::anonymous(),
        &store,
        |_| {},
    )
    .await
    .unwrap_err();

    match err {
        AppError::Validation(messages) => assert_eq!(messages, parsed.errors),
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.list_genes().await.unwrap().is_empty());
}

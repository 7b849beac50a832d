//! Ingest -> retrieve against the in-memory stores.

use std::collections::BTreeSet;
use std::sync::Arc;

use extract::PatternExtractor;
use index::{HashEmbedder, Indexer, Stores};
use ingest::{Block, Chunker, ChunkerConfig, ParsedDocument, Strategy};
use query::{EmptyReason, RetrievalConfig, RetrievalEngine, RetrievalMode};
use raptor::TreeBuilder;

struct Pipeline {
    stores: Stores,
    indexer: Indexer,
    engine: RetrievalEngine,
}

fn pipeline() -> Pipeline {
    let stores = Stores::in_memory();
    let embedder = Arc::new(HashEmbedder::new(128));
    let extractor = Arc::new(PatternExtractor::default());
    let indexer = Indexer::new(
        Chunker::new(ChunkerConfig::new(40, 0)).unwrap(),
        TreeBuilder::new(2),
        embedder.clone(),
        extractor.clone(),
        stores.clone(),
    );
    let engine = RetrievalEngine::new(embedder, extractor, stores.clone(), RetrievalConfig::default());
    Pipeline {
        stores,
        indexer,
        engine,
    }
}

/// Two upper-case headings force structure-aware chunking into three chunks.
fn cities() -> ParsedDocument {
    ParsedDocument::from_text("").with_structure(vec![
        Block::heading(1, "CITIES"),
        Block::paragraph("Paris is nice"),
        Block::heading(1, "LANDMARKS"),
        Block::paragraph("Paris has the Eiffel Tower"),
        Block::paragraph("Berlin is far from Paris"),
    ])
}

#[tokio::test]
async fn three_chunk_document_builds_the_cooccurrence_graph() {
    let p = pipeline();
    let report = p.indexer.ingest_parsed(cities(), "cities.md").await.unwrap();
    let doc_id = report.doc_id.as_str();

    assert_eq!(report.strategy, Strategy::Dynamic);
    assert_eq!(report.chunk_count, 3);

    let detail = p.stores.metadata.get_document(doc_id).await.unwrap().unwrap();
    assert!(detail.chunks[0].text_preview.contains("Paris is nice"));
    assert_eq!(detail.chunks[1].text_preview, "Paris has the Eiffel Tower");
    assert_eq!(detail.chunks[2].text_preview, "Berlin is far from Paris");

    let related = p
        .stores
        .metadata
        .related_entities("Eiffel Tower", Some(doc_id), 5)
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].entity, "Paris");
    assert_eq!(related[0].weight, 1.0);

    let chunk_ids: BTreeSet<String> = p
        .stores
        .metadata
        .chunk_ids_for_entities(&["Paris".to_string()], Some(doc_id), 10)
        .await
        .unwrap()
        .into_iter()
        .collect();
    let expected: BTreeSet<String> = (0..3).map(|i| format!("{doc_id}_{i}")).collect();
    assert_eq!(chunk_ids, expected);
}

#[tokio::test]
async fn vector_retrieval_on_empty_store_returns_nothing() {
    let p = pipeline();

    let retrieval = p
        .engine
        .retrieve_with_trace("Where is the Eiffel Tower?", Some(RetrievalMode::Vector), 5, None)
        .await
        .unwrap();

    assert!(retrieval.results.is_empty());
    assert_eq!(retrieval.trace.empty_reason, Some(EmptyReason::NoDocumentsIndexed));
}

#[tokio::test]
async fn relationship_question_routes_to_graph() {
    let p = pipeline();
    p.indexer.ingest_parsed(cities(), "cities.md").await.unwrap();

    let retrieval = p
        .engine
        .retrieve_with_trace("What is the relationship between X and Y", None, 5, None)
        .await
        .unwrap();

    assert_eq!(retrieval.trace.mode, RetrievalMode::Graph);
    assert!(retrieval.trace.routed);
    assert!(!retrieval.results.is_empty());
    assert!(retrieval.results.len() <= 5);
}

#[tokio::test]
async fn deleted_document_is_no_longer_retrieved() {
    let p = pipeline();
    let report = p.indexer.ingest_parsed(cities(), "cities.md").await.unwrap();

    for mode in RetrievalMode::ALL {
        let results = p.engine.retrieve("Paris", Some(mode), 5, None).await.unwrap();
        assert!(!results.is_empty(), "{mode} found nothing");
    }

    assert!(p.indexer.delete_document(&report.doc_id).await.unwrap());

    for mode in RetrievalMode::ALL {
        let retrieval = p
            .engine
            .retrieve_with_trace("Paris", Some(mode), 5, None)
            .await
            .unwrap();
        assert!(retrieval.results.is_empty(), "{mode} still returns results");
        assert_eq!(retrieval.trace.empty_reason, Some(EmptyReason::NoDocumentsIndexed));
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{Graph, Query, Row};

use extract::{EntityChunkIndex, GraphEdge};

use crate::metadata_store::{
    ChunkRecord, DocumentDetail, DocumentRecord, MetadataStore, RelatedEntity, merge_neighbours,
};

/// Metadata store backed by Neo4j.
///
/// `(:Document)-[:HAS_CHUNK]->(:Chunk)` holds the records. Entities are
/// scoped per document as `(:Entity {name, doc_id})` with weighted
/// `[:CO_OCCURS]` edges stored source -> target in canonical order and
/// `[:MENTIONED_IN]` links to chunks. An empty `$doc_id` parameter means
/// "all documents".
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;
        Ok(Self::new(graph))
    }

    /// Initialize schema: create indexes
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE INDEX document_id_index IF NOT EXISTS FOR (d:Document) ON (d.id)",
            "CREATE INDEX chunk_id_index IF NOT EXISTS FOR (c:Chunk) ON (c.id)",
            "CREATE INDEX entity_name_index IF NOT EXISTS FOR (e:Entity) ON (e.name, e.doc_id)",
        ];
        for statement in statements {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to run schema statement: {statement}"))?;
        }
        tracing::info!("Neo4j indexes created");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.graph
            .run(neo4rs::query("RETURN 1"))
            .await
            .context("Neo4j ping failed")
    }

    async fn rows(&self, query: Query) -> Result<Vec<Row>> {
        let mut result = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn neighbours(
        &self,
        pattern: &str,
        entity: &str,
        doc_id: &str,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>> {
        let query = Query::new(format!(
            "{pattern}
             WHERE $doc_id = '' OR r.doc_id = $doc_id
             WITH other.name AS name, max(r.weight) AS weight
             RETURN name, weight
             ORDER BY weight DESC
             LIMIT $limit"
        ))
        .param("entity", entity.to_string())
        .param("doc_id", doc_id.to_string())
        .param("limit", limit as i64);

        Ok(self
            .rows(query)
            .await
            .context("Failed to fetch related entities")?
            .into_iter()
            .map(|row| RelatedEntity {
                entity: row.get::<String>("name").unwrap_or_default(),
                weight: row.get::<f64>("weight").unwrap_or(0.0),
            })
            .collect())
    }
}

fn document_from_row(row: &Row) -> DocumentRecord {
    let created_at: String = row.get("created_at").unwrap_or_default();
    DocumentRecord {
        id: row.get("id").unwrap_or_default(),
        filename: row.get("filename").unwrap_or_default(),
        format: row.get("format").unwrap_or_default(),
        strategy: row.get("strategy").unwrap_or_default(),
        chunk_count: row.get::<i64>("chunk_count").unwrap_or(0) as usize,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default(),
    }
}

const DOCUMENT_FIELDS: &str = "d.id AS id, d.filename AS filename, d.format AS format, \
     d.strategy AS strategy, d.chunk_count AS chunk_count, d.created_at AS created_at";

#[async_trait]
impl MetadataStore for Neo4jStore {
    async fn add_document(&self, document: &DocumentRecord, chunks: &[ChunkRecord]) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (d:Document {id: $id})
            SET d.filename = $filename,
                d.format = $format,
                d.strategy = $strategy,
                d.chunk_count = $chunk_count,
                d.created_at = $created_at
            "#
            .to_string(),
        )
        .param("id", document.id.clone())
        .param("filename", document.filename.clone())
        .param("format", document.format.clone())
        .param("strategy", document.strategy.clone())
        .param("chunk_count", document.chunk_count as i64)
        .param("created_at", document.created_at.to_rfc3339());

        self.graph
            .run(query)
            .await
            .context("Failed to store document")?;

        for chunk in chunks {
            let query = Query::new(
                r#"
                MATCH (d:Document {id: $doc_id})
                MERGE (c:Chunk {id: $id})
                SET c.doc_id = $doc_id,
                    c.chunk_index = $chunk_index,
                    c.text_preview = $text_preview,
                    c.metadata = $metadata
                MERGE (d)-[:HAS_CHUNK]->(c)
                "#
                .to_string(),
            )
            .param("doc_id", chunk.doc_id.clone())
            .param("id", chunk.id.clone())
            .param("chunk_index", chunk.chunk_index as i64)
            .param("text_preview", chunk.text_preview.clone())
            .param("metadata", serde_json::to_string(&chunk.metadata)?);

            self.graph
                .run(query)
                .await
                .context("Failed to store chunk")?;
        }

        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentDetail>> {
        let query = Query::new(format!(
            "MATCH (d:Document {{id: $id}}) RETURN {DOCUMENT_FIELDS}"
        ))
        .param("id", doc_id.to_string());

        let Some(row) = self.rows(query).await?.into_iter().next() else {
            return Ok(None);
        };
        let document = document_from_row(&row);

        let query = Query::new(
            r#"
            MATCH (:Document {id: $id})-[:HAS_CHUNK]->(c:Chunk)
            RETURN c.id AS id, c.chunk_index AS chunk_index,
                   c.text_preview AS text_preview, c.metadata AS metadata
            ORDER BY c.chunk_index
            "#
            .to_string(),
        )
        .param("id", doc_id.to_string());

        let chunks = self
            .rows(query)
            .await
            .context("Failed to fetch chunks")?
            .into_iter()
            .map(|row| {
                let metadata: String = row.get("metadata").unwrap_or_default();
                ChunkRecord {
                    id: row.get("id").unwrap_or_default(),
                    doc_id: doc_id.to_string(),
                    chunk_index: row.get::<i64>("chunk_index").unwrap_or(0) as usize,
                    text_preview: row.get("text_preview").unwrap_or_default(),
                    metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                }
            })
            .collect();

        Ok(Some(DocumentDetail { document, chunks }))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let query = Query::new(format!(
            "MATCH (d:Document) RETURN {DOCUMENT_FIELDS} ORDER BY d.created_at DESC"
        ));
        Ok(self
            .rows(query)
            .await
            .context("Failed to list documents")?
            .iter()
            .map(document_from_row)
            .collect())
    }

    async fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let exists = Query::new("MATCH (d:Document {id: $id}) RETURN count(d) AS count".to_string())
            .param("id", doc_id.to_string());
        let existed = self
            .rows(exists)
            .await?
            .first()
            .map(|row| row.get::<i64>("count").unwrap_or(0) > 0)
            .unwrap_or(false);

        for statement in [
            "MATCH (e:Entity {doc_id: $id}) DETACH DELETE e",
            "MATCH (c:Chunk {doc_id: $id}) DETACH DELETE c",
            "MATCH (d:Document {id: $id}) DETACH DELETE d",
        ] {
            self.graph
                .run(Query::new(statement.to_string()).param("id", doc_id.to_string()))
                .await
                .with_context(|| format!("Failed to delete document {doc_id}"))?;
        }

        Ok(existed)
    }

    async fn add_graph(
        &self,
        doc_id: &str,
        edges: &[GraphEdge],
        entity_chunks: &EntityChunkIndex,
    ) -> Result<()> {
        for edge in edges {
            let query = Query::new(
                r#"
                MERGE (a:Entity {name: $source, doc_id: $doc_id})
                MERGE (b:Entity {name: $target, doc_id: $doc_id})
                MERGE (a)-[r:CO_OCCURS {doc_id: $doc_id}]->(b)
                SET r.weight = $weight
                "#
                .to_string(),
            )
            .param("source", edge.source.clone())
            .param("target", edge.target.clone())
            .param("doc_id", doc_id.to_string())
            .param("weight", edge.weight);

            self.graph
                .run(query)
                .await
                .context("Failed to store co-occurrence edge")?;
        }

        for (entity, chunk_ids) in entity_chunks {
            let query = Query::new(
                r#"
                MERGE (e:Entity {name: $entity, doc_id: $doc_id})
                WITH e
                UNWIND $chunk_ids AS chunk_id
                MATCH (c:Chunk {id: chunk_id})
                MERGE (e)-[:MENTIONED_IN]->(c)
                "#
                .to_string(),
            )
            .param("entity", entity.clone())
            .param("doc_id", doc_id.to_string())
            .param("chunk_ids", chunk_ids.clone());

            self.graph
                .run(query)
                .await
                .context("Failed to store entity mentions")?;
        }

        Ok(())
    }

    async fn related_entities(
        &self,
        entity: &str,
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>> {
        let doc_id = doc_id.unwrap_or("");
        let outgoing = self
            .neighbours(
                "MATCH (:Entity {name: $entity})-[r:CO_OCCURS]->(other:Entity)",
                entity,
                doc_id,
                limit,
            )
            .await?;
        let incoming = self
            .neighbours(
                "MATCH (other:Entity)-[r:CO_OCCURS]->(:Entity {name: $entity})",
                entity,
                doc_id,
                limit,
            )
            .await?;
        Ok(merge_neighbours(entity, outgoing, incoming, limit))
    }

    async fn chunk_ids_for_entities(
        &self,
        entities: &[String],
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new(
            r#"
            MATCH (e:Entity)-[:MENTIONED_IN]->(c:Chunk)
            WHERE e.name IN $entities AND ($doc_id = '' OR e.doc_id = $doc_id)
            RETURN c.id AS id
            LIMIT $limit
            "#
            .to_string(),
        )
        .param("entities", entities.to_vec())
        .param("doc_id", doc_id.unwrap_or("").to_string())
        .param("limit", limit as i64);

        let mut seen = std::collections::HashSet::new();
        Ok(self
            .rows(query)
            .await
            .context("Failed to fetch chunk ids for entities")?
            .into_iter()
            .map(|row| row.get::<String>("id").unwrap_or_default())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect())
    }

    async fn document_count(&self) -> Result<usize> {
        let query = Query::new("MATCH (d:Document) RETURN count(d) AS count".to_string());
        Ok(self
            .rows(query)
            .await?
            .first()
            .map(|row| row.get::<i64>("count").unwrap_or(0) as usize)
            .unwrap_or(0))
    }
}

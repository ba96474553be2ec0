//! Typed persistence over Postgres
//!
//! One adapter owns the connection pool and exposes every query the rest of
//! the system issues. Two specialized indexes back retrieval: an HNSW index
//! over chunk embeddings under cosine distance, and a GIN index over a
//! generated tsvector column derived from chunk text. Deleting a document
//! cascades to its chunks, embeddings and jobs at the schema level.

use chrono::{DateTime, Duration, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunker::ChunkPiece;
use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::model::{
    Chunk, Conversation, Document, IngestionJob, JobStage, JobStatus, Message, SourceType, User,
};
use crate::retrieval::RetrievedChunk;
use crate::temporal::TimeInterval;

/// Storage adapter for the knowledge base
pub struct Storage {
    pool: PgPool,
    embedding_dimensions: usize,
}

impl Storage {
    /// Connect to the database
    pub async fn connect(config: &DatabaseConfig, embedding_dimensions: usize) -> Result<Self> {
        info!(url = %redact_url(&config.url), "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        Ok(Self {
            pool,
            embedding_dimensions,
        })
    }

    /// Create the schema and both retrieval indexes if they do not exist
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing database schema");

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                source_type TEXT NOT NULL,
                title TEXT NOT NULL,
                source_uri TEXT,
                original_filename TEXT,
                content_text TEXT,
                content_hash VARCHAR(64),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                ingested_at TIMESTAMPTZ,
                fetched_at TIMESTAMPTZ,
                metadata JSONB,
                status TEXT NOT NULL DEFAULT 'queued'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id UUID PRIMARY KEY,
                document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                user_id UUID NOT NULL REFERENCES users(id),
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER,
                char_start INTEGER,
                char_end INTEGER,
                page_start INTEGER,
                page_end INTEGER,
                time_start TIMESTAMPTZ,
                time_end TIMESTAMPTZ,
                source_offset_ms_start BIGINT,
                source_offset_ms_end BIGINT,
                metadata JSONB,
                tsv tsvector GENERATED ALWAYS AS (to_tsvector('english', text)) STORED,
                UNIQUE (document_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_embeddings (
                chunk_id UUID PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
                embedding vector({}) NOT NULL,
                embedding_model VARCHAR(100) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            self.embedding_dimensions
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_jobs (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'queued',
                stage TEXT NOT NULL DEFAULT 'received',
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                title VARCHAR(500),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id UUID PRIMARY KEY,
                conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role VARCHAR(20) NOT NULL,
                content TEXT NOT NULL,
                citations JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_documents_user_id ON documents(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_user_id ON chunks(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_time_start ON chunks(time_start)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_tsv ON chunks USING gin (tsv)",
            "CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_vector \
             ON chunk_embeddings USING hnsw (embedding vector_cosine_ops)",
            "CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_document_id \
             ON ingestion_jobs(document_id)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        info!("Database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- users ----------------------------------------------------------

    /// Find a user by email, creating one on first contact
    pub async fn get_or_create_user(&self, email: &str) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email) VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            id: row.get("id"),
            email: row.get("email"),
            created_at: row.get("created_at"),
        })
    }

    // ---- documents ------------------------------------------------------

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, user_id, source_type, title, source_uri, original_filename,
                 content_text, content_hash, created_at, fetched_at, metadata, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(doc.id)
        .bind(doc.user_id)
        .bind(doc.source_type.as_str())
        .bind(&doc.title)
        .bind(&doc.source_uri)
        .bind(&doc.original_filename)
        .bind(&doc.content_text)
        .bind(&doc.content_hash)
        .bind(doc.created_at)
        .bind(doc.fetched_at)
        .bind(&doc.metadata)
        .bind(doc.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, user_id: Uuid, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| document_from_row(&r)).transpose()
    }

    /// List documents newest-first with an optional source filter.
    /// Returns the page and the filtered total.
    pub async fn list_documents(
        &self,
        user_id: Uuid,
        source_type: Option<SourceType>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Document>, i64)> {
        let (count_sql, page_sql) = match source_type {
            Some(_) => (
                "SELECT COUNT(*) AS count FROM documents WHERE user_id = $1 AND source_type = $2",
                "SELECT * FROM documents WHERE user_id = $1 AND source_type = $2 \
                 ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            ),
            None => (
                "SELECT COUNT(*) AS count FROM documents WHERE user_id = $1",
                "SELECT * FROM documents WHERE user_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            ),
        };

        let mut count_query = sqlx::query(count_sql).bind(user_id);
        let mut page_query = sqlx::query(page_sql).bind(user_id);
        if let Some(st) = source_type {
            count_query = count_query.bind(st.as_str());
            page_query = page_query.bind(st.as_str());
        }

        let total: i64 = count_query.fetch_one(&self.pool).await?.get("count");
        let rows = page_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let documents = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((documents, total))
    }

    /// Backfill extracted content onto a document (audio transcripts land
    /// after the document record is created)
    pub async fn update_document_content(
        &self,
        id: Uuid,
        content_text: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET content_text = $1, metadata = $2 WHERE id = $3")
            .bind(content_text)
            .bind(metadata)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a document; chunks, embeddings and jobs cascade
    pub async fn delete_document(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- ingestion jobs -------------------------------------------------

    pub async fn insert_job(&self, job: &IngestionJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (id, user_id, document_id, status, stage)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.document_id)
        .bind(job.status.as_str())
        .bind(job.stage.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_job(&self, user_id: Uuid, id: Uuid) -> Result<Option<IngestionJob>> {
        let row = sqlx::query("SELECT * FROM ingestion_jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Persist a stage transition before the next stage's work begins
    pub async fn update_job_stage(&self, job_id: Uuid, stage: JobStage) -> Result<()> {
        debug!(%job_id, stage = stage.as_str(), "Job stage transition");

        sqlx::query("UPDATE ingestion_jobs SET stage = $1, updated_at = now() WHERE id = $2")
            .bind(stage.as_str())
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a terminal failure on both the job and its document
    pub async fn mark_failed(&self, document_id: Uuid, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_jobs SET status = 'failed', error = $1, updated_at = now() \
             WHERE id = $2",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE documents SET status = 'failed' WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a failure on the job only; the document stays as it was.
    /// Used when the final transactional write itself fails.
    pub async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_jobs SET status = 'failed', error = $1, updated_at = now() \
             WHERE id = $2",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- chunks and embeddings ------------------------------------------

    pub async fn get_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = $1 ORDER BY chunk_index")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    /// Commit a fully ingested document in one transaction: every chunk,
    /// every embedding, the document's terminal COMPLETED status and the
    /// job's INDEXED/COMPLETED state. Either all of it lands or none does.
    ///
    /// `base_time` anchors audio chunks: millisecond offsets become
    /// absolute `time_start`/`time_end` timestamps relative to it.
    pub async fn commit_chunks(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        job_id: Uuid,
        pieces: &[ChunkPiece],
        embeddings: Vec<Vec<f32>>,
        embedding_model: &str,
        base_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if pieces.len() != embeddings.len() {
            return Err(IngestError::StorageFailed(format!(
                "{} chunks but {} embeddings",
                pieces.len(),
                embeddings.len()
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;

        for (piece, embedding) in pieces.iter().zip(embeddings) {
            let chunk_id = Uuid::new_v4();

            let (time_start, time_end) = match (piece.time_start_ms, piece.time_end_ms, base_time)
            {
                (Some(start_ms), Some(end_ms), Some(base)) => (
                    Some(base + Duration::milliseconds(start_ms)),
                    Some(base + Duration::milliseconds(end_ms)),
                ),
                _ => (None, None),
            };

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, user_id, chunk_index, text, token_count,
                     char_start, char_end, page_start, page_end,
                     time_start, time_end, source_offset_ms_start, source_offset_ms_end)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(chunk_id)
            .bind(document_id)
            .bind(user_id)
            .bind(piece.chunk_index as i32)
            .bind(&piece.text)
            .bind(piece.token_count as i32)
            .bind(piece.char_start as i32)
            .bind(piece.char_end as i32)
            .bind(piece.page_start)
            .bind(piece.page_end)
            .bind(time_start)
            .bind(time_end)
            .bind(piece.time_start_ms)
            .bind(piece.time_end_ms)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_embeddings (chunk_id, embedding, embedding_model) \
                 VALUES ($1, $2, $3)",
            )
            .bind(chunk_id)
            .bind(Vector::from(embedding))
            .bind(embedding_model)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE documents SET status = 'completed', ingested_at = now() WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE ingestion_jobs SET stage = 'indexed', status = 'completed', \
             updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(%document_id, chunks = pieces.len(), "Committed chunks and embeddings");
        Ok(())
    }

    // ---- retrieval ------------------------------------------------------

    /// Nearest-neighbor search over chunk embeddings under cosine distance.
    ///
    /// Only chunks of COMPLETED documents owned by `user_id` are visible.
    /// With a temporal interval, a chunk matches when its time anchor
    /// overlaps the interval, or, lacking one, when its document's
    /// `created_at` falls inside it. Scores are `1 - cosine_distance`.
    pub async fn dense_search(
        &self,
        user_id: Uuid,
        query_embedding: &[f32],
        limit: i64,
        interval: Option<TimeInterval>,
    ) -> Result<Vec<(RetrievedChunk, f32)>> {
        let sql = format!(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.text, c.page_start, c.page_end,
                   c.time_start, c.time_end,
                   d.title, d.source_uri, d.source_type,
                   (ce.embedding <=> $1) AS distance
            FROM chunks c
            JOIN chunk_embeddings ce ON ce.chunk_id = c.id
            JOIN documents d ON d.id = c.document_id
            WHERE c.user_id = $2 AND d.status = 'completed'{}
            ORDER BY distance
            LIMIT {}
            "#,
            if interval.is_some() { TEMPORAL_FILTER } else { "" },
            if interval.is_some() { "$5" } else { "$3" },
        );

        let mut query = sqlx::query(&sql)
            .bind(Vector::from(query_embedding.to_vec()))
            .bind(user_id);
        if let Some((start, end)) = interval {
            query = query.bind(start).bind(end);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let distance: f64 = row.get("distance");
                let score = (1.0 - distance) as f32;
                Ok((retrieved_from_row(row, score)?, score))
            })
            .collect()
    }

    /// Full-text search over the generated tsvector column.
    ///
    /// Query tokens are joined with AND semantics; `ts_rank` supplies the
    /// relevance rank, scaled by 10 and clamped to 1.0. A residual the
    /// tsquery parser rejects yields an error the caller treats as an
    /// empty contribution.
    pub async fn sparse_search(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
        interval: Option<TimeInterval>,
    ) -> Result<Vec<(RetrievedChunk, f32)>> {
        let terms = tsquery_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.text, c.page_start, c.page_end,
                   c.time_start, c.time_end,
                   d.title, d.source_uri, d.source_type,
                   ts_rank(c.tsv, to_tsquery('english', $1)) AS rank
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.user_id = $2 AND d.status = 'completed'
              AND c.tsv @@ to_tsquery('english', $1){}
            ORDER BY rank DESC
            LIMIT {}
            "#,
            if interval.is_some() { TEMPORAL_FILTER } else { "" },
            if interval.is_some() { "$5" } else { "$3" },
        );

        let mut q = sqlx::query(&sql).bind(&terms).bind(user_id);
        if let Some((start, end)) = interval {
            q = q.bind(start).bind(end);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let rank: f32 = row.get("rank");
                let score = (rank * 10.0).min(1.0);
                Ok((retrieved_from_row(row, score)?, score))
            })
            .collect()
    }

    // ---- conversations --------------------------------------------------

    pub async fn create_conversation(
        &self,
        user_id: Uuid,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let row = sqlx::query(
            "INSERT INTO conversations (id, user_id, title) VALUES ($1, $2, $3) \
             RETURNING id, user_id, title, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation_from_row(&row))
    }

    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| conversation_from_row(&r)))
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    pub async fn delete_conversation(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: &str,
        content: &str,
        citations: Option<serde_json::Value>,
    ) -> Result<Message> {
        let row = sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, citations) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, conversation_id, role, content, citations, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(citations)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(message_from_row(&row))
    }
}

/// Temporal OR-filter shared by both search queries: time-anchored chunks
/// match on overlap, unanchored chunks match on their document's creation
/// time.
const TEMPORAL_FILTER: &str = r#"
              AND ((c.time_start IS NOT NULL AND c.time_start <= $4 AND c.time_end >= $3)
                OR (c.time_start IS NULL AND d.created_at >= $3 AND d.created_at <= $4))"#;

/// Join query tokens with tsquery AND semantics
fn tsquery_terms(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" & ")
}

fn redact_url(url: &str) -> String {
    match url.find('@') {
        Some(at) => {
            let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
            format!("{}***{}", &url[..scheme_end], &url[at..])
        }
        None => url.to_string(),
    }
}

fn parse_source_type(s: &str) -> Result<SourceType> {
    SourceType::parse(s)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown source_type: {}", s).into()).into())
}

fn parse_status(s: &str) -> Result<JobStatus> {
    JobStatus::parse(s)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown status: {}", s).into()).into())
}

fn parse_stage(s: &str) -> Result<JobStage> {
    JobStage::parse(s)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown stage: {}", s).into()).into())
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let source_type: String = row.get("source_type");
    let status: String = row.get("status");

    Ok(Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        source_type: parse_source_type(&source_type)?,
        title: row.get("title"),
        source_uri: row.get("source_uri"),
        original_filename: row.get("original_filename"),
        content_text: row.get("content_text"),
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
        ingested_at: row.get("ingested_at"),
        fetched_at: row.get("fetched_at"),
        metadata: row.get("metadata"),
        status: parse_status(&status)?,
    })
}

fn job_from_row(row: &PgRow) -> Result<IngestionJob> {
    let status: String = row.get("status");
    let stage: String = row.get("stage");

    Ok(IngestionJob {
        id: row.get("id"),
        user_id: row.get("user_id"),
        document_id: row.get("document_id"),
        status: parse_status(&status)?,
        stage: parse_stage(&stage)?,
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn chunk_from_row(row: &PgRow) -> Result<Chunk> {
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        user_id: row.get("user_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        token_count: row.get("token_count"),
        char_start: row.get("char_start"),
        char_end: row.get("char_end"),
        page_start: row.get("page_start"),
        page_end: row.get("page_end"),
        time_start: row.get("time_start"),
        time_end: row.get("time_end"),
        source_offset_ms_start: row.get("source_offset_ms_start"),
        source_offset_ms_end: row.get("source_offset_ms_end"),
        metadata: row.get("metadata"),
    })
}

fn retrieved_from_row(row: &PgRow, score: f32) -> Result<RetrievedChunk> {
    let source_type: String = row.get("source_type");

    Ok(RetrievedChunk {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        document_title: row.get("title"),
        source_uri: row.get("source_uri"),
        source_type: parse_source_type(&source_type)?,
        text: row.get("text"),
        score,
        page_start: row.get("page_start"),
        page_end: row.get("page_end"),
        time_start: row.get("time_start"),
        time_end: row.get("time_end"),
    })
}

fn conversation_from_row(row: &PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: row.get("role"),
        content: row.get("content"),
        citations: row.get("citations"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsquery_terms_joined_with_and() {
        assert_eq!(
            tsquery_terms("powerhouse of the cell"),
            "powerhouse & of & the & cell"
        );
        assert_eq!(tsquery_terms("  spaced   out  "), "spaced & out");
        assert_eq!(tsquery_terms(""), "");
        assert_eq!(tsquery_terms("   "), "");
    }

    #[test]
    fn test_redact_url_hides_credentials() {
        assert_eq!(
            redact_url("postgres://user:secret@db:5432/kb"),
            "postgres://***@db:5432/kb"
        );
        assert_eq!(redact_url("postgres://db/kb"), "postgres://db/kb");
    }
}

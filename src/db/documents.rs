//! Study document database operations

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::annotations::{
    find_stale_annotations, list_for_document, parse_timestamp, Document, DocumentSummary,
    DocumentUpdate, NewDocument,
};
use crate::error::{AppError, Result};

/// Outcome of a document edit
#[derive(Debug, Clone)]
pub struct DocumentEdit {
    pub document: Document,
    pub dropped_annotations: Vec<i64>,
}

/// Document repository
pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new document owned by `user_id`
    pub async fn create(&self, user_id: i64, data: &NewDocument) -> Result<Document> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO study_documents (user_id, title, content, description, is_public, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(&data.description)
        .bind(data.is_public)
        .bind(&now)
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Document {} vanished after insert", id)))
    }

    /// Get a document together with its annotations
    pub async fn get(&self, id: i64) -> Result<Option<Document>> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, user_id, title, content, description, is_public, created_at, updated_at
            FROM study_documents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let annotations = list_for_document(&mut *conn, id).await?;
        Ok(Some(row.into_document(annotations)?))
    }

    /// Owner of a document, without loading it
    pub async fn owner(&self, id: i64) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM study_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|r| r.0))
    }

    /// List documents owned by a user
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT d.id, d.user_id, d.title, d.description, d.is_public,
                   d.created_at, d.updated_at,
                   (SELECT COUNT(*) FROM study_annotations a WHERE a.document_id = d.id)
                       AS annotation_count
            FROM study_documents d
            WHERE d.user_id = ?
            ORDER BY d.created_at DESC, d.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// Apply an edit to a document
    ///
    /// When the content changes, every annotation is checked against the new
    /// text. Stale annotations reject the edit with
    /// [`AppError::StaleAnnotations`] unless `drop_stale_annotations` is set,
    /// in which case they are deleted in the same transaction.
    pub async fn update(&self, id: i64, data: &DocumentUpdate) -> Result<Option<DocumentEdit>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM study_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut dropped_annotations = Vec::new();
        if let Some(content) = &data.content {
            let annotations = list_for_document(&mut *tx, id).await?;
            let stale = find_stale_annotations(content, &annotations);

            if !stale.is_empty() {
                if !data.drop_stale_annotations {
                    return Err(AppError::StaleAnnotations(stale));
                }
                for s in &stale {
                    sqlx::query("DELETE FROM study_annotations WHERE id = ?")
                        .bind(s.annotation_id)
                        .execute(&mut *tx)
                        .await?;
                    dropped_annotations.push(s.annotation_id);
                }
                tracing::info!(
                    "Dropped {} stale annotations from document {}",
                    dropped_annotations.len(),
                    id
                );
            }
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE study_documents SET updated_at = ");
        query.push_bind(Utc::now().to_rfc3339());
        if let Some(title) = &data.title {
            query.push(", title = ").push_bind(title.clone());
        }
        if let Some(content) = &data.content {
            query.push(", content = ").push_bind(content.clone());
        }
        if let Some(description) = &data.description {
            query.push(", description = ").push_bind(description.clone());
        }
        if let Some(is_public) = data.is_public {
            query.push(", is_public = ").push_bind(is_public);
        }
        query.push(" WHERE id = ").push_bind(id);
        query.build().execute(&mut *tx).await?;

        tx.commit().await?;

        let document = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Document {} vanished after update", id)))?;

        Ok(Some(DocumentEdit {
            document,
            dropped_annotations,
        }))
    }

    /// Delete a document and its annotations
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM study_annotations WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM study_documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    description: Option<String>,
    is_public: bool,
    created_at: String,
    updated_at: Option<String>,
}

impl DocumentRow {
    fn into_document(self, annotations: Vec<crate::annotations::Annotation>) -> Result<Document> {
        Ok(Document {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            description: self.description,
            is_public: self.is_public,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_timestamp).transpose()?,
            annotations,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    is_public: bool,
    created_at: String,
    updated_at: Option<String>,
    annotation_count: i64,
}

impl SummaryRow {
    fn into_summary(self) -> Result<DocumentSummary> {
        Ok(DocumentSummary {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            is_public: self.is_public,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_timestamp).transpose()?,
            annotation_count: self.annotation_count,
        })
    }
}

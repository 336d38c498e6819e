//! SQLite storage for annotations
//!
//! Provides CRUD operations for annotations using SQLite.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::types::{Annotation, AnnotationUpdate, NewAnnotation};
use super::validation::{find_overlap, validate_span};
use crate::error::{AppError, Result};

/// Repository for annotation persistence
pub struct AnnotationRepository<'a> {
    pool: &'a SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, document_id, start_pos, end_pos, selected_text, annotation_title,
           linked_content, legal_reference, article_number, created_at, updated_at
    FROM study_annotations
"#;

impl<'a> AnnotationRepository<'a> {
    /// Create a new repository
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate and insert an annotation in one transaction
    ///
    /// The range must select `selected_text` in the document's current
    /// content and must not intersect any existing annotation. A transaction
    /// whose read snapshot went stale under a concurrent writer is retried
    /// once, so the retry validates against the committed rows.
    pub async fn create(&self, document_id: i64, data: &NewAnnotation) -> Result<Annotation> {
        match self.try_create(document_id, data).await {
            Err(AppError::Database(e)) if is_busy(&e) => {
                tracing::debug!("Annotation insert on document {} was busy, retrying", document_id);
                self.try_create(document_id, data).await
            }
            other => other,
        }
    }

    async fn try_create(&self, document_id: i64, data: &NewAnnotation) -> Result<Annotation> {
        let mut tx = self.pool.begin().await?;

        let content: Option<(String,)> =
            sqlx::query_as("SELECT content FROM study_documents WHERE id = ?")
                .bind(document_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (content,) = content
            .ok_or_else(|| AppError::NotFound(format!("Document {} not found", document_id)))?;

        validate_span(&content, data.start_pos, data.end_pos, &data.selected_text)?;
        let existing = list_for_document(&mut *tx, document_id).await?;
        find_overlap(&existing, data.start_pos, data.end_pos)?;

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO study_annotations (
                document_id, start_pos, end_pos, selected_text, annotation_title,
                linked_content, legal_reference, article_number, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(data.start_pos as i64)
        .bind(data.end_pos as i64)
        .bind(&data.selected_text)
        .bind(&data.annotation_title)
        .bind(&data.linked_content)
        .bind(&data.legal_reference)
        .bind(&data.article_number)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Annotation {} vanished after insert", id)))
    }

    /// Get an annotation by ID
    pub async fn get(&self, id: i64) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(AnnotationRow::into_annotation).transpose()
    }

    /// All annotations of a document, ordered by position
    pub async fn list_for_document(&self, document_id: i64) -> Result<Vec<Annotation>> {
        let mut conn = self.pool.acquire().await?;
        list_for_document(&mut *conn, document_id).await
    }

    /// Write the editable fields present in `data`
    ///
    /// Positions and `selected_text` are never touched. Absent fields keep
    /// their stored value; `Some(None)` clears an optional field.
    pub async fn update(&self, id: i64, data: &AnnotationUpdate) -> Result<Option<Annotation>> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE study_annotations SET updated_at = ");
        query.push_bind(Utc::now().to_rfc3339());

        if let Some(title) = &data.annotation_title {
            query.push(", annotation_title = ").push_bind(title.clone());
        }
        if let Some(content) = &data.linked_content {
            query.push(", linked_content = ").push_bind(content.clone());
        }
        if let Some(reference) = &data.legal_reference {
            query.push(", legal_reference = ").push_bind(reference.clone());
        }
        if let Some(article) = &data.article_number {
            query.push(", article_number = ").push_bind(article.clone());
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Delete an annotation
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM study_annotations WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// `SQLITE_BUSY` or one of its extended codes, such as `SQLITE_BUSY_SNAPSHOT` (517)
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == 5),
        _ => false,
    }
}

/// List a document's annotations on an existing connection or transaction
pub(crate) async fn list_for_document(
    conn: &mut SqliteConnection,
    document_id: i64,
) -> Result<Vec<Annotation>> {
    let rows = sqlx::query_as::<_, AnnotationRow>(&format!(
        "{} WHERE document_id = ? ORDER BY start_pos ASC, id ASC",
        SELECT_COLUMNS
    ))
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(AnnotationRow::into_annotation).collect()
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: i64,
    document_id: i64,
    start_pos: i64,
    end_pos: i64,
    selected_text: String,
    annotation_title: Option<String>,
    linked_content: String,
    legal_reference: Option<String>,
    article_number: Option<String>,
    created_at: String,
    updated_at: Option<String>,
}

impl AnnotationRow {
    fn into_annotation(self) -> Result<Annotation> {
        Ok(Annotation {
            id: self.id,
            document_id: self.document_id,
            start_pos: to_offset(self.start_pos)?,
            end_pos: to_offset(self.end_pos)?,
            selected_text: self.selected_text,
            annotation_title: self.annotation_title,
            linked_content: self.linked_content,
            legal_reference: self.legal_reference,
            article_number: self.article_number,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn to_offset(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| AppError::Internal(format!("Negative offset stored: {}", value)))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{NewDocument, SpanError};
    use crate::db::{create_memory_pool, create_pool, DocumentRepository};

    async fn setup() -> (SqlitePool, i64) {
        let pool = create_memory_pool().await.unwrap();
        let doc = DocumentRepository::new(&pool)
            .create(
                1,
                &NewDocument {
                    title: "Constitución".to_string(),
                    content: "El artículo 14 establece la igualdad.".to_string(),
                    description: None,
                    is_public: false,
                },
            )
            .await
            .unwrap();
        (pool, doc.id)
    }

    fn new_annotation(start: usize, end: usize, text: &str) -> NewAnnotation {
        NewAnnotation {
            start_pos: start,
            end_pos: end,
            selected_text: text.to_string(),
            annotation_title: None,
            linked_content: "Los españoles son iguales ante la ley".to_string(),
            legal_reference: Some("CE".to_string()),
            article_number: Some("14".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);

        let created = repo.create(doc_id, &new_annotation(3, 14, "artículo 14")).await.unwrap();
        let loaded = repo.get(created.id).await.unwrap().unwrap();

        assert_eq!(loaded.document_id, doc_id);
        assert_eq!(loaded.start_pos, 3);
        assert_eq!(loaded.end_pos, 14);
        assert_eq!(loaded.selected_text, "artículo 14");
        assert!(loaded.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_position() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);

        repo.create(doc_id, &new_annotation(28, 36, "igualdad")).await.unwrap();
        repo.create(doc_id, &new_annotation(3, 14, "artículo 14")).await.unwrap();

        let listed = repo.list_for_document(doc_id).await.unwrap();
        let starts: Vec<usize> = listed.iter().map(|a| a.start_pos).collect();
        assert_eq!(starts, vec![3, 28]);
    }

    #[tokio::test]
    async fn test_update_keeps_positions() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);
        let created = repo.create(doc_id, &new_annotation(3, 14, "artículo 14")).await.unwrap();

        let update = AnnotationUpdate {
            annotation_title: Some(Some("Igualdad".to_string())),
            legal_reference: Some(None),
            ..Default::default()
        };
        let updated = repo.update(created.id, &update).await.unwrap().unwrap();

        assert_eq!(updated.start_pos, 3);
        assert_eq!(updated.annotation_title.as_deref(), Some("Igualdad"));
        assert_eq!(updated.linked_content, created.linked_content);
        assert!(updated.legal_reference.is_none());
        assert_eq!(updated.article_number.as_deref(), Some("14"));
        assert!(updated.updated_at.is_some());

        assert!(repo.update(9999, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_leaves_missing_fields_alone() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);
        let mut data = new_annotation(3, 14, "artículo 14");
        data.annotation_title = Some("Igualdad".to_string());
        let created = repo.create(doc_id, &data).await.unwrap();

        let update = AnnotationUpdate {
            linked_content: Some("Sin discriminación".to_string()),
            ..Default::default()
        };
        let updated = repo.update(created.id, &update).await.unwrap().unwrap();

        assert_eq!(updated.linked_content, "Sin discriminación");
        assert_eq!(updated.annotation_title.as_deref(), Some("Igualdad"));
        assert_eq!(updated.legal_reference.as_deref(), Some("CE"));
        assert_eq!(updated.article_number.as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);
        let created = repo.create(doc_id, &new_annotation(3, 14, "artículo 14")).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get(created.id).await.unwrap().is_none());
        assert!(!repo.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_spans() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);

        let err = repo.create(doc_id, &new_annotation(3, 13, "artículo 14")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSpan(SpanError::TextMismatch { .. })));

        let err = repo.create(doc_id, &new_annotation(30, 99, "x")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSpan(SpanError::OutOfBounds { .. })));

        let err = repo.create(9999, &new_annotation(3, 14, "artículo 14")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert!(repo.list_for_document(doc_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_overlap() {
        let (pool, doc_id) = setup().await;
        let repo = AnnotationRepository::new(&pool);
        let first = repo.create(doc_id, &new_annotation(3, 14, "artículo 14")).await.unwrap();

        match repo.create(doc_id, &new_annotation(12, 24, "14 establece")).await {
            Err(AppError::Overlap(e)) => assert_eq!(e.existing_id, first.id),
            other => panic!("unexpected {:?}", other.map(|a| a.id)),
        }

        // Touching ranges are fine
        repo.create(doc_id, &new_annotation(14, 24, " establece")).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_creates_conflict() {
        let path = std::env::temp_dir().join(format!("annotations-{}.db", uuid::Uuid::new_v4()));
        let pool = create_pool(&format!("sqlite:{}", path.display())).await.unwrap();
        let doc = DocumentRepository::new(&pool)
            .create(
                1,
                &NewDocument {
                    title: "Constitución".to_string(),
                    content: "El artículo 14 establece la igualdad.".to_string(),
                    description: None,
                    is_public: false,
                },
            )
            .await
            .unwrap();

        let repo = AnnotationRepository::new(&pool);
        let a = new_annotation(3, 14, "artículo 14");
        let b = new_annotation(12, 24, "14 establece");
        let c = new_annotation(12, 14, "14");
        let results = tokio::join!(
            repo.create(doc.id, &a),
            repo.create(doc.id, &b),
            repo.create(doc.id, &c),
        );

        let results = [results.0, results.1, results.2];
        let created = results.iter().filter(|r| r.is_ok()).count();
        let overlaps = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Overlap(_))))
            .count();
        assert_eq!(created, 1);
        assert_eq!(overlaps, 2);
        assert_eq!(repo.list_for_document(doc.id).await.unwrap().len(), 1);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}

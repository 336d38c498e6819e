//! Study document API routes

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::annotations::{Document, DocumentSummary, DocumentUpdate, DocumentUpdateResponse, NewDocument};
use crate::auth::AuthUser;
use crate::db::DocumentRepository;
use crate::error::{AppError, Result};
use crate::export::{build_interactive_html, content_disposition};
use crate::state::AppState;

/// Create the documents router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(create_document))
        .route(
            "/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/documents/:id/export/html", get(export_html))
        .route("/documents/:id/export/pdf", get(export_pdf))
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Document {} not found", id))
}

/// Load a document the caller may read: owned or public
async fn readable_document(state: &AppState, user: AuthUser, id: i64) -> Result<Document> {
    let document = DocumentRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    if document.user_id != user.user_id && !document.is_public {
        return Err(AppError::Forbidden(format!("No access to document {}", id)));
    }
    Ok(document)
}

/// Fail unless the caller owns the document
pub(crate) async fn ensure_owner(state: &AppState, user: AuthUser, id: i64) -> Result<()> {
    let owner = DocumentRepository::new(state.db())
        .owner(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    if owner != user.user_id {
        return Err(AppError::Forbidden(format!("No access to document {}", id)));
    }
    Ok(())
}

/// List the caller's documents
async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DocumentSummary>>> {
    let documents = DocumentRepository::new(state.db())
        .list_for_user(user.user_id)
        .await?;
    Ok(Json(documents))
}

/// Create a document
async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<NewDocument>,
) -> Result<(StatusCode, Json<Document>)> {
    if data.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".to_string()));
    }

    let document = DocumentRepository::new(state.db())
        .create(user.user_id, &data)
        .await?;

    tracing::info!("User {} created document {}", user.user_id, document.id);
    Ok((StatusCode::CREATED, Json(document)))
}

/// Get a document with its annotations
async fn get_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Document>> {
    Ok(Json(readable_document(&state, user, id).await?))
}

/// Edit a document
///
/// Content edits that move annotated text are refused with 409 unless
/// `drop_stale_annotations` is set.
async fn update_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(data): Json<DocumentUpdate>,
) -> Result<Json<DocumentUpdateResponse>> {
    ensure_owner(&state, user, id).await?;

    if data.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("title cannot be empty".to_string()));
    }

    let edit = DocumentRepository::new(state.db())
        .update(id, &data)
        .await?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(DocumentUpdateResponse {
        document: edit.document,
        dropped_annotations: edit.dropped_annotations,
    }))
}

/// Delete a document and its annotations
async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    ensure_owner(&state, user, id).await?;

    if !DocumentRepository::new(state.db()).delete(id).await? {
        return Err(not_found(id));
    }

    tracing::info!("User {} deleted document {}", user.user_id, id);
    Ok(StatusCode::NO_CONTENT)
}

/// Download the interactive HTML export
async fn export_html(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let document = readable_document(&state, user, id).await?;
    let html = build_interactive_html(&document)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&document.title, "html")),
        ],
        html,
    ))
}

/// PDF export is not offered
async fn export_pdf(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    readable_document(&state, user, id).await?;
    Err(AppError::NotImplemented(
        "PDF export is not available; use the HTML export and print it".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, TokenRepository};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let pool = create_memory_pool().await.unwrap();
        let app = router().with_state(AppState::new(pool));

        let response = app
            .oneshot(Request::builder().uri("/documents").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pdf_export_not_implemented() {
        let pool = create_memory_pool().await.unwrap();
        let token = TokenRepository::new(&pool).issue(1).await.unwrap();
        let doc = DocumentRepository::new(&pool)
            .create(
                1,
                &NewDocument {
                    title: "CE".to_string(),
                    content: "texto".to_string(),
                    description: None,
                    is_public: false,
                },
            )
            .await
            .unwrap();
        let app = router().with_state(AppState::new(pool));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/documents/{}/export/pdf", doc.id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}

//! Annotation API endpoints
//!
//! Annotations are created under a document and edited or deleted by ID.
//! Only the document owner may change them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};

use super::documents::ensure_owner;
use crate::annotations::{Annotation, AnnotationRepository, AnnotationUpdate, NewAnnotation};
use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the annotations router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents/:id/annotations", post(create_annotation))
        .route(
            "/annotations/:id",
            put(update_annotation).delete(delete_annotation),
        )
}

/// Load an annotation whose document the caller owns
async fn owned_annotation(state: &AppState, user: AuthUser, id: i64) -> Result<Annotation> {
    let annotation = AnnotationRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Annotation {} not found", id)))?;

    ensure_owner(state, user, annotation.document_id).await?;
    Ok(annotation)
}

/// Create an annotation
///
/// The range is checked against the current content and the existing
/// annotations: 400 on an invalid range or text mismatch, 409 on overlap.
async fn create_annotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i64>,
    Json(data): Json<NewAnnotation>,
) -> Result<(StatusCode, Json<Annotation>)> {
    ensure_owner(&state, user, document_id).await?;

    if data.linked_content.trim().is_empty() {
        return Err(AppError::BadRequest("linked_content is required".to_string()));
    }

    let annotation = AnnotationRepository::new(state.db())
        .create(document_id, &data)
        .await
        .map_err(|e| {
            if let AppError::Overlap(overlap) = &e {
                tracing::debug!("Refused overlapping annotation: {}", overlap);
            }
            e
        })?;

    tracing::info!(
        "Created annotation {} on document {} at [{}, {})",
        annotation.id,
        document_id,
        annotation.start_pos,
        annotation.end_pos
    );
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// Update the editable fields of an annotation
async fn update_annotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(data): Json<AnnotationUpdate>,
) -> Result<Json<Annotation>> {
    owned_annotation(&state, user, id).await?;

    if data.linked_content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(AppError::BadRequest("linked_content cannot be empty".to_string()));
    }

    let annotation = AnnotationRepository::new(state.db())
        .update(id, &data)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Annotation {} not found", id)))?;

    Ok(Json(annotation))
}

/// Delete an annotation
async fn delete_annotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let annotation = owned_annotation(&state, user, id).await?;

    AnnotationRepository::new(state.db()).delete(id).await?;

    tracing::info!(
        "Deleted annotation {} from document {}",
        id,
        annotation.document_id
    );
    Ok(StatusCode::NO_CONTENT)
}

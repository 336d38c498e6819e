//! Viewer driving a real server over HTTP

use std::sync::Arc;

use opositapp_docs::annotations::{NewAnnotation, NewDocument};
use opositapp_docs::client::{ClientError, DocumentStore, ExportFormat, HttpDocumentStore};
use opositapp_docs::db::{create_memory_pool, TokenRepository};
use opositapp_docs::overlay::{PlatformSelection, Segment, TextPoint};
use opositapp_docs::routes;
use opositapp_docs::state::AppState;
use opositapp_docs::viewer::{
    AnnotationDraft, DocumentState, KeyValueStore, MemoryKeyValueStore, ModeEvent, StudyDocViewer,
    ViewerError, WatchFullscreen,
};

const CONTENT: &str = "El artículo 14 establece la igualdad.";

struct Running {
    base_url: String,
    token: String,
}

async fn spawn_server() -> Running {
    let pool = create_memory_pool().await.unwrap();
    let token = TokenRepository::new(&pool).issue(1).await.unwrap();
    let app = routes::app(AppState::new(pool));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Running {
        base_url: format!("http://{}", addr),
        token,
    }
}

async fn mount(store: HttpDocumentStore, document_id: i64) -> StudyDocViewer<HttpDocumentStore> {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    StudyDocViewer::mount(store, document_id, kv, Arc::new(WatchFullscreen::new())).await
}

fn select(start: usize, end: usize) -> PlatformSelection {
    PlatformSelection {
        anchor: TextPoint::new(0, start),
        focus: TextPoint::new(0, end),
        rect: None,
    }
}

async fn seed_document(store: &HttpDocumentStore) -> i64 {
    store
        .create_document(&NewDocument {
            title: "Constitución Española".to_string(),
            content: CONTENT.to_string(),
            description: None,
            is_public: false,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn render_delete_and_refetch() {
    let server = spawn_server().await;
    let store = HttpDocumentStore::new(&server.base_url, &server.token);
    let doc_id = seed_document(&store).await;

    let annotation = store
        .create_annotation(
            doc_id,
            &NewAnnotation {
                start_pos: 3,
                end_pos: 14,
                selected_text: "artículo 14".to_string(),
                annotation_title: None,
                linked_content: "Igualdad ante la ley".to_string(),
                legal_reference: None,
                article_number: Some("14".to_string()),
            },
        )
        .await
        .unwrap();

    let mut viewer = mount(store.clone(), doc_id).await;
    let segments = viewer.segments();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].text(), "El ");
    assert_eq!(segments[1].text(), "artículo 14");
    assert_eq!(segments[1].annotation_id(), Some(annotation.id));
    assert_eq!(segments[2].text(), " establece la igualdad.");

    viewer.delete_annotation(annotation.id).await.unwrap();
    assert_eq!(viewer.segments(), vec![Segment::Plain { text: CONTENT }]);
}

#[tokio::test]
async fn create_from_selection_and_edit() {
    let server = spawn_server().await;
    let store = HttpDocumentStore::new(&server.base_url, &server.token);
    let doc_id = seed_document(&store).await;
    let mut viewer = mount(store.clone(), doc_id).await;

    viewer.handle_selection(&select(3, 14)).unwrap();
    viewer.open_annotation_form().unwrap();
    let created = viewer
        .create_annotation(&AnnotationDraft {
            title: "Igualdad".to_string(),
            linked_content: "Los españoles son iguales ante la ley.".to_string(),
            article_number: "14".to_string(),
            legal_reference: String::new(),
        })
        .await
        .unwrap();

    // The viewer's list is exactly what a fresh fetch returns
    let fresh = store.fetch_document(doc_id).await.unwrap();
    assert_eq!(viewer.annotations(), fresh.annotations.as_slice());
    assert_eq!(fresh.annotations[0].id, created.id);

    viewer.select_annotation(created.id).unwrap();
    let mut form = viewer.start_editing().unwrap();
    form.linked_content = "Sin discriminación por nacimiento.".to_string();
    let updated = viewer.save_annotation(&form).await.unwrap();
    assert_eq!(viewer.selected_annotation(), Some(&updated));
    assert_eq!(viewer.annotations()[0].linked_content, "Sin discriminación por nacimiento.");

    // Overlap is caught before the request is sent
    viewer.handle_selection(&select(12, 24)).unwrap();
    let err = viewer
        .create_annotation(&AnnotationDraft {
            linked_content: "nota".to_string(),
            ..AnnotationDraft::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ViewerError::Overlap(_)));
    assert!(viewer.pending_selection().is_some());
}

#[tokio::test]
async fn store_errors_are_typed() {
    let server = spawn_server().await;
    let store = HttpDocumentStore::new(&server.base_url, &server.token);
    let doc_id = seed_document(&store).await;

    let mismatch = NewAnnotation {
        start_pos: 3,
        end_pos: 13,
        selected_text: "artículo 14".to_string(),
        annotation_title: None,
        linked_content: "nota".to_string(),
        legal_reference: None,
        article_number: None,
    };
    match store.create_annotation(doc_id, &mismatch).await {
        Err(ClientError::Rejected { status, .. }) => assert_eq!(status, 400),
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        store.fetch_document(9999).await,
        Err(ClientError::NotFound(_))
    ));

    let html = store.export(doc_id, ExportFormat::Html).await.unwrap();
    assert!(String::from_utf8(html).unwrap().contains("Constitución Española"));
    assert!(matches!(
        store.export(doc_id, ExportFormat::Pdf).await,
        Err(ClientError::Rejected { status: 501, .. })
    ));
}

#[tokio::test]
async fn unauthenticated_viewer_asks_for_login() {
    let server = spawn_server().await;
    let store = HttpDocumentStore::new(&server.base_url, "expired");

    let mut viewer = mount(store, 1).await;
    assert_eq!(viewer.state(), &DocumentState::AuthRequired);
    assert!(viewer.segments().is_empty());

    // Mode changes still work without a document
    viewer.dispatch(ModeEvent::EnterReading).await;
    assert!(viewer.handle_selection(&select(3, 14)).is_none());
}

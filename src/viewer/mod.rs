//! Study document viewer
//!
//! Owns everything one mounted document view needs: the fetched document,
//! the interaction mode, reading preferences, the pending text selection and
//! the annotation open in the side panel. Every successful mutation is
//! followed by a full refetch; the annotation list is only ever replaced
//! wholesale with what the store returns.

mod mode;
mod preferences;

pub use mode::{
    transition, FullscreenAction, FullscreenSurface, InteractionMode, ModeEvent, Transition,
    WatchFullscreen,
};
pub use preferences::{
    KeyValueStore, MemoryKeyValueStore, PreferenceError, PreferenceStore, SqliteKeyValueStore,
    ViewerPreferences, FONT_SIZES, LINE_HEIGHTS, PANEL_SIZE_RANGE,
};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::annotations::{
    find_overlap, Annotation, AnnotationUpdate, Document, NewAnnotation, OverlapError,
};
use crate::client::{ClientError, DocumentStore, ExportFormat};
use crate::overlay::{
    map_selection, render_segments, table_of_contents, PendingSelection, PlatformSelection,
    RenderOptions, RenderedContainer, Segment, TocEntry,
};

/// Errors surfaced to the viewer's host
#[derive(Error, Debug)]
pub enum ViewerError {
    /// The store wants credentials; the host should send the user to login
    #[error("Authentication required")]
    AuthRequired,

    #[error("Failed to load document: {0}")]
    Fetch(#[source] ClientError),

    #[error("Failed to {action}: {source}")]
    Mutation {
        action: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("Annotation overlaps an existing one: {0}")]
    Overlap(#[from] OverlapError),

    #[error("Document is not loaded")]
    NotLoaded,

    #[error("No text selected")]
    NoPendingSelection,

    #[error("No annotation is open")]
    NothingSelected,

    #[error("Linked content is required")]
    MissingLinkedContent,

    #[error("Failed to save preferences: {0}")]
    Preferences(#[from] PreferenceError),
}

impl ViewerError {
    fn mutation(action: &'static str, source: ClientError) -> Self {
        match source {
            ClientError::AuthRequired => ViewerError::AuthRequired,
            source => ViewerError::Mutation { action, source },
        }
    }
}

/// What the document area shows
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Loading,
    Ready(Document),
    /// Fetch failed; annotation interactions are blocked
    Failed(String),
    AuthRequired,
}

/// Form fields of the create/edit annotation forms. Empty optional fields
/// are sent as null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationDraft {
    pub title: String,
    pub linked_content: String,
    pub article_number: String,
    pub legal_reference: String,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl AnnotationDraft {
    /// Prefill the edit form
    pub fn from_annotation(annotation: &Annotation) -> Self {
        Self {
            title: annotation.annotation_title.clone().unwrap_or_default(),
            linked_content: annotation.linked_content.clone(),
            article_number: annotation.article_number.clone().unwrap_or_default(),
            legal_reference: annotation.legal_reference.clone().unwrap_or_default(),
        }
    }

    fn to_new(&self, selection: &PendingSelection) -> NewAnnotation {
        NewAnnotation {
            start_pos: selection.start,
            end_pos: selection.end,
            selected_text: selection.text.clone(),
            annotation_title: non_empty(&self.title),
            linked_content: self.linked_content.clone(),
            legal_reference: non_empty(&self.legal_reference),
            article_number: non_empty(&self.article_number),
        }
    }

    /// Full-field update
    fn to_update(&self) -> AnnotationUpdate {
        AnnotationUpdate {
            annotation_title: Some(non_empty(&self.title)),
            linked_content: Some(self.linked_content.clone()),
            legal_reference: Some(non_empty(&self.legal_reference)),
            article_number: Some(non_empty(&self.article_number)),
        }
    }
}

/// A mounted study document view
pub struct StudyDocViewer<S> {
    store: S,
    document_id: i64,
    state: DocumentState,
    preferences: ViewerPreferences,
    preference_store: PreferenceStore,
    fullscreen: Arc<dyn FullscreenSurface>,
    fullscreen_rx: watch::Receiver<bool>,
    pending: Option<PendingSelection>,
    form_open: bool,
    selected: Option<Annotation>,
    editing: bool,
}

impl<S: DocumentStore> StudyDocViewer<S> {
    /// Mount a viewer: load preferences, subscribe to the full-screen
    /// surface and fetch the document. A failed fetch leaves the viewer in
    /// [`DocumentState::Failed`] or [`DocumentState::AuthRequired`].
    pub async fn mount(
        store: S,
        document_id: i64,
        kv: Arc<dyn KeyValueStore>,
        fullscreen: Arc<dyn FullscreenSurface>,
    ) -> Self {
        let preference_store = PreferenceStore::new(kv, document_id);
        let preferences = match preference_store.load().await {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("Using default preferences for document {}: {}", document_id, e);
                ViewerPreferences::default()
            }
        };
        let fullscreen_rx = fullscreen.subscribe();

        let mut viewer = Self {
            store,
            document_id,
            state: DocumentState::Loading,
            preferences,
            preference_store,
            fullscreen,
            fullscreen_rx,
            pending: None,
            form_open: false,
            selected: None,
            editing: false,
        };

        if let Err(e) = viewer.refresh().await {
            tracing::warn!("Document {} unavailable: {}", document_id, e);
        }

        viewer
    }

    /// Refetch the document and replace local state wholesale
    pub async fn refresh(&mut self) -> Result<(), ViewerError> {
        match self.store.fetch_document(self.document_id).await {
            Ok(document) => {
                tracing::debug!(
                    "Loaded document {} with {} annotations",
                    document.id,
                    document.annotations.len()
                );
                self.state = DocumentState::Ready(document);
                Ok(())
            }
            Err(ClientError::AuthRequired) => {
                self.state = DocumentState::AuthRequired;
                Err(ViewerError::AuthRequired)
            }
            Err(e) => {
                self.state = DocumentState::Failed(e.to_string());
                Err(ViewerError::Fetch(e))
            }
        }
    }

    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn document(&self) -> Option<&Document> {
        match &self.state {
            DocumentState::Ready(document) => Some(document),
            _ => None,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.document().map(|d| d.annotations.as_slice()).unwrap_or(&[])
    }

    pub fn mode(&self) -> InteractionMode {
        self.preferences.view_mode
    }

    pub fn preferences(&self) -> &ViewerPreferences {
        &self.preferences
    }

    pub fn pending_selection(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    pub fn is_form_open(&self) -> bool {
        self.form_open
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.selected.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            mode: self.mode(),
            selected_annotation: self.selected.as_ref().map(|a| a.id),
        }
    }

    /// Current overlay of the document, empty unless loaded
    pub fn segments(&self) -> Vec<Segment<'_>> {
        match self.document() {
            Some(doc) => render_segments(&doc.content, &doc.annotations, self.render_options()),
            None => Vec::new(),
        }
    }

    pub fn container(&self) -> RenderedContainer {
        RenderedContainer::from_segments(&self.segments())
    }

    /// Side panel index, empty when the panel is hidden
    pub fn table_of_contents(&self) -> Vec<TocEntry<'_>> {
        if !self.mode().side_panel_visible() {
            return Vec::new();
        }
        table_of_contents(self.annotations())
    }

    /// Handle a finished text selection.
    ///
    /// A no-op outside study mode or while the document is not loaded. A
    /// selection too short to annotate keeps the previous pending selection.
    pub fn handle_selection(&mut self, selection: &PlatformSelection) -> Option<&PendingSelection> {
        if !self.mode().selection_enabled() || self.document().is_none() {
            return None;
        }

        let pending = map_selection(&self.container(), selection)?;
        tracing::debug!(
            "Pending selection [{}, {}) {:?}",
            pending.start,
            pending.end,
            pending.text
        );
        self.pending = Some(pending);
        self.pending.as_ref()
    }

    /// Drop the pending selection and close the creation form
    pub fn clear_selection(&mut self) {
        self.pending = None;
        self.form_open = false;
    }

    pub fn open_annotation_form(&mut self) -> Result<(), ViewerError> {
        if self.pending.is_none() {
            return Err(ViewerError::NoPendingSelection);
        }
        self.form_open = true;
        Ok(())
    }

    /// Create an annotation over the pending selection.
    ///
    /// Checks run locally before the store is contacted. On failure the
    /// selection and form stay as they are.
    pub async fn create_annotation(&mut self, draft: &AnnotationDraft) -> Result<Annotation, ViewerError> {
        let document = self.document().ok_or(ViewerError::NotLoaded)?;
        let pending = self.pending.as_ref().ok_or(ViewerError::NoPendingSelection)?;
        if draft.linked_content.trim().is_empty() {
            return Err(ViewerError::MissingLinkedContent);
        }
        find_overlap(&document.annotations, pending.start, pending.end)?;

        let request = draft.to_new(pending);
        let created = self
            .store
            .create_annotation(self.document_id, &request)
            .await
            .map_err(|e| ViewerError::mutation("create annotation", e))?;

        tracing::info!(
            "Created annotation {} on document {} at [{}, {})",
            created.id,
            self.document_id,
            created.start_pos,
            created.end_pos
        );

        self.clear_selection();
        self.refresh().await?;
        Ok(created)
    }

    /// Open an annotation in the side panel. Only study mode reacts to clicks.
    pub fn select_annotation(&mut self, annotation_id: i64) -> Option<&Annotation> {
        if !self.mode().annotations_clickable() {
            return None;
        }

        let annotation = self
            .annotations()
            .iter()
            .find(|a| a.id == annotation_id)
            .cloned()?;
        self.selected = Some(annotation);
        self.editing = false;
        self.selected.as_ref()
    }

    pub fn close_annotation(&mut self) {
        self.selected = None;
        self.editing = false;
    }

    /// Enter edit mode for the open annotation, returning the prefilled form
    pub fn start_editing(&mut self) -> Result<AnnotationDraft, ViewerError> {
        let annotation = self.selected.as_ref().ok_or(ViewerError::NothingSelected)?;
        let draft = AnnotationDraft::from_annotation(annotation);
        self.editing = true;
        Ok(draft)
    }

    pub fn cancel_editing(&mut self) {
        self.editing = false;
    }

    /// Save edits to the open annotation
    pub async fn save_annotation(&mut self, draft: &AnnotationDraft) -> Result<Annotation, ViewerError> {
        let annotation_id = self
            .selected
            .as_ref()
            .map(|a| a.id)
            .ok_or(ViewerError::NothingSelected)?;
        if draft.linked_content.trim().is_empty() {
            return Err(ViewerError::MissingLinkedContent);
        }

        let updated = self
            .store
            .update_annotation(annotation_id, &draft.to_update())
            .await
            .map_err(|e| ViewerError::mutation("update annotation", e))?;

        tracing::info!("Updated annotation {}", annotation_id);

        self.selected = Some(updated.clone());
        self.editing = false;
        self.refresh().await?;
        Ok(updated)
    }

    /// Delete an annotation. The caller has already confirmed.
    pub async fn delete_annotation(&mut self, annotation_id: i64) -> Result<(), ViewerError> {
        self.store
            .delete_annotation(annotation_id)
            .await
            .map_err(|e| ViewerError::mutation("delete annotation", e))?;

        tracing::info!("Deleted annotation {}", annotation_id);

        if self.selected.as_ref().is_some_and(|a| a.id == annotation_id) {
            self.close_annotation();
        }
        self.refresh().await
    }

    /// Feed a mode event to the state machine and apply its effects
    pub async fn dispatch(&mut self, event: ModeEvent) -> InteractionMode {
        let t = transition(self.mode(), event, self.fullscreen.is_active());

        match t.action {
            FullscreenAction::Request => self.fullscreen.request(),
            FullscreenAction::Exit => self.fullscreen.exit(),
            FullscreenAction::None => {}
        }

        if t.changed() {
            tracing::debug!("Viewer mode {:?} -> {:?} on {:?}", t.from, t.to, event);
            self.clear_selection();
            self.preferences.view_mode = t.to;
            if let Err(e) = self.preference_store.save(&self.preferences).await {
                tracing::warn!("Failed to persist view mode: {}", e);
            }
        }

        t.to
    }

    async fn apply_fullscreen(&mut self, active: bool) -> bool {
        if active || self.mode() != InteractionMode::Immersive {
            return false;
        }
        self.dispatch(ModeEvent::FullscreenExited).await;
        true
    }

    /// Apply a full-screen change reported since the last check. Returns
    /// whether the mode changed.
    pub async fn poll_fullscreen(&mut self) -> bool {
        if !self.fullscreen_rx.has_changed().unwrap_or(false) {
            return false;
        }
        let active = *self.fullscreen_rx.borrow_and_update();
        self.apply_fullscreen(active).await
    }

    /// Wait for the next full-screen change and apply it. Returns `None`
    /// once the surface is gone.
    pub async fn next_fullscreen_change(&mut self) -> Option<InteractionMode> {
        self.fullscreen_rx.changed().await.ok()?;
        let active = *self.fullscreen_rx.borrow_and_update();
        self.apply_fullscreen(active).await;
        Some(self.mode())
    }

    async fn update_preferences(
        &mut self,
        change: impl FnOnce(&mut ViewerPreferences),
    ) -> Result<(), ViewerError> {
        let before = self.preferences;
        change(&mut self.preferences);
        if self.preferences != before {
            self.preference_store.save(&self.preferences).await?;
        }
        Ok(())
    }

    pub async fn increase_font_size(&mut self) -> Result<(), ViewerError> {
        self.update_preferences(|p| {
            p.increase_font_size();
        })
        .await
    }

    pub async fn decrease_font_size(&mut self) -> Result<(), ViewerError> {
        self.update_preferences(|p| {
            p.decrease_font_size();
        })
        .await
    }

    pub async fn set_line_height(&mut self, height: f32) -> Result<(), ViewerError> {
        self.update_preferences(|p| {
            p.set_line_height(height);
        })
        .await
    }

    pub async fn set_panel_size(&mut self, size: u32) -> Result<(), ViewerError> {
        self.update_preferences(|p| p.set_panel_size(size)).await
    }

    /// Restore default reading settings, keeping the current mode
    pub async fn reset_preferences(&mut self) -> Result<(), ViewerError> {
        self.update_preferences(|p| {
            *p = ViewerPreferences {
                view_mode: p.view_mode,
                ..ViewerPreferences::default()
            }
        })
        .await
    }

    pub fn export_url(&self, format: ExportFormat) -> String {
        self.store.export_url(self.document_id, format)
    }

    /// Tear down the viewer, unsubscribing from the full-screen surface.
    /// Preferences were already saved on every change.
    pub fn close(self) {
        tracing::debug!("Closing viewer for document {}", self.document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{segments_text, Rect, TextPoint};
    use crate::text::slice_chars;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    const CONTENT: &str = "El artículo 14 establece la igualdad.";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Fetch,
        Create,
        Update(i64),
        Delete(i64),
    }

    struct MockState {
        document: Document,
        next_id: i64,
        calls: Vec<Call>,
        fail_mutations: bool,
        fail_fetch: Option<u16>,
    }

    /// In-memory store recording every call
    #[derive(Clone)]
    struct MockStore {
        inner: Arc<Mutex<MockState>>,
    }

    impl MockStore {
        fn new(annotations: Vec<Annotation>) -> Self {
            let document = Document {
                id: 1,
                user_id: 1,
                title: "Constitución".to_string(),
                content: CONTENT.to_string(),
                description: None,
                is_public: false,
                created_at: Utc::now(),
                updated_at: None,
                annotations,
            };
            Self {
                inner: Arc::new(Mutex::new(MockState {
                    document,
                    next_id: 100,
                    calls: Vec::new(),
                    fail_mutations: false,
                    fail_fetch: None,
                })),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        fn stored_annotations(&self) -> Vec<Annotation> {
            self.inner.lock().unwrap().document.annotations.clone()
        }

        fn fail_mutations(&self, fail: bool) {
            self.inner.lock().unwrap().fail_mutations = fail;
        }

        fn fail_fetch(&self, status: Option<u16>) {
            self.inner.lock().unwrap().fail_fetch = status;
        }
    }

    fn rejected() -> ClientError {
        ClientError::Rejected {
            status: 500,
            message: "boom".to_string(),
        }
    }

    #[async_trait]
    impl DocumentStore for MockStore {
        async fn fetch_document(&self, _document_id: i64) -> Result<Document, ClientError> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(Call::Fetch);
            match state.fail_fetch {
                Some(401) => Err(ClientError::AuthRequired),
                Some(_) => Err(ClientError::NotFound("Document not found".to_string())),
                None => {
                    let mut doc = state.document.clone();
                    doc.annotations.sort_by_key(|a| a.start_pos);
                    Ok(doc)
                }
            }
        }

        async fn create_annotation(
            &self,
            document_id: i64,
            annotation: &NewAnnotation,
        ) -> Result<Annotation, ClientError> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(Call::Create);
            if state.fail_mutations {
                return Err(rejected());
            }
            let created = Annotation {
                id: state.next_id,
                document_id,
                start_pos: annotation.start_pos,
                end_pos: annotation.end_pos,
                selected_text: annotation.selected_text.clone(),
                annotation_title: annotation.annotation_title.clone(),
                linked_content: annotation.linked_content.clone(),
                legal_reference: annotation.legal_reference.clone(),
                article_number: annotation.article_number.clone(),
                created_at: Utc::now(),
                updated_at: None,
            };
            state.next_id += 1;
            state.document.annotations.push(created.clone());
            Ok(created)
        }

        async fn update_annotation(
            &self,
            annotation_id: i64,
            update: &AnnotationUpdate,
        ) -> Result<Annotation, ClientError> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(Call::Update(annotation_id));
            if state.fail_mutations {
                return Err(rejected());
            }
            let ann = state
                .document
                .annotations
                .iter_mut()
                .find(|a| a.id == annotation_id)
                .ok_or_else(|| ClientError::NotFound("Annotation not found".to_string()))?;
            if let Some(title) = &update.annotation_title {
                ann.annotation_title = title.clone();
            }
            if let Some(content) = &update.linked_content {
                ann.linked_content = content.clone();
            }
            if let Some(reference) = &update.legal_reference {
                ann.legal_reference = reference.clone();
            }
            if let Some(article) = &update.article_number {
                ann.article_number = article.clone();
            }
            ann.updated_at = Some(Utc::now());
            Ok(ann.clone())
        }

        async fn delete_annotation(&self, annotation_id: i64) -> Result<(), ClientError> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(Call::Delete(annotation_id));
            if state.fail_mutations {
                return Err(rejected());
            }
            state.document.annotations.retain(|a| a.id != annotation_id);
            Ok(())
        }

        fn export_url(&self, document_id: i64, format: ExportFormat) -> String {
            format!("mock://{}/{}", document_id, format.as_str())
        }
    }

    fn article_annotation() -> Annotation {
        Annotation {
            id: 1,
            document_id: 1,
            start_pos: 3,
            end_pos: 14,
            selected_text: "artículo 14".to_string(),
            annotation_title: Some("Igualdad".to_string()),
            linked_content: "Los españoles son iguales ante la ley.".to_string(),
            legal_reference: Some("CE".to_string()),
            article_number: Some("14".to_string()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    struct Harness {
        viewer: StudyDocViewer<MockStore>,
        store: MockStore,
        kv: Arc<dyn KeyValueStore>,
        surface: Arc<WatchFullscreen>,
    }

    async fn mount(annotations: Vec<Annotation>) -> Harness {
        let store = MockStore::new(annotations);
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let surface = Arc::new(WatchFullscreen::new());
        let viewer = StudyDocViewer::mount(store.clone(), 1, kv.clone(), surface.clone()).await;
        Harness {
            viewer,
            store,
            kv,
            surface,
        }
    }

    fn selection(start: usize, end: usize) -> PlatformSelection {
        PlatformSelection {
            anchor: TextPoint::new(0, start),
            focus: TextPoint::new(0, end),
            rect: Some(Rect::default()),
        }
    }

    fn draft(content: &str) -> AnnotationDraft {
        AnnotationDraft {
            linked_content: content.to_string(),
            ..AnnotationDraft::default()
        }
    }

    #[tokio::test]
    async fn test_render_then_delete_scenario() {
        let mut h = mount(vec![article_annotation()]).await;

        let segments = h.viewer.segments();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Plain { text: "El " });
        let Segment::Annotated(span) = &segments[1] else {
            panic!("expected annotated segment");
        };
        assert_eq!(span.text, "artículo 14");
        assert!(span.interactive);
        assert_eq!(segments[2], Segment::Plain { text: " establece la igualdad." });

        h.viewer.select_annotation(1).unwrap();
        h.viewer.delete_annotation(1).await.unwrap();

        assert!(h.viewer.selected_annotation().is_none());
        assert_eq!(h.viewer.segments(), vec![Segment::Plain { text: CONTENT }]);
        assert_eq!(h.store.calls(), vec![Call::Fetch, Call::Delete(1), Call::Fetch]);
    }

    #[tokio::test]
    async fn test_create_refetches_and_clears_selection() {
        let mut h = mount(vec![]).await;

        // "igualdad"
        let pending = h.viewer.handle_selection(&selection(28, 36)).unwrap().clone();
        assert_eq!(pending.text, "igualdad");
        h.viewer.open_annotation_form().unwrap();

        let created = h.viewer.create_annotation(&draft("Principio de igualdad")).await.unwrap();
        assert_eq!((created.start_pos, created.end_pos), (28, 36));
        assert_eq!(slice_chars(CONTENT, created.start_pos, created.end_pos), created.selected_text);

        assert_eq!(h.store.calls(), vec![Call::Fetch, Call::Create, Call::Fetch]);
        assert_eq!(h.viewer.annotations(), h.store.stored_annotations().as_slice());
        assert!(h.viewer.pending_selection().is_none());
        assert!(!h.viewer.is_form_open());
        assert_eq!(segments_text(&h.viewer.segments()), CONTENT);
    }

    #[tokio::test]
    async fn test_update_replaces_selected_with_store_copy() {
        let mut h = mount(vec![article_annotation()]).await;

        h.viewer.select_annotation(1).unwrap();
        let mut form = h.viewer.start_editing().unwrap();
        assert_eq!(form.title, "Igualdad");
        assert!(h.viewer.is_editing());

        form.title = "Derecho a la igualdad".to_string();
        form.legal_reference.clear();
        let updated = h.viewer.save_annotation(&form).await.unwrap();

        assert_eq!(h.store.calls(), vec![Call::Fetch, Call::Update(1), Call::Fetch]);
        assert_eq!(h.viewer.selected_annotation(), Some(&updated));
        assert_eq!(updated.legal_reference, None);
        assert!(!h.viewer.is_editing());
        assert_eq!(h.viewer.annotations()[0].label(), "Derecho a la igualdad");
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_local_state() {
        let mut h = mount(vec![article_annotation()]).await;
        h.store.fail_mutations(true);

        h.viewer.handle_selection(&selection(28, 36)).unwrap();
        h.viewer.open_annotation_form().unwrap();
        let before = h.viewer.annotations().to_vec();

        let err = h.viewer.create_annotation(&draft("nota")).await.unwrap_err();
        assert!(matches!(err, ViewerError::Mutation { action: "create annotation", .. }));
        assert!(h.viewer.pending_selection().is_some());
        assert!(h.viewer.is_form_open());
        assert_eq!(h.viewer.annotations(), before.as_slice());

        h.viewer.select_annotation(1).unwrap();
        assert!(h.viewer.delete_annotation(1).await.is_err());
        assert!(h.viewer.selected_annotation().is_some());

        // No refetch after a failed mutation
        assert_eq!(h.store.calls(), vec![Call::Fetch, Call::Create, Call::Delete(1)]);
    }

    #[tokio::test]
    async fn test_local_validation_skips_store() {
        let mut h = mount(vec![article_annotation()]).await;

        assert!(matches!(
            h.viewer.create_annotation(&draft("nota")).await,
            Err(ViewerError::NoPendingSelection)
        ));

        // "14 establece" overlaps "artículo 14"
        h.viewer.handle_selection(&selection(12, 24)).unwrap();
        assert!(matches!(
            h.viewer.create_annotation(&draft("  ")).await,
            Err(ViewerError::MissingLinkedContent)
        ));
        match h.viewer.create_annotation(&draft("nota")).await {
            Err(ViewerError::Overlap(e)) => assert_eq!(e.existing_id, 1),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(h.store.calls(), vec![Call::Fetch]);
    }

    #[tokio::test]
    async fn test_selection_is_mode_gated() {
        let mut h = mount(vec![]).await;

        for event in [ModeEvent::EnterReading, ModeEvent::ToggleImmersive] {
            h.viewer.dispatch(event).await;
            assert!(h.viewer.handle_selection(&selection(3, 14)).is_none());
            assert!(h.viewer.pending_selection().is_none());
        }

        h.viewer.dispatch(ModeEvent::EnterStudy).await;
        assert!(h.viewer.handle_selection(&selection(3, 14)).is_some());
    }

    #[tokio::test]
    async fn test_reading_mode_annotations_are_inert() {
        let mut h = mount(vec![article_annotation()]).await;
        h.viewer.dispatch(ModeEvent::EnterReading).await;

        assert!(h.viewer.select_annotation(1).is_none());
        assert!(h.viewer.table_of_contents().is_empty());
        let Segment::Annotated(span) = &h.viewer.segments()[1] else {
            panic!("expected annotated segment");
        };
        assert!(!span.interactive);
    }

    #[tokio::test]
    async fn test_mode_change_discards_pending_form() {
        let mut h = mount(vec![]).await;
        h.viewer.handle_selection(&selection(3, 14)).unwrap();
        h.viewer.open_annotation_form().unwrap();

        h.viewer.dispatch(ModeEvent::EnterReading).await;
        assert!(h.viewer.pending_selection().is_none());
        assert!(!h.viewer.is_form_open());
    }

    #[tokio::test]
    async fn test_immersive_and_platform_exit() {
        let mut h = mount(vec![]).await;

        assert_eq!(h.viewer.dispatch(ModeEvent::ToggleImmersive).await, InteractionMode::Immersive);
        assert!(h.surface.is_active());
        // Our own request is not an exit
        assert!(!h.viewer.poll_fullscreen().await);

        h.surface.set_active(false);
        assert!(h.viewer.poll_fullscreen().await);
        assert_eq!(h.viewer.mode(), InteractionMode::Study);

        // Explicit exit leaves full-screen too
        h.viewer.dispatch(ModeEvent::ToggleImmersive).await;
        h.viewer.dispatch(ModeEvent::ToggleImmersive).await;
        assert!(!h.surface.is_active());
        assert_eq!(h.viewer.mode(), InteractionMode::Study);
    }

    #[tokio::test]
    async fn test_waiting_for_fullscreen_exit() {
        let mut h = mount(vec![]).await;
        h.viewer.dispatch(ModeEvent::ToggleImmersive).await;
        h.viewer.poll_fullscreen().await;

        let surface = h.surface.clone();
        tokio::spawn(async move { surface.set_active(false) });

        assert_eq!(h.viewer.next_fullscreen_change().await, Some(InteractionMode::Study));
    }

    #[tokio::test]
    async fn test_preferences_persist_per_document() {
        let mut h = mount(vec![]).await;
        h.viewer.increase_font_size().await.unwrap();
        h.viewer.set_panel_size(90).await.unwrap();
        h.viewer.dispatch(ModeEvent::ToggleImmersive).await;

        let saved = PreferenceStore::new(h.kv.clone(), 1).load().await.unwrap();
        assert_eq!(saved.font_size, 18);
        assert_eq!(saved.panel_size, 50);
        // Immersive comes back as study
        assert_eq!(saved.view_mode, InteractionMode::Study);

        h.viewer.dispatch(ModeEvent::EnterReading).await;
        let remounted =
            StudyDocViewer::mount(h.store.clone(), 1, h.kv.clone(), Arc::new(WatchFullscreen::new())).await;
        assert_eq!(remounted.mode(), InteractionMode::Reading);
        assert_eq!(remounted.preferences().font_size, 18);

        h.viewer.reset_preferences().await.unwrap();
        assert_eq!(h.viewer.preferences().font_size, 16);
        assert_eq!(h.viewer.mode(), InteractionMode::Reading);
    }

    #[tokio::test]
    async fn test_fetch_failures() {
        let store = MockStore::new(vec![]);
        store.fail_fetch(Some(404));
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let surface = Arc::new(WatchFullscreen::new());

        let mut viewer = StudyDocViewer::mount(store.clone(), 1, kv.clone(), surface.clone()).await;
        assert!(matches!(viewer.state(), DocumentState::Failed(_)));
        assert!(viewer.segments().is_empty());
        assert!(viewer.handle_selection(&selection(3, 14)).is_none());

        store.fail_fetch(Some(401));
        assert!(matches!(viewer.refresh().await, Err(ViewerError::AuthRequired)));
        assert_eq!(viewer.state(), &DocumentState::AuthRequired);
    }

    #[tokio::test]
    async fn test_close_unsubscribes() {
        let h = mount(vec![]).await;
        assert_eq!(h.surface.subscribers(), 1);
        assert_eq!(h.viewer.export_url(ExportFormat::Html), "mock://1/html");

        h.viewer.close();
        assert_eq!(h.surface.subscribers(), 0);
    }
}

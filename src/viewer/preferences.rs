//! Per-document reading preferences
//!
//! Preferences are an explicit value owned by the viewer, loaded once at
//! mount and written back through a [`KeyValueStore`] after every change.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;

use super::mode::InteractionMode;

pub const FONT_SIZES: [u32; 6] = [14, 16, 18, 20, 22, 24];
pub const LINE_HEIGHTS: [f32; 5] = [1.5, 1.6, 1.8, 2.0, 2.2];
pub const PANEL_SIZE_RANGE: RangeInclusive<u32> = 20..=50;

const DEFAULT_FONT_SIZE: u32 = 16;
const DEFAULT_LINE_HEIGHT: f32 = 1.8;
const DEFAULT_PANEL_SIZE: u32 = 35;

#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("Preference storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reading preferences for one document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerPreferences {
    pub font_size: u32,
    pub line_height: f32,
    /// Side panel width, percent of the viewport
    pub panel_size: u32,
    pub view_mode: InteractionMode,
}

impl Default for ViewerPreferences {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            line_height: DEFAULT_LINE_HEIGHT,
            panel_size: DEFAULT_PANEL_SIZE,
            view_mode: InteractionMode::Study,
        }
    }
}

impl ViewerPreferences {
    /// Storage key for a document's preferences
    pub fn storage_key(document_id: i64) -> String {
        format!("study-doc-preferences-{}", document_id)
    }

    /// Step up to the next allowed font size. Returns false at the maximum.
    pub fn increase_font_size(&mut self) -> bool {
        match FONT_SIZES.iter().find(|&&size| size > self.font_size) {
            Some(&next) => {
                self.font_size = next;
                true
            }
            None => false,
        }
    }

    /// Step down to the previous allowed font size. Returns false at the minimum.
    pub fn decrease_font_size(&mut self) -> bool {
        match FONT_SIZES.iter().rev().find(|&&size| size < self.font_size) {
            Some(&prev) => {
                self.font_size = prev;
                true
            }
            None => false,
        }
    }

    /// Set one of [`LINE_HEIGHTS`]; other values are ignored.
    pub fn set_line_height(&mut self, height: f32) -> bool {
        match LINE_HEIGHTS.iter().find(|&&h| (h - height).abs() < 1e-3) {
            Some(&h) => {
                self.line_height = h;
                true
            }
            None => false,
        }
    }

    /// Set the panel width, clamped to [`PANEL_SIZE_RANGE`]
    pub fn set_panel_size(&mut self, size: u32) {
        self.panel_size = size.clamp(*PANEL_SIZE_RANGE.start(), *PANEL_SIZE_RANGE.end());
    }

    /// Repair values loaded from storage.
    ///
    /// Out-of-range values fall back to defaults. Immersive mode is restored
    /// as study: full-screen needs a user gesture to be entered again.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if !FONT_SIZES.contains(&self.font_size) {
            self.font_size = defaults.font_size;
        }
        if !LINE_HEIGHTS.iter().any(|h| (h - self.line_height).abs() < 1e-3) {
            self.line_height = defaults.line_height;
        }
        self.set_panel_size(self.panel_size);
        if self.view_mode == InteractionMode::Immersive {
            self.view_mode = InteractionMode::Study;
        }
        self
    }
}

/// String key-value storage for preferences
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
    async fn remove(&self, key: &str) -> Result<(), PreferenceError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PreferenceError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Store backed by the `viewer_preferences` table
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM viewer_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        sqlx::query(
            r#"
            INSERT INTO viewer_preferences (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PreferenceError> {
        sqlx::query("DELETE FROM viewer_preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// A document's slot in a [`KeyValueStore`]
#[derive(Clone)]
pub struct PreferenceStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl PreferenceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, document_id: i64) -> Self {
        Self {
            kv,
            key: ViewerPreferences::storage_key(document_id),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load saved preferences. Missing or unreadable entries give defaults.
    pub async fn load(&self) -> Result<ViewerPreferences, PreferenceError> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            return Ok(ViewerPreferences::default());
        };

        match serde_json::from_str::<ViewerPreferences>(&raw) {
            Ok(prefs) => Ok(prefs.normalized()),
            Err(e) => {
                tracing::warn!("Ignoring invalid preferences under {}: {}", self.key, e);
                Ok(ViewerPreferences::default())
            }
        }
    }

    pub async fn save(&self, prefs: &ViewerPreferences) -> Result<(), PreferenceError> {
        let json = serde_json::to_string(prefs)?;
        self.kv.set(&self.key, &json).await
    }

    pub async fn clear(&self) -> Result<(), PreferenceError> {
        self.kv.remove(&self.key).await
    }
}

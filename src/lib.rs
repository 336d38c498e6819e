//! OpositApp study documents
//!
//! Annotated reading of legal texts: a user stores a document, selects runs
//! of its text and attaches explanatory notes to them.
//!
//! # Modules
//!
//! - `overlay`: render annotations over content, map selections to offsets
//! - `viewer`: interaction modes, preferences and the annotation lifecycle
//! - `client`: the document store seen from the viewer (REST client)
//! - `routes`, `db`, `auth`: the document store server
//! - `export`: interactive HTML export

pub mod annotations;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod html;
pub mod overlay;
pub mod routes;
pub mod state;
pub mod text;
pub mod viewer;

//! ratevault: scheduled foreign-exchange archival with on-demand documents.
//!
//! The crate is split the same way the binary behaves: `domain` holds the
//! validated snapshot model, `application` the export pipeline and services,
//! `infra` the provider clients, storage, and HTTP surface, and `config` the
//! layered settings that wire them together.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

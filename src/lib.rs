//! Guest Check-in Export API Library
//!
//! This library accepts short-term rental check-in submissions and produces
//! the two export documents required by Italian hospitality systems: the
//! Alloggiati Web fixed-width record set and the GIES interchange document
//! (pipe-delimited plus XML), dispatching both as email attachments.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `dispatcher`: Transactional email client and notification assembly.
//! - `errors`: Error handling types.
//! - `formatter`: Record formatting (Alloggiati Web + GIES exports).
//! - `handlers`: HTTP request handlers.
//! - `models`: Request/response models and validation.
//! - `rate_limit`: Admission guard counter store.

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod formatter;
pub mod handlers;
pub mod models;
pub mod rate_limit;

pub mod artifacts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod folio;
pub mod mail;
pub mod models;
pub mod orders;
pub mod render;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod submission;
pub mod utils;

pub use submission::{SubmissionError, SubmissionWorkflow};

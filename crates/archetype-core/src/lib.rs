pub mod config;
pub mod context;
pub mod error;
pub mod facebook;
pub mod field;
pub mod form;
pub mod funnel;
pub mod io;
pub mod mime;
pub mod nonce;
pub mod paths;
pub mod processor;
pub mod sanitize;
pub mod save_strategy;
pub mod site;
pub mod submission;
pub mod template_cache;
pub mod user;
pub mod validators;

pub use error::{ArchetypeError, Result};

//! docbase - database-like views over a folder of markdown notes.
//!
//! A *base* is a YAML definition stored inside the corpus. It declares
//! filters, named formulas and views; materializing a view walks the corpus,
//! keeps the documents passing the filters, computes one row per document
//! and sorts the result.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docbase::{CorpusConfig, Definition, MessageLog, Vault, ViewCache};
//! use docbase::config::FixedTtl;
//!
//! let log = Arc::new(MessageLog::new());
//! let vault = Arc::new(
//!     Vault::open("notes", CorpusConfig::at("/home/me/notes"), log.clone())
//!         .unwrap(),
//! );
//! let cache = ViewCache::new(Arc::new(FixedTtl(
//!     std::time::Duration::from_secs(60),
//! )));
//!
//! let base = Definition::load(vault, "projects.base").unwrap();
//! let rows = base.materialize("Active", &cache, false).unwrap();
//! for row in rows.iter() {
//!     println!("{}", serde_json::to_string(row).unwrap());
//! }
//! for message in log.drain() {
//!     eprintln!("{}: {}", message.severity, message.text);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod expr;
pub mod filter;
pub mod index;
pub mod markdown;
pub mod messages;
pub mod value;
pub mod vault;
pub mod view;
pub mod walker;

pub use cache::{CacheKey, ViewCache};
pub use config::{CorpusConfig, Settings};
pub use definition::{Definition, parse_definition};
pub use document::DocumentContext;
pub use error::{CompileError, Error, Result};
pub use expr::Expr;
pub use filter::{FieldFilter, Filter};
pub use messages::{Message, MessageLog, MessageSink, Severity};
pub use value::Value;
pub use vault::Vault;
pub use view::{Row, Rows, View, ViewKind};

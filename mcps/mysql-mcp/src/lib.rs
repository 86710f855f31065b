//! MySQL MCP Library
//!
//! Exposes a MySQL database to MCP clients behind a safety and
//! access-control gate. Every statement is validated against a deny-list,
//! classified (read, write, ddl, procedure, transaction) and checked against
//! the caller's role before it reaches the database.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mysql_mcp::{config::Config, mysql::MySqlDatabase, MysqlMcpServer};
//!
//! let config = Config::load()?;
//! let db = Arc::new(MySqlDatabase::connect(&config.database).await?);
//! let server = MysqlMcpServer::with_database(config, db).await?;
//! // Serve via stdio, or drive tools through `EmbeddableMcp::call_tool`
//! ```

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod format;
pub mod gate;
pub mod handlers;
pub mod identifier;
pub mod identity;
pub mod mysql;
pub mod params;
pub mod permissions;
pub mod server;
pub mod session;
pub mod transaction;
pub mod validator;

// Re-export main server type
pub use server::MysqlMcpServer;

// Re-export parameter types for direct API usage
pub use params::*;

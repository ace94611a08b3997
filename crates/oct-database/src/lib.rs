//! # OCT Database
//!
//! 基于sqlx/PostgreSQL的持久层:连接池、表模型与查询操作。
//! 唯一性约束在建表时声明，冲突在查询层映射为带字段名的冲突错误。

pub mod connection;
pub mod models;
pub mod queries;

pub use connection::DatabasePool;
pub use models::*;
pub use queries::{DatabaseQueries, DbTransaction, OwnerRef, ReviewOrdering};

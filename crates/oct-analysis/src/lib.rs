//! # OCT Analysis
//!
//! 影像分类服务的接口与实现:远程分类服务客户端与内置占位分类器。
//! 分类在上传请求内同步完成，不做队列化。

pub mod builtin;
pub mod oracle;
pub mod remote;

pub use builtin::BuiltinClassifier;
pub use oracle::{Classification, ClassificationOracle};
pub use remote::RemoteClassifier;

//! # OCT Workflow
//!
//! 业务编排层:身份解析、影像记录与评审流程、档案更新。
//! 多步写入以事务为边界，归属判定交由核心策略引擎。

pub mod identity;
pub mod profile;
pub mod records;

pub use identity::IdentityResolver;
pub use profile::{ProfileService, ProfileUpdate};
pub use records::RecordService;

//! # OCT Storage
//!
//! 上传影像与生成图片的媒体存储，返回相对路径并解析公开URL。

pub mod storage;

pub use storage::MediaStore;

//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 医生档案的默认角色
pub const DEFAULT_DOCTOR_ROLE: &str = "general";

/// 登录账号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String, // 全局唯一
    pub email: String,    // 全局唯一
    #[serde(skip_serializing, default)]
    pub password_hash: String, // argon2id哈希，不进入响应
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

/// 医生档案，与登录账号一对一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid, // 唯一约束，每个账号至多一份档案
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: String,
    pub license_number: Option<String>,
    pub profile_picture: Option<String>, // 媒体库内相对路径
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// OCT影像记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctImage {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub image_path: String, // 创建后不可变
    pub custom_identifier: Option<String>, // 可检索，不保证唯一
    pub uploaded_at: DateTime<Utc>,
}

/// 影像分析结果，与OCT影像一对一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub oct_image_id: Uuid,
    pub classification: String,
    pub findings: String,
    pub processed_image_path: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// 同行评审，每个分析结果至多一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub analysis_result_id: Uuid,
    pub doctor_id: Uuid, // 评审作者
    pub rating: i32,
    pub comments: String,
    pub review_date: DateTime<Utc>,
}

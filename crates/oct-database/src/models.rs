//! 数据库模型

use chrono::{DateTime, Utc};
use oct_core::models::*;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库账号表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(db_user: DbUser) -> Self {
        User {
            id: db_user.id,
            username: db_user.username,
            email: db_user.email,
            password_hash: db_user.password_hash,
            first_name: db_user.first_name,
            last_name: db_user.last_name,
            created_at: db_user.created_at,
        }
    }
}

/// 数据库医生档案表
#[derive(Debug, FromRow)]
pub struct DbDoctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: String,
    pub license_number: Option<String>,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbDoctor> for Doctor {
    fn from(db_doctor: DbDoctor) -> Self {
        Doctor {
            id: db_doctor.id,
            user_id: db_doctor.user_id,
            hospital: db_doctor.hospital,
            specialty: db_doctor.specialty,
            role: db_doctor.role,
            license_number: db_doctor.license_number,
            profile_picture: db_doctor.profile_picture,
            phone_number: db_doctor.phone_number,
            created_at: db_doctor.created_at,
        }
    }
}

/// 数据库OCT影像表
#[derive(Debug, FromRow)]
pub struct DbOctImage {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub image_path: String,
    pub custom_identifier: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DbOctImage> for OctImage {
    fn from(db_image: DbOctImage) -> Self {
        OctImage {
            id: db_image.id,
            doctor_id: db_image.doctor_id,
            image_path: db_image.image_path,
            custom_identifier: db_image.custom_identifier,
            uploaded_at: db_image.uploaded_at,
        }
    }
}

/// 数据库分析结果表
#[derive(Debug, FromRow)]
pub struct DbAnalysisResult {
    pub id: Uuid,
    pub oct_image_id: Uuid,
    pub classification: String,
    pub findings: String,
    pub processed_image_path: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl From<DbAnalysisResult> for AnalysisResult {
    fn from(db_result: DbAnalysisResult) -> Self {
        AnalysisResult {
            id: db_result.id,
            oct_image_id: db_result.oct_image_id,
            classification: db_result.classification,
            findings: db_result.findings,
            processed_image_path: db_result.processed_image_path,
            analyzed_at: db_result.analyzed_at,
        }
    }
}

/// 数据库评审表
#[derive(Debug, FromRow)]
pub struct DbReview {
    pub id: Uuid,
    pub analysis_result_id: Uuid,
    pub doctor_id: Uuid,
    pub rating: i32,
    pub comments: String,
    pub review_date: DateTime<Utc>,
}

impl From<DbReview> for Review {
    fn from(db_review: DbReview) -> Self {
        Review {
            id: db_review.id,
            analysis_result_id: db_review.analysis_result_id,
            doctor_id: db_review.doctor_id,
            rating: db_review.rating,
            comments: db_review.comments,
            review_date: db_review.review_date,
        }
    }
}

// 插入模型 - 用于创建新记录，时间戳由数据库默认值填充

/// 新账号插入模型
#[derive(Debug)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// 新医生档案插入模型
#[derive(Debug)]
pub struct NewDoctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: String,
    pub license_number: Option<String>,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
}

impl NewDoctor {
    /// 默认档案:角色为general，其余字段为空
    pub fn general(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            hospital: None,
            specialty: None,
            role: DEFAULT_DOCTOR_ROLE.to_string(),
            license_number: None,
            profile_picture: None,
            phone_number: None,
        }
    }
}

/// 新OCT影像插入模型
#[derive(Debug)]
pub struct NewOctImage {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub image_path: String,
    pub custom_identifier: Option<String>,
}

/// 新分析结果插入模型
#[derive(Debug)]
pub struct NewAnalysisResult {
    pub id: Uuid,
    pub oct_image_id: Uuid,
    pub classification: String,
    pub findings: String,
    pub processed_image_path: Option<String>,
}

/// 新评审插入模型
#[derive(Debug)]
pub struct NewReview {
    pub id: Uuid,
    pub analysis_result_id: Uuid,
    pub doctor_id: Uuid,
    pub rating: i32,
    pub comments: String,
}

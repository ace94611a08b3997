//! 档案更新流程
//!
//! 账号字段与医生档案字段作为同一个可观察单元提交:
//! 两张表的写入包在一个事务里，要么一起生效要么都不变。

use crate::identity::IdentityResolver;
use oct_core::utils::is_valid_email;
use oct_core::{Doctor, OctError, Result, User};
use oct_database::{DatabasePool, DatabaseQueries};
use oct_storage::MediaStore;
use uuid::Uuid;

/// 头像存储的类别目录
const PICTURE_CATEGORY: &str = "profile_pics";

/// 档案部分更新请求，未给出的字段保持不变
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: Option<String>,
    pub license_number: Option<String>,
    pub phone_number: Option<String>,
    /// (原文件名, 文件内容)，给出时替换已存储的头像引用
    pub profile_picture: Option<(String, Vec<u8>)>,
}

/// 档案服务
///
/// 只操作认证主体自己的档案，调用方传入的user_id即认证主体。
pub struct ProfileService<'a> {
    pool: &'a DatabasePool,
    storage: &'a MediaStore,
}

impl<'a> ProfileService<'a> {
    pub fn new(pool: &'a DatabasePool, storage: &'a MediaStore) -> Self {
        Self { pool, storage }
    }

    /// 读取主体的完整档案
    pub async fn get_profile(&self, user_id: Uuid) -> Result<(User, Doctor)> {
        let queries = DatabaseQueries::new(self.pool);

        let user = queries
            .get_user_by_id(&user_id)
            .await?
            .ok_or_else(|| OctError::NotFound("User not found".to_string()))?;

        let doctor = queries
            .get_doctor_by_user_id(&user_id)
            .await?
            .ok_or_else(|| OctError::NotFound("Doctor profile not found".to_string()))?;

        Ok((user, doctor))
    }

    /// 部分更新主体的档案
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<(User, Doctor)> {
        if let Some(email) = &update.email {
            if !is_valid_email(email) {
                return Err(OctError::validation("email", "Enter a valid email address."));
            }
        }

        let queries = DatabaseQueries::new(self.pool);
        let user = queries
            .get_user_by_id(&user_id)
            .await?
            .ok_or_else(|| OctError::NotFound("User not found".to_string()))?;
        let doctor = IdentityResolver::new(self.pool).resolve_or_create(user_id).await?;

        // 头像先落盘，事务回滚时库内不会留下悬空引用
        let picture_path = match update.profile_picture {
            Some((name, bytes)) => Some(self.storage.store(PICTURE_CATEGORY, &name, &bytes).await?),
            None => None,
        };

        let mut tx = queries.begin().await?;

        let first_name = update.first_name.unwrap_or(user.first_name);
        let last_name = update.last_name.unwrap_or(user.last_name);
        let email = update.email.unwrap_or(user.email);
        DatabaseQueries::update_user_fields_tx(&mut tx, &user.id, &first_name, &last_name, &email)
            .await?;

        let hospital = update.hospital.or(doctor.hospital);
        let specialty = update.specialty.or(doctor.specialty);
        let role = update.role.unwrap_or(doctor.role);
        let license_number = update.license_number.or(doctor.license_number);
        let phone_number = update.phone_number.or(doctor.phone_number);
        let profile_picture = picture_path.or(doctor.profile_picture);
        DatabaseQueries::update_doctor_fields_tx(
            &mut tx,
            &doctor.id,
            hospital.as_deref(),
            specialty.as_deref(),
            &role,
            license_number.as_deref(),
            profile_picture.as_deref(),
            phone_number.as_deref(),
        )
        .await?;

        tx.commit().await.map_err(|e| OctError::Database(e.to_string()))?;

        tracing::info!("Profile updated for user {}", user_id);
        self.get_profile(user_id).await
    }
}

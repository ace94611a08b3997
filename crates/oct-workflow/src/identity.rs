//! 身份解析
//!
//! 将认证主体解析为医生档案，缺失时惰性创建。

use oct_core::{Doctor, OctError, Result};
use oct_database::{DatabasePool, DatabaseQueries, NewDoctor};
use uuid::Uuid;

/// 身份解析器
pub struct IdentityResolver<'a> {
    pool: &'a DatabasePool,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 仅解析，不创建
    pub async fn resolve(&self, user_id: Uuid) -> Result<Option<Doctor>> {
        DatabaseQueries::new(self.pool)
            .get_doctor_by_user_id(&user_id)
            .await
    }

    /// 解析或创建医生档案
    ///
    /// 幂等:并发首次调用由doctors.user_id唯一约束裁决唯一赢家，
    /// 失败方不报错，改为加载赢家的记录。
    pub async fn resolve_or_create(&self, user_id: Uuid) -> Result<Doctor> {
        let queries = DatabaseQueries::new(self.pool);

        if let Some(doctor) = queries.get_doctor_by_user_id(&user_id).await? {
            return Ok(doctor);
        }

        tracing::info!("Creating missing doctor profile for user {}", user_id);
        queries.insert_doctor_if_absent(&NewDoctor::general(user_id)).await?;

        queries
            .get_doctor_by_user_id(&user_id)
            .await?
            .ok_or_else(|| OctError::Internal("doctor profile missing after creation".to_string()))
    }
}

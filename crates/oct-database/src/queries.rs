//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use oct_core::{AnalysisResult, Doctor, EntityKind, OctError, OctImage, Result, Review, User};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

/// PostgreSQL唯一约束冲突的SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// 进行中的数据库事务
pub type DbTransaction<'a> = Transaction<'a, Postgres>;

/// 归属链解析出的医生及其账号
#[derive(Debug, Clone, Copy, FromRow)]
pub struct OwnerRef {
    pub doctor_id: Uuid,
    pub user_id: Uuid,
}

/// 评审列表排序白名单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewOrdering {
    #[default]
    ReviewDateDesc,
    ReviewDateAsc,
    RatingDesc,
    RatingAsc,
}

impl ReviewOrdering {
    /// 解析ordering查询参数，前导`-`表示降序
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "review_date" => Some(ReviewOrdering::ReviewDateAsc),
            "-review_date" => Some(ReviewOrdering::ReviewDateDesc),
            "rating" => Some(ReviewOrdering::RatingAsc),
            "-rating" => Some(ReviewOrdering::RatingDesc),
            _ => None,
        }
    }

    fn order_sql(&self) -> &'static str {
        match self {
            ReviewOrdering::ReviewDateDesc => "review_date DESC",
            ReviewOrdering::ReviewDateAsc => "review_date ASC",
            ReviewOrdering::RatingDesc => "rating DESC, review_date DESC",
            ReviewOrdering::RatingAsc => "rating ASC, review_date DESC",
        }
    }
}

/// 唯一约束名到冲突字段与提示语的映射
fn conflict_for_constraint(constraint: &str) -> Option<(&'static str, &'static str)> {
    match constraint {
        "users_username_key" => Some(("username", "This username is already taken.")),
        "users_email_key" => Some(("email", "This email is already in use.")),
        "doctors_user_id_key" => Some(("user", "A doctor profile already exists for this user.")),
        "analysis_results_oct_image_id_key" => {
            Some(("oct_image", "An analysis result already exists for this image."))
        }
        "reviews_analysis_result_id_key" => Some((
            "analysis_result",
            "A review already exists for this analysis result.",
        )),
        _ => None,
    }
}

/// sqlx错误映射:唯一约束冲突转为带字段名的冲突错误，其余归为数据库错误
fn map_db_error(e: sqlx::Error) -> OctError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            if let Some((field, message)) = db_err.constraint().and_then(conflict_for_constraint) {
                return OctError::conflict(field, message);
            }
        }
    }
    OctError::Database(e.to_string())
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 开启事务，多步写入要么全部提交要么全部回滚
    pub async fn begin(&self) -> Result<DbTransaction<'a>> {
        self.pool.pool().begin().await.map_err(map_db_error)
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建账号表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username VARCHAR(150) UNIQUE NOT NULL,
                email VARCHAR(254) UNIQUE NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(map_db_error)?;

        // 创建医生档案表，user_id唯一保证账号与档案一对一
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS doctors (
                id UUID PRIMARY KEY,
                user_id UUID UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                hospital VARCHAR(100),
                specialty VARCHAR(100),
                role VARCHAR(100) NOT NULL DEFAULT 'general',
                license_number VARCHAR(50),
                profile_picture VARCHAR(512),
                phone_number VARCHAR(32),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(map_db_error)?;

        // 创建OCT影像表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS oct_images (
                id UUID PRIMARY KEY,
                doctor_id UUID NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
                image_path VARCHAR(512) NOT NULL,
                custom_identifier VARCHAR(100),
                uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(map_db_error)?;

        // 创建分析结果表，oct_image_id唯一保证影像与结果一对一
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS analysis_results (
                id UUID PRIMARY KEY,
                oct_image_id UUID UNIQUE NOT NULL REFERENCES oct_images(id) ON DELETE CASCADE,
                classification VARCHAR(100) NOT NULL,
                findings TEXT NOT NULL,
                processed_image_path VARCHAR(512),
                analyzed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(map_db_error)?;

        // 创建评审表，analysis_result_id唯一保证每个结果至多一条评审
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id UUID PRIMARY KEY,
                analysis_result_id UUID UNIQUE NOT NULL REFERENCES analysis_results(id) ON DELETE CASCADE,
                doctor_id UUID NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
                rating INTEGER NOT NULL,
                comments TEXT NOT NULL DEFAULT '',
                review_date TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(map_db_error)?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_oct_images_doctor_id ON oct_images(doctor_id)",
            "CREATE INDEX IF NOT EXISTS idx_oct_images_custom_identifier ON oct_images(custom_identifier)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_doctor_id ON reviews(doctor_id)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_review_date ON reviews(review_date)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(map_db_error)?;
        }

        Ok(())
    }

    // ========== 账号相关操作 ==========

    /// 创建新账号(事务内)
    pub async fn insert_user_tx(tx: &mut DbTransaction<'_>, user: &NewUser) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 根据ID查找账号
    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(result.map(User::from))
    }

    /// 根据用户名查找账号
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(result.map(User::from))
    }

    /// 更新账号资料字段(事务内)，调用方负责合并部分更新后的最终值
    pub async fn update_user_fields_tx(
        tx: &mut DbTransaction<'_>,
        id: &Uuid,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET first_name = $1, last_name = $2, email = $3 WHERE id = $4")
            .bind(first_name)
            .bind(last_name)
            .bind(email)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;

        Ok(())
    }

    // ========== 医生档案相关操作 ==========

    /// 创建医生档案(事务内)
    pub async fn insert_doctor_tx(tx: &mut DbTransaction<'_>, doctor: &NewDoctor) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO doctors (id, user_id, hospital, specialty, role, license_number, profile_picture, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#)
        .bind(doctor.id)
        .bind(doctor.user_id)
        .bind(&doctor.hospital)
        .bind(&doctor.specialty)
        .bind(&doctor.role)
        .bind(&doctor.license_number)
        .bind(&doctor.profile_picture)
        .bind(&doctor.phone_number)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 惰性创建医生档案
    ///
    /// 并发首次创建时由user_id唯一约束裁决唯一赢家，失败方不报错，
    /// 改为读取赢家的记录。
    pub async fn insert_doctor_if_absent(&self, doctor: &NewDoctor) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO doctors (id, user_id, hospital, specialty, role, license_number, profile_picture, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO NOTHING
        "#)
        .bind(doctor.id)
        .bind(doctor.user_id)
        .bind(&doctor.hospital)
        .bind(&doctor.specialty)
        .bind(&doctor.role)
        .bind(&doctor.license_number)
        .bind(&doctor.profile_picture)
        .bind(&doctor.phone_number)
        .execute(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 根据账号ID查找医生档案
    pub async fn get_doctor_by_user_id(&self, user_id: &Uuid) -> Result<Option<Doctor>> {
        let result = sqlx::query_as::<_, DbDoctor>("SELECT * FROM doctors WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(result.map(Doctor::from))
    }

    /// 更新医生档案字段(事务内)，调用方负责合并部分更新后的最终值
    pub async fn update_doctor_fields_tx(
        tx: &mut DbTransaction<'_>,
        id: &Uuid,
        hospital: Option<&str>,
        specialty: Option<&str>,
        role: &str,
        license_number: Option<&str>,
        profile_picture: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<()> {
        sqlx::query(r#"
            UPDATE doctors
            SET hospital = $1, specialty = $2, role = $3, license_number = $4,
                profile_picture = $5, phone_number = $6
            WHERE id = $7
        "#)
        .bind(hospital)
        .bind(specialty)
        .bind(role)
        .bind(license_number)
        .bind(profile_picture)
        .bind(phone_number)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    // ========== OCT影像相关操作 ==========

    /// 创建新影像记录(事务内)
    pub async fn insert_image_tx(tx: &mut DbTransaction<'_>, image: &NewOctImage) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO oct_images (id, doctor_id, image_path, custom_identifier)
            VALUES ($1, $2, $3, $4)
        "#)
        .bind(image.id)
        .bind(image.doctor_id)
        .bind(&image.image_path)
        .bind(&image.custom_identifier)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 根据ID查找影像
    pub async fn get_image(&self, id: &Uuid) -> Result<Option<OctImage>> {
        let result = sqlx::query_as::<_, DbOctImage>("SELECT * FROM oct_images WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(result.map(OctImage::from))
    }

    /// 列出某医生的全部影像，可按自定义标识模糊检索
    pub async fn list_images_by_doctor(
        &self,
        doctor_id: &Uuid,
        custom_identifier: Option<&str>,
    ) -> Result<Vec<OctImage>> {
        let results = sqlx::query_as::<_, DbOctImage>(r#"
            SELECT * FROM oct_images
            WHERE doctor_id = $1
              AND ($2::text IS NULL OR custom_identifier ILIKE '%' || $2 || '%')
            ORDER BY uploaded_at DESC
        "#)
        .bind(doctor_id)
        .bind(custom_identifier)
        .fetch_all(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(OctImage::from).collect())
    }

    // ========== 分析结果相关操作 ==========

    /// 创建新分析结果(事务内)
    pub async fn insert_analysis_tx(
        tx: &mut DbTransaction<'_>,
        analysis: &NewAnalysisResult,
    ) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO analysis_results (id, oct_image_id, classification, findings, processed_image_path)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(analysis.id)
        .bind(analysis.oct_image_id)
        .bind(&analysis.classification)
        .bind(&analysis.findings)
        .bind(&analysis.processed_image_path)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 根据ID查找分析结果
    pub async fn get_analysis(&self, id: &Uuid) -> Result<Option<AnalysisResult>> {
        let result =
            sqlx::query_as::<_, DbAnalysisResult>("SELECT * FROM analysis_results WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(map_db_error)?;

        Ok(result.map(AnalysisResult::from))
    }

    /// 列出某医生名下影像的分析结果，可按影像过滤
    pub async fn list_analyses_by_doctor(
        &self,
        doctor_id: &Uuid,
        oct_image: Option<Uuid>,
    ) -> Result<Vec<AnalysisResult>> {
        let results = sqlx::query_as::<_, DbAnalysisResult>(r#"
            SELECT ar.* FROM analysis_results ar
            JOIN oct_images oi ON ar.oct_image_id = oi.id
            WHERE oi.doctor_id = $1
              AND ($2::uuid IS NULL OR ar.oct_image_id = $2)
            ORDER BY ar.analyzed_at DESC
        "#)
        .bind(doctor_id)
        .bind(oct_image)
        .fetch_all(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(results.into_iter().map(AnalysisResult::from).collect())
    }

    // ========== 评审相关操作 ==========

    /// 创建新评审
    ///
    /// 每个分析结果至多一条评审由唯一约束保证，
    /// 并发重复创建在这里映射为命名analysis_result字段的冲突错误。
    pub async fn insert_review(&self, review: &NewReview) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO reviews (id, analysis_result_id, doctor_id, rating, comments)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(review.id)
        .bind(review.analysis_result_id)
        .bind(review.doctor_id)
        .bind(review.rating)
        .bind(&review.comments)
        .execute(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// 根据ID查找评审
    pub async fn get_review(&self, id: &Uuid) -> Result<Option<Review>> {
        let result = sqlx::query_as::<_, DbReview>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(result.map(Review::from))
    }

    /// 列出评审，可按分析结果过滤，按白名单字段排序
    pub async fn list_reviews(
        &self,
        analysis_result: Option<Uuid>,
        ordering: ReviewOrdering,
    ) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT * FROM reviews WHERE ($1::uuid IS NULL OR analysis_result_id = $1) ORDER BY {}",
            ordering.order_sql()
        );

        let results = sqlx::query_as::<_, DbReview>(&sql)
            .bind(analysis_result)
            .fetch_all(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(results.into_iter().map(Review::from).collect())
    }

    /// 更新评审内容
    pub async fn update_review(&self, id: &Uuid, rating: i32, comments: &str) -> Result<()> {
        sqlx::query("UPDATE reviews SET rating = $1, comments = $2 WHERE id = $3")
            .bind(rating)
            .bind(comments)
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(map_db_error)?;

        Ok(())
    }

    // ========== 归属链解析 ==========

    /// 按实体形态解析归属链，返回链上最终的医生及其账号
    ///
    /// Review归属于评审作者；Analysis与Image沿关联回溯到上传影像的医生。
    /// 实体不存在时返回None，由调用方决定按未找到还是拒绝处理。
    pub async fn resolve_owner(&self, kind: EntityKind, id: &Uuid) -> Result<Option<OwnerRef>> {
        let sql = match kind {
            EntityKind::Image => r#"
                SELECT d.id AS doctor_id, d.user_id FROM oct_images oi
                JOIN doctors d ON oi.doctor_id = d.id
                WHERE oi.id = $1
            "#,
            EntityKind::Analysis => r#"
                SELECT d.id AS doctor_id, d.user_id FROM analysis_results ar
                JOIN oct_images oi ON ar.oct_image_id = oi.id
                JOIN doctors d ON oi.doctor_id = d.id
                WHERE ar.id = $1
            "#,
            EntityKind::Review => r#"
                SELECT d.id AS doctor_id, d.user_id FROM reviews r
                JOIN doctors d ON r.doctor_id = d.id
                WHERE r.id = $1
            "#,
        };

        sqlx::query_as::<_, OwnerRef>(sql)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(map_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_ordering_parse() {
        assert_eq!(ReviewOrdering::parse("review_date"), Some(ReviewOrdering::ReviewDateAsc));
        assert_eq!(ReviewOrdering::parse("-review_date"), Some(ReviewOrdering::ReviewDateDesc));
        assert_eq!(ReviewOrdering::parse("rating"), Some(ReviewOrdering::RatingAsc));
        assert_eq!(ReviewOrdering::parse("-rating"), Some(ReviewOrdering::RatingDesc));
        assert_eq!(ReviewOrdering::parse("comments"), None);
        assert_eq!(ReviewOrdering::parse(""), None);
    }

    #[test]
    fn test_conflict_mapping_names_fields() {
        let (field, _) = conflict_for_constraint("users_username_key").unwrap();
        assert_eq!(field, "username");

        let (field, _) = conflict_for_constraint("users_email_key").unwrap();
        assert_eq!(field, "email");

        let (field, _) = conflict_for_constraint("reviews_analysis_result_id_key").unwrap();
        assert_eq!(field, "analysis_result");

        // 未登记的约束不伪装成冲突
        assert!(conflict_for_constraint("oct_images_pkey").is_none());
    }
}

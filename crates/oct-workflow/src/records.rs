//! 影像记录与评审流程
//!
//! 上传、分类、评审的编排。列表与详情在这里收窄到主体自己的记录；
//! 写操作沿归属链交由策略引擎判定。

use crate::identity::IdentityResolver;
use oct_analysis::ClassificationOracle;
use oct_core::policy::{self, AccessMethod, Ownership};
use oct_core::{AnalysisResult, EntityKind, OctError, OctImage, Result, Review};
use oct_database::{
    DatabasePool, DatabaseQueries, NewAnalysisResult, NewOctImage, NewReview, ReviewOrdering,
};
use oct_storage::MediaStore;
use uuid::Uuid;

/// 影像库中上传原图的类别目录
const SCAN_CATEGORY: &str = "oct_scans";
/// 分类服务生成图的类别目录
const PROCESSED_CATEGORY: &str = "processed";

/// 记录服务
///
/// 组合持久层、媒体存储与分类服务，编排每个实体的创建与读取流程。
pub struct RecordService<'a> {
    pool: &'a DatabasePool,
    storage: &'a MediaStore,
    oracle: &'a dyn ClassificationOracle,
}

impl<'a> RecordService<'a> {
    pub fn new(
        pool: &'a DatabasePool,
        storage: &'a MediaStore,
        oracle: &'a dyn ClassificationOracle,
    ) -> Self {
        Self { pool, storage, oracle }
    }

    // ========== 上传流程 ==========

    /// 上传影像并同步分类
    ///
    /// 影像行与分析结果行在同一事务内提交:分类失败则整体回滚，
    /// 不会出现被当作成功暴露的无结果影像。
    pub async fn upload_image(
        &self,
        user_id: Uuid,
        file_name: &str,
        data: &[u8],
        custom_identifier: Option<String>,
    ) -> Result<(OctImage, AnalysisResult)> {
        if data.is_empty() {
            return Err(OctError::validation("image", "An image file is required."));
        }

        let doctor = IdentityResolver::new(self.pool).resolve_or_create(user_id).await?;

        // 原图先落盘，事务回滚时库内不会留下悬空路径
        let image_path = self.storage.store(SCAN_CATEGORY, file_name, data).await?;
        let image_location = self
            .storage
            .url_for(Some(&image_path))
            .unwrap_or_else(|| image_path.clone());

        let queries = DatabaseQueries::new(self.pool);
        let mut tx = queries.begin().await?;

        let new_image = NewOctImage {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            image_path,
            custom_identifier,
        };
        DatabaseQueries::insert_image_tx(&mut tx, &new_image).await?;

        // 同步分类，当前请求在此阻塞
        let classification = self.oracle.classify(&image_location).await?;

        let processed_image_path = match classification.processed_image {
            Some(bytes) => {
                let name = format!("processed_{}", file_name);
                Some(self.storage.store(PROCESSED_CATEGORY, &name, &bytes).await?)
            }
            None => None,
        };

        let new_analysis = NewAnalysisResult {
            id: Uuid::new_v4(),
            oct_image_id: new_image.id,
            classification: classification.label,
            findings: classification.findings,
            processed_image_path,
        };
        DatabaseQueries::insert_analysis_tx(&mut tx, &new_analysis).await?;

        tx.commit().await.map_err(|e| OctError::Database(e.to_string()))?;

        tracing::info!(
            "Image {} uploaded and classified for doctor {}",
            new_image.id,
            doctor.id
        );

        let image = queries
            .get_image(&new_image.id)
            .await?
            .ok_or_else(|| OctError::Internal("image missing after commit".to_string()))?;
        let analysis = queries
            .get_analysis(&new_analysis.id)
            .await?
            .ok_or_else(|| OctError::Internal("analysis missing after commit".to_string()))?;

        Ok((image, analysis))
    }

    // ========== 影像读取，收窄到主体自己的记录 ==========

    /// 列出主体自己的影像
    ///
    /// 未认证或无医生档案的主体得到空集合而不是错误。
    pub async fn list_images(
        &self,
        principal: Option<Uuid>,
        custom_identifier: Option<&str>,
    ) -> Result<Vec<OctImage>> {
        let Some(user_id) = principal else {
            return Ok(Vec::new());
        };

        match IdentityResolver::new(self.pool).resolve(user_id).await? {
            Some(doctor) => {
                DatabaseQueries::new(self.pool)
                    .list_images_by_doctor(&doctor.id, custom_identifier)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// 读取主体自己的影像详情，他人记录一律拒绝
    pub async fn get_image(&self, user_id: Uuid, image_id: Uuid) -> Result<OctImage> {
        let queries = DatabaseQueries::new(self.pool);

        let image = queries
            .get_image(&image_id)
            .await?
            .ok_or_else(|| OctError::NotFound("Image not found".to_string()))?;

        let owner = queries.resolve_owner(EntityKind::Image, &image_id).await?;
        match owner {
            Some(owner) if owner.user_id == user_id => Ok(image),
            _ => Err(OctError::Forbidden(
                "You do not have access to this image".to_string(),
            )),
        }
    }

    // ========== 分析结果读取，收窄到主体自己的记录 ==========

    /// 列出主体自己影像的分析结果，可按影像过滤
    pub async fn list_analyses(
        &self,
        principal: Option<Uuid>,
        oct_image: Option<Uuid>,
    ) -> Result<Vec<AnalysisResult>> {
        let Some(user_id) = principal else {
            return Ok(Vec::new());
        };

        match IdentityResolver::new(self.pool).resolve(user_id).await? {
            Some(doctor) => {
                DatabaseQueries::new(self.pool)
                    .list_analyses_by_doctor(&doctor.id, oct_image)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// 读取主体自己的分析结果详情
    pub async fn get_analysis(&self, user_id: Uuid, analysis_id: Uuid) -> Result<AnalysisResult> {
        let queries = DatabaseQueries::new(self.pool);

        let analysis = queries
            .get_analysis(&analysis_id)
            .await?
            .ok_or_else(|| OctError::NotFound("Analysis result not found".to_string()))?;

        let owner = queries.resolve_owner(EntityKind::Analysis, &analysis_id).await?;
        match owner {
            Some(owner) if owner.user_id == user_id => Ok(analysis),
            _ => Err(OctError::Forbidden(
                "You do not have access to this analysis result".to_string(),
            )),
        }
    }

    // ========== 评审流程 ==========

    /// 创建评审
    ///
    /// 每个分析结果至多一条评审由存储层唯一约束保证，重复创建
    /// 以命名analysis_result字段的冲突错误返回，先到者不受影响。
    pub async fn create_review(
        &self,
        user_id: Uuid,
        analysis_result_id: Uuid,
        rating: i32,
        comments: String,
    ) -> Result<Review> {
        validate_rating(rating)?;

        let doctor = IdentityResolver::new(self.pool).resolve_or_create(user_id).await?;
        let queries = DatabaseQueries::new(self.pool);

        if queries.get_analysis(&analysis_result_id).await?.is_none() {
            return Err(OctError::NotFound("Analysis result not found".to_string()));
        }

        let new_review = NewReview {
            id: Uuid::new_v4(),
            analysis_result_id,
            doctor_id: doctor.id,
            rating,
            comments,
        };
        queries.insert_review(&new_review).await?;

        queries
            .get_review(&new_review.id)
            .await?
            .ok_or_else(|| OctError::Internal("review missing after insert".to_string()))
    }

    /// 列出评审，可按分析结果过滤、按评审时间或评分排序
    pub async fn list_reviews(
        &self,
        analysis_result: Option<Uuid>,
        ordering: ReviewOrdering,
    ) -> Result<Vec<Review>> {
        DatabaseQueries::new(self.pool)
            .list_reviews(analysis_result, ordering)
            .await
    }

    /// 读取评审详情
    pub async fn get_review(&self, review_id: Uuid) -> Result<Review> {
        DatabaseQueries::new(self.pool)
            .get_review(&review_id)
            .await?
            .ok_or_else(|| OctError::NotFound("Review not found".to_string()))
    }

    /// 更新评审，仅作者本人可写
    pub async fn update_review(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        rating: Option<i32>,
        comments: Option<String>,
    ) -> Result<Review> {
        let queries = DatabaseQueries::new(self.pool);

        let review = queries
            .get_review(&review_id)
            .await?
            .ok_or_else(|| OctError::NotFound("Review not found".to_string()))?;

        // 沿归属链解析到作者账号，未知形态拒绝
        let ownership = match queries.resolve_owner(EntityKind::Review, &review_id).await? {
            Some(owner) => Ownership::User(owner.user_id),
            None => Ownership::Unknown,
        };
        policy::enforce(Some(user_id), AccessMethod::PartialUpdate, &ownership)?;

        let rating = rating.unwrap_or(review.rating);
        validate_rating(rating)?;
        let comments = comments.unwrap_or(review.comments);

        queries.update_review(&review_id, rating, &comments).await?;

        queries
            .get_review(&review_id)
            .await?
            .ok_or_else(|| OctError::Internal("review missing after update".to_string()))
    }
}

/// 评分取1到5的整数
fn validate_rating(rating: i32) -> Result<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(OctError::validation("rating", "Rating must be between 1 and 5."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());

        let err = validate_rating(0).unwrap_err();
        assert!(matches!(err, OctError::Validation { field, .. } if field == "rating"));
    }
}

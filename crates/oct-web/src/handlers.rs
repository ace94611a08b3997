//! HTTP处理器

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use oct_core::{AnalysisResult, Doctor, OctError, OctImage, Review, User};
use oct_database::ReviewOrdering;
use oct_storage::MediaStore;
use oct_workflow::{ProfileService, ProfileUpdate, RecordService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "OCT Review API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1",
            "media": "/media"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

// ========== 档案 ==========

/// 当前账号的完整档案
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: AccountPayload,
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: String,
    pub license_number: Option<String>,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
}

/// 不含医生档案的账号摘要
#[derive(Debug, Serialize)]
pub struct AccountPayload {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl ProfileResponse {
    fn new(user: &User, doctor: &Doctor, storage: &MediaStore) -> Self {
        Self {
            user: AccountPayload {
                id: user.id,
                username: user.username.clone(),
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
            hospital: doctor.hospital.clone(),
            specialty: doctor.specialty.clone(),
            role: doctor.role.clone(),
            license_number: doctor.license_number.clone(),
            profile_picture: storage.url_for(doctor.profile_picture.as_deref()),
            phone_number: doctor.phone_number.clone(),
        }
    }
}

/// 当前档案读取处理器
pub async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let (account, doctor) = ProfileService::new(&state.pool, &state.storage)
        .get_profile(user.user_id)
        .await?;

    Ok(Json(ProfileResponse::new(&account, &doctor, &state.storage)))
}

/// 档案部分更新处理器，multipart表单，头像以文件字段给出
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let update = parse_profile_update(multipart).await?;

    let (account, doctor) = ProfileService::new(&state.pool, &state.storage)
        .update_profile(user.user_id, update)
        .await?;

    Ok(Json(ProfileResponse::new(&account, &doctor, &state.storage)))
}

/// 将multipart表单字段收集为部分更新请求
async fn parse_profile_update(mut multipart: Multipart) -> ApiResult<ProfileUpdate> {
    let mut update = ProfileUpdate::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(OctError::validation("body", e.to_string())))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("first_name") => update.first_name = Some(read_text(field).await?),
            Some("last_name") => update.last_name = Some(read_text(field).await?),
            Some("email") => update.email = Some(read_text(field).await?),
            Some("hospital") => update.hospital = Some(read_text(field).await?),
            Some("specialty") => update.specialty = Some(read_text(field).await?),
            Some("role") => update.role = Some(read_text(field).await?),
            Some("license_number") => update.license_number = Some(read_text(field).await?),
            Some("phone_number") => update.phone_number = Some(read_text(field).await?),
            Some("profile_picture") => {
                let file_name = field.file_name().unwrap_or("profile.png").to_string();
                let bytes = read_bytes(field).await?;
                update.profile_picture = Some((file_name, bytes));
            }
            _ => continue,
        }
    }

    Ok(update)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError(OctError::validation("body", e.to_string())))
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> ApiResult<Vec<u8>> {
    field
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| ApiError(OctError::validation("body", e.to_string())))
}

// ========== OCT影像 ==========

/// 影像响应，存储路径解析为公开URL
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub custom_identifier: Option<String>,
    pub image: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl ImageResponse {
    fn new(image: &OctImage, storage: &MediaStore) -> Self {
        Self {
            id: image.id,
            custom_identifier: image.custom_identifier.clone(),
            image: storage.url_for(Some(&image.image_path)),
            uploaded_at: image.uploaded_at,
        }
    }
}

/// 影像列表查询参数
#[derive(Debug, Deserialize)]
pub struct ImageQueryParams {
    pub custom_identifier: Option<String>,
}

/// 影像列表处理器
///
/// 只返回主体自己的影像；未认证或无档案的主体得到空集合。
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(principal): OptionalAuthUser,
    Query(params): Query<ImageQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let images = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .list_images(
            principal.map(|user| user.user_id),
            params.custom_identifier.as_deref(),
        )
        .await?;

    let payload: Vec<ImageResponse> = images
        .iter()
        .map(|image| ImageResponse::new(image, &state.storage))
        .collect();
    Ok(Json(payload))
}

/// 上传响应:影像与同步产出的分析结果
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub image: ImageResponse,
    pub analysis_result: AnalysisResponse,
}

/// 影像上传处理器，multipart表单:image文件加可选custom_identifier
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut custom_identifier: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(OctError::validation("body", e.to_string())))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("scan.png").to_string();
                file = Some((file_name, read_bytes(field).await?));
            }
            Some("custom_identifier") => custom_identifier = Some(read_text(field).await?),
            _ => continue,
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| ApiError(OctError::validation("image", "An image file is required.")))?;

    info!("Image upload from {} ({} bytes)", user.username, data.len());

    let (image, analysis) = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .upload_image(user.user_id, &file_name, &data, custom_identifier)
        .await?;

    let response = UploadResponse {
        image: ImageResponse::new(&image, &state.storage),
        analysis_result: AnalysisResponse::new(&analysis, &state.storage),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// 影像详情处理器
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let image = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .get_image(user.user_id, id)
        .await?;

    Ok(Json(ImageResponse::new(&image, &state.storage)))
}

// ========== 分析结果 ==========

/// 分析结果响应
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub id: Uuid,
    pub oct_image: Uuid,
    pub classification: String,
    pub findings: String,
    pub processed_image: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResponse {
    fn new(analysis: &AnalysisResult, storage: &MediaStore) -> Self {
        Self {
            id: analysis.id,
            oct_image: analysis.oct_image_id,
            classification: analysis.classification.clone(),
            findings: analysis.findings.clone(),
            processed_image: storage.url_for(analysis.processed_image_path.as_deref()),
            analyzed_at: analysis.analyzed_at,
        }
    }
}

/// 分析结果列表查询参数
#[derive(Debug, Deserialize)]
pub struct AnalysisQueryParams {
    pub oct_image: Option<Uuid>,
}

/// 分析结果列表处理器，范围收窄规则与影像列表一致
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(principal): OptionalAuthUser,
    Query(params): Query<AnalysisQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let analyses = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .list_analyses(principal.map(|user| user.user_id), params.oct_image)
        .await?;

    let payload: Vec<AnalysisResponse> = analyses
        .iter()
        .map(|analysis| AnalysisResponse::new(analysis, &state.storage))
        .collect();
    Ok(Json(payload))
}

/// 分析结果详情处理器
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let analysis = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .get_analysis(user.user_id, id)
        .await?;

    Ok(Json(AnalysisResponse::new(&analysis, &state.storage)))
}

// ========== 评审 ==========

/// 评审响应
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub analysis_result: Uuid,
    pub doctor: Uuid,
    pub rating: i32,
    pub comments: String,
    pub review_date: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            analysis_result: review.analysis_result_id,
            doctor: review.doctor_id,
            rating: review.rating,
            comments: review.comments,
            review_date: review.review_date,
        }
    }
}

/// 评审列表查询参数
#[derive(Debug, Deserialize)]
pub struct ReviewQueryParams {
    pub analysis_result: Option<Uuid>,
    pub ordering: Option<String>,
}

/// 评审创建请求
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub analysis_result: Uuid,
    pub rating: i32,
    #[serde(default)]
    pub comments: String,
}

/// 评审更新请求，未给出的字段保持不变
#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i32>,
    pub comments: Option<String>,
}

/// 评审列表处理器，可按分析结果过滤、按评审时间或评分排序
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<ReviewQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let ordering = match params.ordering.as_deref() {
        Some(raw) => ReviewOrdering::parse(raw).ok_or_else(|| {
            ApiError(OctError::validation(
                "ordering",
                "Supported orderings: review_date, -review_date, rating, -rating.",
            ))
        })?,
        None => ReviewOrdering::default(),
    };

    let reviews = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .list_reviews(params.analysis_result, ordering)
        .await?;

    let payload: Vec<ReviewResponse> = reviews.into_iter().map(ReviewResponse::from).collect();
    Ok(Json(payload))
}

/// 评审创建处理器
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let review = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .create_review(user.user_id, request.analysis_result, request.rating, request.comments)
        .await?;

    Ok((StatusCode::CREATED, Json(ReviewResponse::from(review))))
}

/// 评审详情处理器
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let review = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .get_review(id)
        .await?;

    Ok(Json(ReviewResponse::from(review)))
}

/// 评审更新处理器，仅作者本人可写
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let review = RecordService::new(&state.pool, &state.storage, state.oracle.as_ref())
        .update_review(user.user_id, id, request.rating, request.comments)
        .await?;

    Ok(Json(ReviewResponse::from(review)))
}

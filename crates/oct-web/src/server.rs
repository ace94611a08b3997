//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use oct_analysis::ClassificationOracle;
use oct_core::Result;
use oct_database::DatabasePool;
use oct_storage::MediaStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{login_handler, refresh_handler, signup_handler, AuthService};
use crate::handlers::{
    api_root, create_review, get_analysis, get_image, get_review, health, list_analyses,
    list_images, list_reviews, me, update_profile, update_review, upload_image,
};

/// 影像上传的请求体上限
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// 各处理器共享的应用状态
pub struct AppState {
    pub pool: DatabasePool,
    pub storage: MediaStore,
    pub oracle: Arc<dyn ClassificationOracle>,
    pub auth: AuthService,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        let app = Self::create_app(state);

        Self { addr, app }
    }

    fn create_app(state: Arc<AppState>) -> Router {
        let media_root = state.storage.root().to_path_buf();

        Router::new()
            // 根路径
            .route("/", get(api_root))

            // 健康检查
            .route("/health", get(health))

            // API路由
            .nest("/api/v1", api_routes())

            // 媒体文件服务
            .nest_service("/media", ServeDir::new(media_root))

            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// API v1 路由
///
/// 认证由提取器完成:注册、登录与刷新开放，其余要求Bearer令牌，
/// 影像与分析结果的列表接口对无效主体退化为空集合。
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // 认证(无需令牌)
        .route("/doctors/signup", post(signup_handler))
        .route("/token", post(login_handler))
        .route("/token/refresh", post(refresh_handler))

        // 档案
        .route("/doctors/me", get(me))
        .route("/doctors/update_profile", put(update_profile).patch(update_profile))

        // 影像与分析结果
        .route("/images", get(list_images).post(upload_image))
        .route("/images/:id", get(get_image))
        .route("/analyses", get(list_analyses))
        .route("/analyses/:id", get(get_analysis))

        // 评审
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/reviews/:id", get(get_review).put(update_review).patch(update_review))
}

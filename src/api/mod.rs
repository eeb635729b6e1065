//! API 路由模块

mod health;
mod ocr;
mod reply;
mod suggest;

pub use health::health_routes;
pub use ocr::ocr_routes;
pub use reply::reply_routes;
pub use suggest::suggest_routes;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

/// 创建所有 API 路由
///
/// 限流只作用于 POST 接口，health 不受限。
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    let limited = Router::new()
        .merge(suggest_routes())
        .merge(ocr_routes())
        .merge(reply_routes())
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit_middleware));

    Router::new()
        .merge(health_routes())
        .merge(limited)
        .with_state(state)
}

/// 生成 8 位请求 ID
pub(crate) fn new_rid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 客户端标识：x-forwarded-for 的第一跳 → 连接地址 → unknown
fn client_key(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// 限流中间件
async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&req);
    if !state.rate_limiter.check_and_consume(&key) {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

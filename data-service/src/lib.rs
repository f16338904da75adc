//! Oyda 数据网关
//!
//! 按请求连接调用方指定的 PostgreSQL 数据库，提供：
//! - 表的存在性检查、创建与删除
//! - 行的查询、插入、更新与删除（条件经结构化解析，值全部参数化）
//! - 目标库内的 `dependencies` 与 `devs` 注册表

pub mod dependencies;
pub mod dev_keys;
pub mod handlers;
pub mod mapper;
pub mod operation;
pub mod package_registry;
pub mod predicate;
pub mod query_builder;
pub mod routes;
pub mod rows;
pub mod schema;
pub mod service;
pub mod session;
pub mod state;

use axum::{middleware, routing::get, Json, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::middleware::request_id_middleware;
use state::AppState;

pub const SERVICE_NAME: &str = "data-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "数据网关 API",
        version = "0.1.0",
        description = "按请求连接目标数据库的表/行操作网关"
    ),
    paths(
        handlers::table_exists,
        handlers::create_table,
        handlers::drop_table,
        handlers::select_table,
        handlers::select_rows,
        handlers::select_columns,
        handlers::insert_row,
        handlers::update_row,
        handlers::delete_row,
        handlers::set_oydabase,
        handlers::get_dependencies,
        handlers::add_dependency,
        handlers::dev_key,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectionParams,
        common::models::ConnectRequest,
        common::models::TableRequest,
        common::models::CreateTableRequest,
        common::models::SelectRowsRequest,
        common::models::SelectColumnsRequest,
        common::models::InsertRowRequest,
        common::models::UpdateRowRequest,
        common::models::DeleteRowRequest,
        common::models::AddDependencyRequest,
        common::models::DevKeyRequest,
        common::models::DependencyEntry,
        handlers::ExistsData,
        handlers::MessageData,
        handlers::RowsData,
        handlers::ConnectData,
        handlers::DependenciesData,
        handlers::AddDependencyData,
        handlers::DevKeyData,
        handlers::HealthResponse,
    )),
    tags(
        (name = "tables", description = "表结构端点"),
        (name = "rows", description = "行操作端点"),
        (name = "registry", description = "依赖与开发者密钥注册表端点"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// 构建完整路由：网关路由、OpenAPI 文档及中间件层
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

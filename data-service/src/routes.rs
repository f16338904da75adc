//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/table_exists", post(handlers::table_exists))
        .route("/api/create_table", post(handlers::create_table))
        .route("/api/drop_table", post(handlers::drop_table))
        .route("/api/select_table", post(handlers::select_table))
        .route("/api/select_rows", post(handlers::select_rows))
        .route("/api/select_columns", post(handlers::select_columns))
        .route("/api/insert_row", post(handlers::insert_row))
        .route("/api/update_row", post(handlers::update_row))
        .route("/api/delete_row", post(handlers::delete_row))
        .route("/api/set_oydabase", post(handlers::set_oydabase))
        .route("/api/get_dependencies", post(handlers::get_dependencies))
        .route("/api/add_dependency", post(handlers::add_dependency))
        .route("/api/dev_key", post(handlers::dev_key))
        .route("/api/health", get(handlers::health_check))
}

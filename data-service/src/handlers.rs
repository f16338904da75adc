//! Handler模块
//!
//! 每个网关路由对应一个处理函数。处理函数把请求体转换为 [`Operation`]
//!（参数检查都在这里完成，早于建立连接），交给网关服务并包装结果。

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::{
    AddDependencyRequest, ConnectRequest, CreateTableRequest, DeleteRowRequest, DependencyEntry,
    DevKeyRequest, InsertRowRequest, Record, SelectColumnsRequest, SelectRowsRequest,
    TableRequest, UpdateRowRequest,
};
use common::response::ApiResponse;

use crate::operation::{Operation, Outcome};
use crate::service::GatewayServiceTrait;
use crate::state::AppState;
use crate::SERVICE_NAME;

/// 以网关错误格式拒绝请求的 JSON 请求体提取器
///
/// 空请求体视为缺少参数；不是预期结构的 JSON 对象视为校验错误。
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::MissingParameter("request body".into()));
        }
        serde_json::from_slice(&bytes)
            .map(Payload)
            .map_err(|e| AppError::Validation(format!("invalid JSON body: {}", e)))
    }
}

fn respond<T: Serialize>(data: T, request_id: &RequestId, started: Instant) -> Json<ApiResponse<T>> {
    Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(started.elapsed().as_millis() as u64),
    )
}

fn unexpected(outcome: Outcome) -> AppError {
    AppError::Internal(format!("unexpected outcome: {:?}", outcome))
}

fn rows_of(outcome: Outcome) -> Result<Vec<Record>, AppError> {
    match outcome {
        Outcome::Rows(rows) => Ok(rows),
        other => Err(unexpected(other)),
    }
}

fn written(outcome: Outcome) -> Result<u64, AppError> {
    match outcome {
        Outcome::Written { rows_affected } => Ok(rows_affected),
        other => Err(unexpected(other)),
    }
}

/// 表存在性检查结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ExistsData {
    pub exists: bool,
}

/// 写操作结果
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageData {
    pub message: String,
    /// 行级写操作影响的行数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

/// 查询结果
#[derive(Debug, Serialize, ToSchema)]
pub struct RowsData {
    /// 按结果集顺序排列的记录，键按列顺序
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Record>,
    pub row_count: usize,
}

/// `set_oydabase` 结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectData {
    pub message: String,
    pub dev_key: i32,
}

/// 依赖列表
#[derive(Debug, Serialize, ToSchema)]
pub struct DependenciesData {
    pub dependencies: Vec<DependencyEntry>,
    /// `"name: version"` 形式的字符串
    pub labels: Vec<String>,
}

/// 添加依赖结果
#[derive(Debug, Serialize, ToSchema)]
pub struct AddDependencyData {
    pub message: String,
    pub dependency: DependencyEntry,
    /// 包已被记录时为 false
    pub created: bool,
}

/// 开发者密钥
#[derive(Debug, Serialize, ToSchema)]
pub struct DevKeyData {
    pub username: String,
    pub dev_key: i32,
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}

/// 检查表是否存在
#[utoipa::path(
    post,
    path = "/api/table_exists",
    tag = "tables",
    request_body = TableRequest,
    responses(
        (status = 200, description = "检查完成", body = ApiResponse<ExistsData>),
        (status = 400, description = "参数缺失或标识符无效"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn table_exists(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<TableRequest>,
) -> Result<Json<ApiResponse<ExistsData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::table_exists(req.table_name)?;
    match state.service.execute(req.connection, operation).await? {
        Outcome::Exists(exists) => Ok(respond(ExistsData { exists }, &request_id, started)),
        other => Err(unexpected(other)),
    }
}

/// 创建表（已存在时不做任何改变）
#[utoipa::path(
    post,
    path = "/api/create_table",
    tag = "tables",
    request_body = CreateTableRequest,
    responses(
        (status = 200, description = "表已创建", body = ApiResponse<MessageData>),
        (status = 400, description = "参数缺失、标识符或列类型无效"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn create_table(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<CreateTableRequest>,
) -> Result<Json<ApiResponse<MessageData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::create_table(req.table_name, req.columns)?;
    written(state.service.execute(req.connection, operation).await?)?;
    let data = MessageData {
        message: "Table created successfully".to_string(),
        rows_affected: None,
    };
    Ok(respond(data, &request_id, started))
}

/// 删除表
#[utoipa::path(
    post,
    path = "/api/drop_table",
    tag = "tables",
    request_body = TableRequest,
    responses(
        (status = 200, description = "表已删除", body = ApiResponse<MessageData>),
        (status = 400, description = "参数缺失或标识符无效"),
        (status = 500, description = "表不存在或连接失败")
    )
)]
pub async fn drop_table(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<TableRequest>,
) -> Result<Json<ApiResponse<MessageData>>, AppError> {
    let started = Instant::now();
    let table = req.table_name.clone().unwrap_or_default();
    let operation = Operation::drop_table(req.table_name)?;
    written(state.service.execute(req.connection, operation).await?)?;
    let data = MessageData {
        message: format!("Table {} dropped successfully", table),
        rows_affected: None,
    };
    Ok(respond(data, &request_id, started))
}

/// 返回整张表
#[utoipa::path(
    post,
    path = "/api/select_table",
    tag = "rows",
    request_body = TableRequest,
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<RowsData>),
        (status = 400, description = "参数缺失或标识符无效"),
        (status = 500, description = "表不存在或连接失败")
    )
)]
pub async fn select_table(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<TableRequest>,
) -> Result<Json<ApiResponse<RowsData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::select_rows(req.table_name, None)?;
    let rows = rows_of(state.service.execute(req.connection, operation).await?)?;
    Ok(respond(RowsData { row_count: rows.len(), rows }, &request_id, started))
}

/// 按条件查询行
#[utoipa::path(
    post,
    path = "/api/select_rows",
    tag = "rows",
    request_body = SelectRowsRequest,
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<RowsData>),
        (status = 400, description = "参数缺失、标识符或条件无效"),
        (status = 500, description = "表不存在或连接失败")
    )
)]
pub async fn select_rows(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<SelectRowsRequest>,
) -> Result<Json<ApiResponse<RowsData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::select_rows(req.table_name, req.conditions.as_ref())?;
    let rows = rows_of(state.service.execute(req.connection, operation).await?)?;
    Ok(respond(RowsData { row_count: rows.len(), rows }, &request_id, started))
}

/// 查询指定列
#[utoipa::path(
    post,
    path = "/api/select_columns",
    tag = "rows",
    request_body = SelectColumnsRequest,
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<RowsData>),
        (status = 400, description = "列列表为空、标识符或条件无效"),
        (status = 500, description = "表或列不存在，或连接失败")
    )
)]
pub async fn select_columns(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<SelectColumnsRequest>,
) -> Result<Json<ApiResponse<RowsData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::select_columns(req.table_name, req.columns, req.conditions.as_ref())?;
    let rows = rows_of(state.service.execute(req.connection, operation).await?)?;
    Ok(respond(RowsData { row_count: rows.len(), rows }, &request_id, started))
}

/// 插入一行
#[utoipa::path(
    post,
    path = "/api/insert_row",
    tag = "rows",
    request_body = InsertRowRequest,
    responses(
        (status = 200, description = "插入成功", body = ApiResponse<MessageData>),
        (status = 400, description = "参数缺失或标识符无效"),
        (status = 500, description = "执行失败")
    )
)]
pub async fn insert_row(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<InsertRowRequest>,
) -> Result<Json<ApiResponse<MessageData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::insert_row(req.table_name, req.row)?;
    let rows_affected = written(state.service.execute(req.connection, operation).await?)?;
    let data = MessageData {
        message: "Row inserted successfully".to_string(),
        rows_affected: Some(rows_affected),
    };
    Ok(respond(data, &request_id, started))
}

/// 更新满足条件的行
#[utoipa::path(
    post,
    path = "/api/update_row",
    tag = "rows",
    request_body = UpdateRowRequest,
    responses(
        (status = 200, description = "更新成功", body = ApiResponse<MessageData>),
        (status = 400, description = "参数缺失、标识符或条件无效"),
        (status = 500, description = "执行失败")
    )
)]
pub async fn update_row(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<UpdateRowRequest>,
) -> Result<Json<ApiResponse<MessageData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::update_row(req.table_name, req.row, req.condition.as_ref())?;
    let rows_affected = written(state.service.execute(req.connection, operation).await?)?;
    let data = MessageData {
        message: "Row updated successfully".to_string(),
        rows_affected: Some(rows_affected),
    };
    Ok(respond(data, &request_id, started))
}

/// 删除满足条件的行（条件必填）
#[utoipa::path(
    post,
    path = "/api/delete_row",
    tag = "rows",
    request_body = DeleteRowRequest,
    responses(
        (status = 200, description = "删除成功", body = ApiResponse<MessageData>),
        (status = 400, description = "缺少条件或条件无效"),
        (status = 500, description = "执行失败")
    )
)]
pub async fn delete_row(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<DeleteRowRequest>,
) -> Result<Json<ApiResponse<MessageData>>, AppError> {
    let started = Instant::now();
    let operation = Operation::delete_row(req.table_name, req.condition.as_ref())?;
    let rows_affected = written(state.service.execute(req.connection, operation).await?)?;
    let data = MessageData {
        message: "Row deleted successfully".to_string(),
        rows_affected: Some(rows_affected),
    };
    Ok(respond(data, &request_id, started))
}

/// 连接目标库并初始化注册表
#[utoipa::path(
    post,
    path = "/api/set_oydabase",
    tag = "registry",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "已连接", body = ApiResponse<ConnectData>),
        (status = 400, description = "连接参数缺失"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn set_oydabase(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<ConnectRequest>,
) -> Result<Json<ApiResponse<ConnectData>>, AppError> {
    let started = Instant::now();
    let report = state.service.bootstrap(req.connection).await?;
    let data = ConnectData {
        message: report.message(),
        dev_key: report.dev_key,
    };
    Ok(respond(data, &request_id, started))
}

/// 列出依赖
#[utoipa::path(
    post,
    path = "/api/get_dependencies",
    tag = "registry",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "依赖列表", body = ApiResponse<DependenciesData>),
        (status = 400, description = "连接参数缺失"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn get_dependencies(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<ConnectRequest>,
) -> Result<Json<ApiResponse<DependenciesData>>, AppError> {
    let started = Instant::now();
    match state.service.execute(req.connection, Operation::GetDependencies).await? {
        Outcome::Dependencies(dependencies) => {
            let labels = dependencies.iter().map(DependencyEntry::label).collect();
            Ok(respond(DependenciesData { dependencies, labels }, &request_id, started))
        }
        other => Err(unexpected(other)),
    }
}

/// 添加依赖（版本从包仓库获取）
#[utoipa::path(
    post,
    path = "/api/add_dependency",
    tag = "registry",
    request_body = AddDependencyRequest,
    responses(
        (status = 201, description = "依赖已添加", body = ApiResponse<AddDependencyData>),
        (status = 200, description = "依赖已存在", body = ApiResponse<AddDependencyData>),
        (status = 400, description = "包名无效或包不存在"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn add_dependency(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<AddDependencyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AddDependencyData>>), AppError> {
    let started = Instant::now();
    req.validate()?;
    let operation = Operation::add_dependency(req.package_name)?;
    match state.service.execute(req.connection, operation).await? {
        Outcome::Dependency { entry, created } => {
            let (status, message) = if created {
                (
                    StatusCode::CREATED,
                    format!("Package {} added with version {}", entry.name, entry.version),
                )
            } else {
                (
                    StatusCode::OK,
                    format!("Package {} already exists with version {}", entry.name, entry.version),
                )
            };
            let data = AddDependencyData {
                message,
                dependency: entry,
                created,
            };
            Ok((status, respond(data, &request_id, started)))
        }
        other => Err(unexpected(other)),
    }
}

/// 获取或分配开发者密钥
#[utoipa::path(
    post,
    path = "/api/dev_key",
    tag = "registry",
    request_body = DevKeyRequest,
    responses(
        (status = 200, description = "开发者密钥", body = ApiResponse<DevKeyData>),
        (status = 400, description = "用户名缺失或过长"),
        (status = 500, description = "连接或执行失败")
    )
)]
pub async fn dev_key(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Payload(req): Payload<DevKeyRequest>,
) -> Result<Json<ApiResponse<DevKeyData>>, AppError> {
    let started = Instant::now();
    req.validate()?;
    let username = req.username.clone().unwrap_or_default();
    let operation = Operation::get_or_create_dev_key(req.username)?;
    match state.service.execute(req.connection, operation).await? {
        Outcome::DevKey(dev_key) => Ok(respond(DevKeyData { username, dev_key }, &request_id, started)),
        other => Err(unexpected(other)),
    }
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

//! 网关服务模块
//!
//! 每次调用用请求自带的凭据打开会话，执行一个操作，并在所有退出路径上关闭
//! 会话。包括建立连接在内的整个过程受时间预算约束；超时后 future 被丢弃，
//! 会话及其套接字随之释放。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{ConnectionParams, ConnectionSpec};

use crate::dependencies;
use crate::dev_keys;
use crate::operation::{Operation, Outcome};
use crate::package_registry::PackageRegistry;
use crate::rows;
use crate::schema;
use crate::session::Session;

/// `set_oydabase` 在目标数据库上的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// `host:port/database`
    pub address: String,
    /// 本次调用是否创建了 `dependencies` 表
    pub dependencies_created: bool,
    /// 当前连接用户的开发者密钥
    pub dev_key: i32,
}

impl Bootstrap {
    pub fn message(&self) -> String {
        if self.dependencies_created {
            format!("Connected to Oydabase @ {}. Dependencies table created", self.address)
        } else {
            format!("Connected to Oydabase @ {}: Dependencies exist", self.address)
        }
    }
}

/// 网关服务 trait
#[async_trait]
pub trait GatewayServiceTrait: Send + Sync {
    /// 在 `params` 指定的数据库上执行 `operation`
    async fn execute(&self, params: ConnectionParams, operation: Operation) -> AppResult<Outcome>;

    /// 准备两张注册表并登记当前连接用户
    async fn bootstrap(&self, params: ConnectionParams) -> AppResult<Bootstrap>;
}

/// 按请求建立连接的数据库网关
pub struct GatewayService {
    config: AppConfig,
    registry: Arc<dyn PackageRegistry>,
}

impl GatewayService {
    pub fn new(config: AppConfig, registry: Arc<dyn PackageRegistry>) -> Self {
        Self { config, registry }
    }

    /// 调用方给出的时间预算，否则使用配置默认值；0 视为未设置
    fn time_budget(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.operation_timeout())
    }

    async fn run(&self, spec: &ConnectionSpec, operation: Operation) -> AppResult<Outcome> {
        let mut session = Session::open(spec, self.config.connect_timeout()).await?;
        let result = self.dispatch(&mut session, operation).await;
        session.close().await;
        result
    }

    async fn dispatch(&self, session: &mut Session, operation: Operation) -> AppResult<Outcome> {
        match operation {
            Operation::TableExists { table } => schema::table_exists(session, &table).await.map(Outcome::Exists),
            Operation::CreateTable { table, columns } => {
                schema::create_table(session, &table, &columns).await?;
                Ok(Outcome::Written { rows_affected: 0 })
            }
            Operation::DropTable { table } => {
                schema::drop_table(session, &table).await?;
                Ok(Outcome::Written { rows_affected: 0 })
            }
            Operation::SelectRows { table, filter } => rows::select_rows(session, &table, filter.as_ref())
                .await
                .map(Outcome::Rows),
            Operation::SelectColumns { table, columns, filter } => {
                rows::select_columns(session, &table, &columns, filter.as_ref())
                    .await
                    .map(Outcome::Rows)
            }
            Operation::InsertRow { table, row } => rows::insert_row(session, &table, &row)
                .await
                .map(|rows_affected| Outcome::Written { rows_affected }),
            Operation::UpdateRow {
                table,
                assignments,
                filter,
            } => rows::update_row(session, &table, &assignments, &filter)
                .await
                .map(|rows_affected| Outcome::Written { rows_affected }),
            Operation::DeleteRow { table, filter } => rows::delete_row(session, &table, &filter)
                .await
                .map(|rows_affected| Outcome::Written { rows_affected }),
            Operation::GetDependencies => {
                dependencies::ensure_table(session).await?;
                dependencies::list(session).await.map(Outcome::Dependencies)
            }
            Operation::AddDependency { package } => {
                dependencies::ensure_table(session).await?;
                let (entry, created) = dependencies::add(session, self.registry.as_ref(), &package).await?;
                Ok(Outcome::Dependency { entry, created })
            }
            Operation::GetOrCreateDevKey { username } => {
                dev_keys::ensure_table(session).await?;
                dev_keys::get_or_create(session, &username, self.config.dev_key_max_attempts)
                    .await
                    .map(Outcome::DevKey)
            }
        }
    }

    async fn run_bootstrap(&self, spec: &ConnectionSpec) -> AppResult<Bootstrap> {
        let mut session = Session::open(spec, self.config.connect_timeout()).await?;
        let result = async {
            let dependencies_created = dependencies::ensure_table(&mut session).await?;
            dev_keys::ensure_table(&mut session).await?;
            let dev_key =
                dev_keys::get_or_create(&mut session, &spec.user, self.config.dev_key_max_attempts).await?;
            Ok::<_, AppError>(Bootstrap {
                address: session.address().to_string(),
                dependencies_created,
                dev_key,
            })
        }
        .await;
        session.close().await;
        result
    }
}

#[async_trait]
impl GatewayServiceTrait for GatewayService {
    async fn execute(&self, params: ConnectionParams, operation: Operation) -> AppResult<Outcome> {
        let budget = self.time_budget(params.timeout_ms);
        let spec = params.into_spec()?;
        let kind = operation.kind();
        let started = Instant::now();

        let result = tokio::time::timeout(budget, self.run(&spec, operation))
            .await
            .unwrap_or_else(|_| Err(AppError::Timeout(budget.as_millis() as u64)));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(operation = kind, address = %spec.address(), elapsed_ms, "操作完成"),
            Err(e) => tracing::warn!(operation = kind, address = %spec.address(), elapsed_ms, error = %e, "操作失败"),
        }
        result
    }

    async fn bootstrap(&self, params: ConnectionParams) -> AppResult<Bootstrap> {
        let budget = self.time_budget(params.timeout_ms);
        let spec = params.into_spec()?;

        let result = tokio::time::timeout(budget, self.run_bootstrap(&spec))
            .await
            .unwrap_or_else(|_| Err(AppError::Timeout(budget.as_millis() as u64)));

        if let Err(e) = &result {
            tracing::warn!(address = %spec.address(), error = %e, "初始化失败");
        }
        result
    }
}

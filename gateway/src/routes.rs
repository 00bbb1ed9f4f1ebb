//! 路由装配
//!
//! 页面路由挂 route_guard（重定向语义），/api 路由挂 api_guard
//! （401/403 语义）。受保护路径清单集中在 default_route_table，
//! 不从路由结构推断。

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use crewdesk_access::{Action, Resource};
use crewdesk_errors::AppError;
use crewdesk_telemetry::ReadinessStatus;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::gate::render_gated;
use crate::middleware::{
    AuthPrincipal, Required, Requirement, RouteTable, api_guard, route_guard,
};
use crate::state::GatewayState;
use crate::{auth, policy_api};

/// 受保护页面路径清单
///
/// 工作区页面都要求对应资源的 view 权限，仪表盘只要求已认证。
/// 登录页、拒绝页和首页保持公开。
pub fn default_route_table() -> RouteTable {
    RouteTable::new([
        ("/dashboard", Requirement::Authenticated),
        ("/dashboard/*", Requirement::Authenticated),
        ("/projects", Requirement::Permission(Resource::Projects, Action::View)),
        ("/projects/*", Requirement::Permission(Resource::Projects, Action::View)),
        ("/tasks", Requirement::Permission(Resource::Tasks, Action::View)),
        ("/tasks/*", Requirement::Permission(Resource::Tasks, Action::View)),
        ("/team", Requirement::Permission(Resource::Team, Action::View)),
        ("/team/*", Requirement::Permission(Resource::Team, Action::View)),
        ("/finance", Requirement::Permission(Resource::Finance, Action::View)),
        ("/finance/*", Requirement::Permission(Resource::Finance, Action::View)),
    ])
}

async fn index() -> Html<&'static str> {
    Html("<h1>Crewdesk</h1><p><a href=\"/dashboard\">Open workspace</a></p>")
}

async fn login_page() -> Html<&'static str> {
    Html("<h1>Sign in</h1><p>POST credentials to /api/auth/login</p>")
}

async fn denied_page() -> Html<&'static str> {
    Html("<h1>Access denied</h1><p>You do not have permission to view this page.</p>")
}

async fn dashboard_page(AuthPrincipal(principal): AuthPrincipal) -> Html<String> {
    Html(format!(
        "<h1>Dashboard</h1><p>Signed in as {}</p>\
         <div hx-get=\"/dashboard/finance\" hx-trigger=\"load\"></div>",
        principal.email
    ))
}

/// 仪表盘的财务概览片段
///
/// 无 finance:view 的主体看到降级占位，而不是被整页拒绝。
async fn dashboard_finance_partial(
    State(state): State<GatewayState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Response {
    render_gated(
        state.checker.as_ref(),
        &principal,
        Resource::Finance,
        Action::View,
        || Html("<section id=\"finance-summary\">Finance summary</section>").into_response(),
        Some(|| {
            Html("<section id=\"finance-summary\">Finance summary is not available for your role</section>")
                .into_response()
        }),
    )
}

async fn projects_page() -> Html<&'static str> {
    Html("<h1>Projects</h1>")
}

async fn tasks_page() -> Html<&'static str> {
    Html("<h1>Tasks</h1>")
}

async fn team_page() -> Html<&'static str> {
    Html("<h1>Team</h1>")
}

async fn finance_page() -> Html<&'static str> {
    Html("<h1>Finance</h1>")
}

async fn health() -> &'static str {
    "OK"
}

/// 就绪检查：策略快照必须存在且矩阵全覆盖
async fn ready(State(state): State<GatewayState>) -> (StatusCode, Json<ReadinessStatus>) {
    let snapshot = state.store.snapshot();

    let mut status = ReadinessStatus::new();
    let total = snapshot.matrix.is_total();
    status.add_check(
        "policy-matrix",
        total,
        if total {
            None
        } else {
            Some("role permission matrix is missing rows".to_string())
        },
    );

    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    pub id: uuid::Uuid,
    pub name: String,
}

/// POST /api/projects
///
/// 授权由 api_guard 完成，处理器只做业务校验。
async fn create_project(
    AuthPrincipal(principal): AuthPrincipal,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<CreateProjectResponse>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Project name must not be empty").into());
    }

    let id = uuid::Uuid::now_v7();
    info!(project_id = %id, created_by = %principal.id, "Project created");
    Ok((
        StatusCode::CREATED,
        Json(CreateProjectResponse {
            id,
            name: name.to_string(),
        }),
    ))
}

fn policy_routes(state: GatewayState) -> Router<GatewayState> {
    Router::new()
        .route("/roles", get(policy_api::get_roles))
        .route("/roles/{role}", put(policy_api::put_role_defaults))
        .route(
            "/overrides/{principal_id}",
            get(policy_api::get_override)
                .put(policy_api::put_override)
                .delete(policy_api::delete_override),
        )
        .layer(middleware::from_fn_with_state(state, api_guard))
}

pub fn build_router(state: GatewayState) -> Router {
    let pages = Router::new()
        .route("/", get(index))
        .route("/login", get(login_page))
        .route("/denied", get(denied_page))
        .route("/dashboard", get(dashboard_page))
        .route("/dashboard/finance", get(dashboard_finance_partial))
        .route("/projects", get(projects_page))
        .route("/tasks", get(tasks_page))
        .route("/team", get(team_page))
        .route("/finance", get(finance_page))
        .layer(middleware::from_fn_with_state(state.clone(), route_guard));

    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route(
            "/auth/me",
            get(auth::me).layer(middleware::from_fn_with_state(state.clone(), api_guard)),
        )
        .route(
            "/projects",
            post(create_project)
                .layer::<_, std::convert::Infallible>(middleware::from_fn_with_state(
                    state.clone(),
                    api_guard,
                ))
                .layer(Extension(Required(Requirement::Permission(
                    Resource::Projects,
                    Action::Create,
                )))),
        )
        .nest("/policy", policy_routes(state.clone()));

    Router::new()
        .merge(pages)
        .nest("/api", api)
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

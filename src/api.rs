//! HTTP front-end over [`Pier`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::engine::{Volume, VolumeId};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobId};
use crate::pier::Pier;
use crate::services::{Service, ServiceId};

#[derive(Debug, Clone)]
pub struct ApiServer {
    pier: Arc<Pier>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    /// Build context, relative to the configured build root.
    pub build_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub service_id: ServiceId,
    pub input: String,
}

/// Maps pier errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            err if err.is_not_found() => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Configuration(_) | Error::Version { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiServer {
    pub fn new(pier: Arc<Pier>, config: Arc<Config>) -> Self {
        Self { pier, config }
    }

    async fn health(AxumState(server): AxumState<ApiServer>) -> impl IntoResponse {
        Json(json!({ "engine": server.pier.engine_available().await }))
    }

    async fn list_services(AxumState(server): AxumState<ApiServer>) -> Json<Vec<Service>> {
        Json(server.pier.list_services())
    }

    async fn get_service(
        AxumState(server): AxumState<ApiServer>,
        Path(id): Path<String>,
    ) -> ApiResult<Json<Service>> {
        Ok(Json(server.pier.get_service(&ServiceId(id))?))
    }

    async fn build_service(
        AxumState(server): AxumState<ApiServer>,
        Json(request): Json<BuildRequest>,
    ) -> ApiResult<(StatusCode, Json<Service>)> {
        let dir = server.config.build_dir(&request.build_dir)?;
        let service = server.pier.build_service(&dir).await?;
        Ok((StatusCode::CREATED, Json(service)))
    }

    async fn list_jobs(AxumState(server): AxumState<ApiServer>) -> Json<Vec<Job>> {
        Json(server.pier.list_jobs())
    }

    async fn get_job(
        AxumState(server): AxumState<ApiServer>,
        Path(id): Path<String>,
    ) -> ApiResult<Json<Job>> {
        Ok(Json(server.pier.get_job(&JobId(id))?))
    }

    async fn run_service(
        AxumState(server): AxumState<ApiServer>,
        Json(request): Json<RunRequest>,
    ) -> ApiResult<(StatusCode, Json<Job>)> {
        let service = server.pier.get_service(&request.service_id)?;
        let job = server.pier.run_service(&service, request.input);
        Ok((StatusCode::CREATED, Json(job)))
    }

    async fn remove_job(
        AxumState(server): AxumState<ApiServer>,
        Path(id): Path<String>,
    ) -> ApiResult<Json<Job>> {
        Ok(Json(server.pier.remove_job(&JobId(id)).await?))
    }

    async fn job_volumes(
        AxumState(server): AxumState<ApiServer>,
        Path(id): Path<String>,
    ) -> ApiResult<Json<Vec<Volume>>> {
        Ok(Json(server.pier.job_volumes(&JobId(id)).await?))
    }

    async fn inspect_volume(
        AxumState(server): AxumState<ApiServer>,
        Path(id): Path<String>,
    ) -> ApiResult<Json<Volume>> {
        Ok(Json(server.pier.inspect_volume(&VolumeId(id)).await?))
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/api/health", get(ApiServer::health))
            .route(
                "/api/services",
                get(ApiServer::list_services).post(ApiServer::build_service),
            )
            .route("/api/services/{id}", get(ApiServer::get_service))
            .route(
                "/api/jobs",
                get(ApiServer::list_jobs).post(ApiServer::run_service),
            )
            .route(
                "/api/jobs/{id}",
                get(ApiServer::get_job).delete(ApiServer::remove_job),
            )
            .route("/api/jobs/{id}/volumes", get(ApiServer::job_volumes))
            .route("/api/volumes/{id}", get(ApiServer::inspect_volume))
            .with_state(self)
    }

    pub async fn start_server(self) -> Result<()> {
        let address = format!("{}:{}", self.config.server.address, self.config.server.port);
        let listener = TcpListener::bind(&address).await?;
        info!(%address, "listening");

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

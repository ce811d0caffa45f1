// src/routes.rs
use log::info;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::error::ApiError;
use crate::handlers::report::{get_health, get_report, ReportQuery};
use crate::services::orchestrator::{Collectors, OrchestratorOptions};

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = e.to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(
    collectors: Collectors,
    options: OrchestratorOptions,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let collectors_filter = warp::any().map(move || collectors.clone());
    let options_filter = warp::any().map(move || options.clone());

    let report_route = warp::path!("api" / "v1" / "report" / String)
        .and(warp::get())
        .and(warp::query::<ReportQuery>())
        .and(collectors_filter)
        .and(options_filter)
        .and_then(get_report);

    let health_route = warp::path!("api" / "v1" / "health")
        .and(warp::get())
        .and_then(get_health);

    info!("All routes configured successfully.");

    report_route.or(health_route).recover(handle_rejection)
}

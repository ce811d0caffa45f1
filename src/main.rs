// src/main.rs
use chrono::Utc;
use chrono_tz::Asia::Seoul;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use warp::Filter;

use stock_report::config::Settings;
use stock_report::models::{DateRange, FeatureToggles};
use stock_report::routes;
use stock_report::services::batch::{run_batch, BatchRequest};
use stock_report::services::orchestrator::{Collectors, OrchestratorOptions};
use stock_report::BoxError;

const SCHEDULED_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let settings = Arc::new(Settings::from_env());
    let collectors = Collectors::from_settings(&settings)?;
    let options = settings.orchestrator_options();

    for (source, ready) in [
        ("DART", settings.has_dart()),
        ("Naver news", settings.has_naver()),
        ("OpenAI", settings.has_openai()),
    ] {
        if !ready {
            warn!("{} credentials not set; that section will be reported as unavailable", source);
        }
    }

    // Held so the scheduler lives as long as the server.
    let _scheduler = match (&settings.report_schedule, settings.report_codes.is_empty()) {
        (Some(cron), false) => match start_scheduler(cron, settings.clone(), collectors.clone(), options.clone()).await {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                error!("Could not start report schedule {:?}: {}", cron, e);
                None
            }
        },
        (Some(_), true) => {
            warn!("REPORT_SCHEDULE is set but REPORT_CODES is empty; no scheduled runs");
            None
        }
        _ => None,
    };

    let addr: SocketAddr = ([0, 0, 0, 0], settings.port).into();
    info!("Will bind to: {}", addr);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET"]);

    let api = routes::routes(collectors, options).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}

async fn start_scheduler(
    cron: &str,
    settings: Arc<Settings>,
    collectors: Collectors,
    options: OrchestratorOptions,
) -> Result<JobScheduler, BoxError> {
    let scheduler = JobScheduler::new().await.map_err(|e| format!("{:?}", e))?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let settings = settings.clone();
        let collectors = collectors.clone();
        let options = options.clone();
        Box::pin(async move {
            let today = Utc::now().with_timezone(&Seoul).date_naive();
            let request = BatchRequest {
                codes: settings.report_codes.clone(),
                range: DateRange::trailing(today, SCHEDULED_DAYS),
                toggles: FeatureToggles::default(),
                output_dir: settings.output_dir.clone(),
                max_reports: settings.max_reports,
                deliver: true,
            };
            info!("Scheduled batch for {:?}", request.codes);
            match run_batch(&settings, &collectors, &options, &request).await {
                Ok(outcome) => info!(
                    "Scheduled batch done: {} reports, {} failures, notified: {}",
                    outcome.reports.len(),
                    outcome.failures.len(),
                    outcome.notified
                ),
                Err(e) => error!("Scheduled batch failed: {:#}", e),
            }
        })
    })
    .map_err(|e| format!("{:?}", e))?;

    scheduler.add(job).await.map_err(|e| format!("{:?}", e))?;
    scheduler.start().await.map_err(|e| format!("{:?}", e))?;
    info!("Report schedule registered: {}", cron);
    Ok(scheduler)
}

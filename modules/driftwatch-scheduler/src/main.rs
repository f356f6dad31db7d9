use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use driftwatch_common::Config;
use driftwatch_corpus::JsonlCorpus;
use driftwatch_scan::{HtmlReporter, HttpCrawler, HttpProber, ScanWorkflow, UrlDiffer};
use driftwatch_scheduler::notify::{NoopNotifier, Notifier, WebhookNotifier};
use driftwatch_scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("driftwatch=info".parse()?))
        .init();

    info!("Driftwatch starting...");

    // Load config
    let config = Config::from_env();
    config.log_startup();

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;

    // Assemble the pipeline
    let workflow_config = config.workflow();
    let corpus = Arc::new(JsonlCorpus::new(&workflow_config.corpus_base_path)?);
    let differ = UrlDiffer::new(config.differ(), corpus.clone());
    let crawler = Arc::new(HttpCrawler::new(http.clone()));
    let prober = Arc::new(HttpProber::new(
        http,
        workflow_config.probe_timeout,
        workflow_config.probe_threads,
    ));
    let reporter = Arc::new(HtmlReporter::new(&workflow_config.report_output_dir));
    let workflow = Arc::new(ScanWorkflow::new(
        workflow_config,
        crawler,
        prober,
        differ,
        corpus,
        reporter,
    ));

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NoopNotifier),
    };

    let scheduler = Scheduler::new(
        config.scheduler(),
        config.target_source.clone(),
        workflow,
        notifier,
    )
    .await?;

    // Ctrl-C unwinds the current sleep or the workflow's next check point
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop signal received, shutting down");
            signal_token.cancel();
        }
    });

    scheduler.run(&cancel).await?;

    info!("Driftwatch stopped");
    Ok(())
}

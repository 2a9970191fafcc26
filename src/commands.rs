use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vidtrack::config::Config;
use vidtrack::coordinator::TaskStatusCoordinator;
use vidtrack::job::{JobDescription, JobSubmitter, ProcessingConfig};
use vidtrack::observability::Metrics;
use vidtrack::service::{FileKind, HttpTaskService, ImageTags, TagThresholds, TaskService};
use vidtrack::task::{TaskState, TaskView};
use vidtrack::validator::{PathValidator, ValidationResult};

use crate::cli::{InfoArgs, ProcessingOverrides, SubmitArgs, TagArgs, TaskArgs, ValidateArgs, WatchArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything a command needs, built once from the configuration
pub struct Context {
    config: Config,
    service: Arc<dyn TaskService>,
    metrics: Arc<Metrics>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self, AnyError> {
        let service = HttpTaskService::new(config.http_config())?;
        info!(base_url = %service.base_url(), "Using processing service");
        Ok(Self {
            config,
            service: Arc::new(service),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validator(&self) -> PathValidator {
        PathValidator::new(self.service.clone())
            .with_debounce(self.config.validation.debounce.as_duration())
            .with_metrics(self.metrics.clone())
    }

    fn coordinator(&self, interval: Option<Duration>) -> TaskStatusCoordinator {
        TaskStatusCoordinator::new(self.service.clone())
            .with_interval(interval.unwrap_or_else(|| self.config.polling.interval.as_duration()))
            .with_metrics(self.metrics.clone())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        tracing::debug!(metrics = ?self.metrics.snapshot(), "Session counters");
    }
}

pub async fn submit(ctx: &Context, args: SubmitArgs) -> Result<(), AnyError> {
    if !args.skip_validation {
        check_paths(ctx, &args).await?;
    }

    let job = JobDescription::builder()
        .video_path(args.video_path)
        .reference_image_paths(args.references)
        .output_directory(args.output)
        .maybe_output_name(args.output_name)
        .config(apply_overrides(ctx.config.processing.clone(), &args.processing))
        .build();

    let submitter = JobSubmitter::new(ctx.service.clone()).with_metrics(ctx.metrics.clone());
    let result = submitter.submit(job).await?;

    match &result.batch {
        Some(batch) => {
            println!(
                "Submitted batch of {} videos, output in {}",
                batch.total_videos, batch.output_directory
            );
            for task_id in &result.all_task_ids {
                println!("  {}", task_id);
            }
            println!("Tracking {}", result.primary_task_id);
        }
        None => println!("Submitted task {}", result.primary_task_id),
    }

    if args.watch {
        follow(ctx, &result.primary_task_id, false, None).await?;
    }
    Ok(())
}

/// Refuse to submit unless every given path is confirmed valid
async fn check_paths(ctx: &Context, args: &SubmitArgs) -> Result<(), AnyError> {
    let validator = ctx.validator();

    let mut paths = vec![(args.video_path.as_str(), FileKind::Video)];
    paths.extend(
        args.references
            .iter()
            .filter(|path| !path.trim().is_empty())
            .map(|path| (path.as_str(), FileKind::Image)),
    );

    for (path, kind) in paths {
        match validator.validate(path, kind).await {
            ValidationResult::Valid => {}
            ValidationResult::Unknown => return Err(format!("{} path is empty", kind).into()),
            ValidationResult::Invalid { message } => {
                let reason = message.unwrap_or_else(|| "rejected by service".to_string());
                return Err(format!("invalid {} path '{}': {}", kind, path, reason).into());
            }
        }
    }
    Ok(())
}

fn apply_overrides(mut config: ProcessingConfig, overrides: &ProcessingOverrides) -> ProcessingConfig {
    if let Some(v) = overrides.max_frames {
        config.max_frames = v;
    }
    if let Some(v) = overrides.scene_change_threshold {
        config.scene_change_threshold = v;
    }
    if let Some(v) = overrides.quality_threshold {
        config.quality_threshold = v;
    }
    if let Some(v) = overrides.tag_threshold {
        config.tag_threshold = v;
    }
    if let Some(v) = overrides.character_tag_threshold {
        config.character_tag_threshold = v;
    }
    if let Some(v) = overrides.general_tag_threshold {
        config.general_tag_threshold = v;
    }
    if let Some(v) = overrides.batch_size {
        config.batch_size = v;
    }
    config
}

pub async fn status(ctx: &Context, args: TaskArgs) -> Result<(), AnyError> {
    let status = ctx.service.task_status(&args.task_id).await?;
    println!("{}", TaskView::derive(&status, None, Utc::now()));
    Ok(())
}

pub async fn watch(ctx: &Context, args: WatchArgs) -> Result<(), AnyError> {
    let interval = args.interval();
    follow(ctx, &args.task_id, args.cancel_on_interrupt, interval).await
}

/// Print every snapshot of `task_id` until it finishes or the user
/// interrupts.
async fn follow(
    ctx: &Context,
    task_id: &str,
    cancel_on_interrupt: bool,
    interval: Option<Duration>,
) -> Result<(), AnyError> {
    let coordinator = ctx.coordinator(interval);
    let mut updates = coordinator.subscribe();
    coordinator.start(task_id).await?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (view, finished) = {
            let session = updates.borrow_and_update();
            (session.view(Utc::now()), session.phase.is_finished())
        };
        if let Some(view) = view {
            println!("{}", view);
        }
        if finished {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut shutdown => {
                if cancel_on_interrupt {
                    match coordinator.cancel().await {
                        Ok(held) => println!("Cancelled, final state {}", held.state),
                        Err(e) => warn!(error = %e, "Cancel on interrupt failed"),
                    }
                }
                coordinator.stop();
                info!(task_id, "Stopped watching");
                return Ok(());
            }
        }
    }

    match coordinator.snapshot() {
        Some(last) if last.state == TaskState::Failed => Err(format!(
            "task {} failed: {}",
            task_id,
            last.error_message.as_deref().unwrap_or("no error message")
        )
        .into()),
        _ => Ok(()),
    }
}

pub async fn cancel(ctx: &Context, args: TaskArgs) -> Result<(), AnyError> {
    let response = ctx.service.cancel_task(&args.task_id).await?;
    if !response.success {
        let reason = response.message.unwrap_or_else(|| "service declined".to_string());
        return Err(format!("task {} not cancelled: {}", args.task_id, reason).into());
    }
    println!(
        "{}",
        response.message.unwrap_or_else(|| format!("Task {} cancelled", args.task_id))
    );
    Ok(())
}

pub async fn tasks(ctx: &Context) -> Result<(), AnyError> {
    let tasks = ctx.service.list_tasks().await?;
    if tasks.is_empty() {
        println!("No tasks");
    }
    let now = Utc::now();
    for task in &tasks {
        println!("{}", TaskView::derive(task, None, now));
    }
    Ok(())
}

pub async fn validate(ctx: &Context, args: ValidateArgs) -> Result<(), AnyError> {
    match ctx.validator().validate(&args.path, args.kind).await {
        ValidationResult::Valid => {
            println!("{} is a valid {} path", args.path, args.kind);
            Ok(())
        }
        ValidationResult::Unknown => Err("path is empty".into()),
        ValidationResult::Invalid { message } => Err(format!(
            "{} is not a valid {} path: {}",
            args.path,
            args.kind,
            message.as_deref().unwrap_or("rejected by service")
        )
        .into()),
    }
}

pub async fn info(ctx: &Context, args: InfoArgs) -> Result<(), AnyError> {
    let info = ctx.service.video_info(&args.video_path).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub async fn tag(ctx: &Context, args: TagArgs) -> Result<(), AnyError> {
    if args.match_request {
        let proposal = ctx
            .service
            .create_match_request(&args.images, args.min_confidence)
            .await?;
        for analysis in &proposal.reference_analysis {
            print_tags(analysis);
        }
        println!("{}", serde_json::to_string_pretty(&proposal.match_request)?);
        return Ok(());
    }

    let thresholds = thresholds(&ctx.config.processing, &args);
    let results = match args.images.as_slice() {
        [image] => vec![ctx.service.analyze_image(image, thresholds).await?],
        images => ctx.service.analyze_images(images, thresholds).await?,
    };
    for result in &results {
        print_tags(result);
    }
    Ok(())
}

fn thresholds(processing: &ProcessingConfig, args: &TagArgs) -> TagThresholds {
    let defaults = TagThresholds::from(processing);
    TagThresholds {
        general: args.general_threshold.unwrap_or(defaults.general),
        character: args.character_threshold.unwrap_or(defaults.character),
    }
}

fn print_tags(tags: &ImageTags) {
    println!("{}", tags.filename);
    for tag in tags.character_tags.iter().chain(&tags.general_tags) {
        println!("  {:<40} {:.2}", tag.name, tag.confidence);
    }
    for (rating, score) in &tags.ratings {
        println!("  rating:{:<33} {:.2}", rating, score);
    }
}

pub async fn model(ctx: &Context) -> Result<(), AnyError> {
    let info = ctx.service.model_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub async fn health(ctx: &Context) -> Result<(), AnyError> {
    let report = ctx.service.health().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_healthy() {
        return Err(format!("service is {}", report.status).into());
    }
    Ok(())
}

pub fn show_config(config: &Config) -> Result<(), AnyError> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Interrupt received");
}

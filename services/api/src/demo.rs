use crate::infra::{build_pipeline_with, LoggingNotifier, ServicePipeline};
use clap::Args;
use offerdesk::config::{AppConfig, ModerationConfig};
use offerdesk::error::AppError;
use offerdesk::workflows::moderation::{
    ClientEffects, ManualReviewQueue, MemorySubmissionStore, ModerationReport, NewSubmission,
    ReviewWorklist, StatusSynchronizer, SubmissionContent, SubmissionId, SubmissionKind,
    SubmissionStatusView, SubmitterTier, SyncHandle, TerminalAction, TerminalOutcome,
    TrustContext, UserId,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Minimum oracle confidence for automated decisions (0-100). Defaults to the configured value.
    #[arg(long)]
    pub(crate) threshold: Option<u8>,
    /// Client polling interval in milliseconds. Defaults to SYNC_POLL_INTERVAL_MS.
    #[arg(long)]
    pub(crate) poll_interval_ms: Option<u64>,
    /// Disable oracle-driven decisions so everything lands in the review queue.
    #[arg(long)]
    pub(crate) manual_only: bool,
    /// Print the final summary as JSON instead of text.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    submissions: Vec<SubmissionStatusView>,
    settled: Vec<TerminalOutcome>,
    notifications: usize,
}

#[derive(Clone, Default)]
struct ConsoleEffects {
    settled: Arc<Mutex<Vec<TerminalOutcome>>>,
}

impl ClientEffects for ConsoleEffects {
    fn on_status(&mut self, view: &SubmissionStatusView) {
        println!("    [{}] {}", view.submission_id, view.message);
    }

    fn on_terminal(&mut self, outcome: &TerminalOutcome) {
        println!(
            "    [{}] {} -> {}",
            outcome.submission_id,
            outcome.message,
            outcome.navigate_to.path()
        );
        if let Ok(mut settled) = self.settled.lock() {
            settled.push(outcome.clone());
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        threshold,
        poll_interval_ms,
        manual_only,
        json,
    } = args;

    let (moderation, poll_interval) = demo_settings(
        AppConfig::load()?,
        threshold,
        poll_interval_ms,
        manual_only,
    );
    let threshold = moderation.confidence_threshold;

    let store = Arc::new(MemorySubmissionStore::new());
    let notifier = Arc::new(LoggingNotifier::default());
    let pipeline = build_pipeline_with(&moderation, Arc::clone(&store), Arc::clone(&notifier));
    let synchronizer = StatusSynchronizer::new(Arc::clone(&store), poll_interval);
    let effects = ConsoleEffects::default();

    println!(
        "Marketplace moderation demo (threshold {threshold}%, polling every {}ms)",
        synchronizer.poll_interval().as_millis()
    );

    println!("\n1. Buyer posts a request");
    let request = laptop_request("buyer-demo");
    let Some((request_id, report)) = submit(&pipeline, request).await? else {
        return Ok(());
    };
    print_report(&report);
    let watch = synchronizer.watch(request_id.clone(), effects.clone());

    let queue = ManualReviewQueue::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(pipeline.clock()),
    );
    review_escalations(&queue).await?;
    settle(watch).await;

    let request_record = pipeline.get(&request_id)?;
    let mut ids = vec![request_id.clone()];

    if request_record.status.is_accepted() {
        println!("\n2. Seller responds with an offer");
        let offer = laptop_offer("seller-demo", &request_id);
        if let Some((offer_id, report)) = submit(&pipeline, offer).await? {
            print_report(&report);
            let watch = synchronizer.watch(offer_id.clone(), effects.clone());
            review_escalations(&queue).await?;
            settle(watch).await;
            ids.push(offer_id);
        }
    } else {
        println!("\n2. Request was not published; skipping the offer step");
    }

    println!("\n3. A spammy request is escalated to the review queue");
    let mut spam = laptop_request("buyer-spam");
    spam.content.title = "Easy money opportunity".to_string();
    spam.content.description = "Click here to get rich with this simple laptop offer".to_string();
    if let Some((spam_id, report)) = submit(&pipeline, spam).await? {
        print_report(&report);
        let watch = synchronizer.watch(spam_id.clone(), effects.clone());
        review_escalations(&queue).await?;
        settle(watch).await;
        ids.push(spam_id);
    }

    let mut submissions = Vec::with_capacity(ids.len());
    for id in &ids {
        submissions.push(pipeline.get(id)?.status_view());
    }
    let summary = DemoSummary {
        submissions,
        settled: effects
            .settled
            .lock()
            .map(|settled| settled.clone())
            .unwrap_or_default(),
        notifications: notifier.delivered(),
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Summary unavailable: {err}"),
        }
        return Ok(());
    }

    println!("\nSummary");
    for view in &summary.submissions {
        let responses = view
            .response_count
            .map(|count| format!(" | {count} responses"))
            .unwrap_or_default();
        println!(
            "- {} {}: {}{}",
            view.kind, view.submission_id, view.status, responses
        );
    }
    println!("- {} notifications delivered", summary.notifications);

    Ok(())
}

/// Configured moderation dials and sync cadence, with command-line overrides applied.
fn demo_settings(
    config: AppConfig,
    threshold: Option<u8>,
    poll_interval_ms: Option<u64>,
    manual_only: bool,
) -> (ModerationConfig, Duration) {
    let AppConfig {
        mut moderation,
        sync,
        ..
    } = config;
    if let Some(threshold) = threshold {
        moderation.confidence_threshold = threshold.min(100);
    }
    if manual_only {
        moderation.automation_enabled = false;
    }
    let poll_interval = poll_interval_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| sync.poll_interval());
    (moderation, poll_interval)
}

async fn submit(
    pipeline: &ServicePipeline,
    submission: NewSubmission,
) -> Result<Option<(SubmissionId, ModerationReport)>, AppError> {
    let receipt = match pipeline.submit(submission).await {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Submission rejected: {err}");
            return Ok(None);
        }
    };
    let id = receipt.record.id.clone();
    println!("  Received {} -> {}", id, receipt.record.user_message());
    match receipt.moderated().await? {
        Some(report) => Ok(Some((id, report))),
        None => Ok(None),
    }
}

fn print_report(report: &ModerationReport) {
    if let Some(assessment) = &report.assessment {
        println!(
            "  Oracle: {} ({}%) {}",
            assessment.verdict.label(),
            assessment.confidence,
            assessment.notes
        );
    }
    println!("  Policy: {}", report.decision.summary());
}

/// Plays the operator: approves everything waiting, through the worklist so each row is
/// confirmed by the store before it disappears.
async fn review_escalations(
    queue: &ManualReviewQueue<MemorySubmissionStore, LoggingNotifier>,
) -> Result<(), AppError> {
    let mut worklist = ReviewWorklist::new();
    worklist.refresh(queue.pending(None)?);
    if worklist.is_empty() {
        return Ok(());
    }

    println!("  Review queue: {} item(s)", worklist.len());
    let ids: Vec<SubmissionId> = worklist
        .rows()
        .map(|row| row.record.id.clone())
        .collect();
    for id in ids {
        let Some(command) = worklist.begin(&id, TerminalAction::Accept, "approved in demo") else {
            continue;
        };
        match queue.dispatch(command) {
            Ok(event) => {
                println!(
                    "  Reviewer chose {} for {} -> {}",
                    event.action.label(),
                    event.submission_id,
                    event.status.label()
                );
                worklist.confirm(&event);
            }
            Err(err) => {
                println!("  Review failed for {id}: {err}");
                worklist.fail(&id);
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn settle(watch: SyncHandle) {
    match tokio::time::timeout(Duration::from_secs(5), watch.finished()).await {
        Ok(Ok(report)) => println!("  Client stopped watching ({:?})", report.stop),
        Ok(Err(err)) => println!("  Status watcher failed: {err}"),
        Err(_) => println!("  Status watcher still waiting after 5s"),
    }
}

fn laptop_request(owner: &str) -> NewSubmission {
    NewSubmission {
        kind: SubmissionKind::Request,
        owner_id: UserId(owner.to_string()),
        request_id: None,
        content: SubmissionContent {
            title: "Refurbished laptop for college".to_string(),
            description: "Need a refurbished laptop with at least 8GB RAM and an SSD".to_string(),
            category: "Electronics".to_string(),
            price: 25_000,
            notes: String::new(),
            media: Vec::new(),
            location: Some("Pune".to_string()),
        },
        trust: TrustContext {
            submitter_verified: false,
            submitter_tier: SubmitterTier::Free,
        },
        payment: None,
        idempotency_key: None,
    }
}

fn laptop_offer(owner: &str, request_id: &SubmissionId) -> NewSubmission {
    let mut offer = laptop_request(owner);
    offer.kind = SubmissionKind::Offer;
    offer.request_id = Some(request_id.clone());
    offer.content.title = "Dell Latitude with 16GB RAM".to_string();
    offer.content.description =
        "Refurbished business laptop, 512GB SSD, new battery, six month warranty".to_string();
    offer.content.price = 23_500;
    offer
}

use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use offerdesk::config::ModerationConfig;
use offerdesk::workflows::moderation::{
    ChargeRequest, MemorySubmissionStore, ModerationPipeline, Notification,
    NotificationDispatcher, NotifyError, PaymentError, PaymentGateway, PaymentReceipt,
    RuleBasedOracle,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServicePipeline = ModerationPipeline<MemorySubmissionStore, LoggingNotifier>;

/// Delivers notifications to the structured log; stands in for push and e-mail adapters.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    delivered: Arc<AtomicUsize>,
}

impl NotificationDispatcher for LoggingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            user_id = %notification.user_id,
            kind = notification.kind.label(),
            submission_id = %notification.submission_id,
            "notification delivered"
        );
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl LoggingNotifier {
    pub(crate) fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Keyed receipts kept for replay; the oldest are evicted first.
pub(crate) const SANDBOX_REPLAY_CAPACITY: usize = 1024;

#[derive(Default)]
struct ReplayLedger {
    receipts: HashMap<String, PaymentReceipt>,
    order: VecDeque<String>,
}

impl ReplayLedger {
    fn get(&self, key: &str) -> Option<&PaymentReceipt> {
        self.receipts.get(key)
    }

    fn insert(&mut self, key: String, receipt: PaymentReceipt) {
        if self.receipts.insert(key.clone(), receipt).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > SANDBOX_REPLAY_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.receipts.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.receipts.len()
    }
}

/// Checkout stand-in that captures every charge and replays by idempotency key.
#[derive(Default)]
pub(crate) struct SandboxPaymentGateway {
    sequence: AtomicU64,
    captured: Mutex<ReplayLedger>,
}

#[async_trait]
impl PaymentGateway for SandboxPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentReceipt, PaymentError> {
        if request.amount == 0 {
            return Err(PaymentError::Declined("amount must be positive".to_string()));
        }

        let mut captured = self
            .captured
            .lock()
            .map_err(|_| PaymentError::Unavailable("sandbox ledger poisoned".to_string()))?;

        if let Some(key) = &request.idempotency_key {
            if let Some(receipt) = captured.get(&key.0) {
                return Ok(receipt.clone());
            }
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let receipt = PaymentReceipt {
            transaction_id: format!("sbx-{}-{seq:04}", Utc::now().format("%Y%m%d")),
            amount: request.amount,
        };
        if let Some(key) = &request.idempotency_key {
            captured.insert(key.0.clone(), receipt.clone());
        }
        info!(
            payer_id = %request.payer_id,
            transaction_id = %receipt.transaction_id,
            amount = receipt.amount,
            "sandbox charge captured"
        );
        Ok(receipt)
    }
}

pub(crate) fn build_pipeline(config: &ModerationConfig) -> ServicePipeline {
    build_pipeline_with(
        config,
        Arc::new(MemorySubmissionStore::new()),
        Arc::new(LoggingNotifier::default()),
    )
}

pub(crate) fn build_pipeline_with(
    config: &ModerationConfig,
    store: Arc<MemorySubmissionStore>,
    notifier: Arc<LoggingNotifier>,
) -> ServicePipeline {
    ModerationPipeline::new(
        store,
        notifier,
        Arc::new(RuleBasedOracle::new()),
        Arc::new(SandboxPaymentGateway::default()),
        config.pipeline_options(),
    )
}

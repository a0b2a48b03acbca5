//! Payout cycles: pick eligible workers, settle through the gateway and
//! reset their counters on success.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc, Weekday};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::PayoutError;
use crate::fleet::{ActivityLevel, FleetManager};
use crate::payout::gateway::PaymentGateway;
use crate::payout::policy::{PayoutKind, PayoutPolicy, PayoutQuote};
use crate::worker::WorkerId;

/// Payout records kept in memory.
const HISTORY_CAPACITY: usize = 500;

/// Gateway calls in flight during one cycle.
const SETTLE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutRecord {
    pub id: String,
    pub worker_id: WorkerId,
    pub kind: PayoutKind,
    pub gross: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
    pub status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Totals for one payout cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub paid: usize,
    pub failed: usize,
    pub total_net: Decimal,
}

pub struct PayoutService {
    fleet: Arc<FleetManager>,
    gateway: Arc<dyn PaymentGateway>,
    policy: PayoutPolicy,
    recipient: String,
    history: RwLock<VecDeque<PayoutRecord>>,
}

impl PayoutService {
    pub fn new(
        fleet: Arc<FleetManager>,
        gateway: Arc<dyn PaymentGateway>,
        policy: PayoutPolicy,
        recipient: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            fleet,
            gateway,
            policy,
            recipient: recipient.into(),
            history: RwLock::new(VecDeque::new()),
        })
    }

    /// Pay every worker whose quote clears the minimum for `kind`. Workers
    /// with a payout already in flight are skipped.
    pub async fn run_cycle(&self, kind: PayoutKind) -> CycleSummary {
        let claimed: Vec<(WorkerId, PayoutQuote)> = self
            .fleet
            .write(|fleet| {
                let eligible: Vec<(WorkerId, PayoutQuote)> = fleet
                    .workers()
                    .filter(|w| w.payout_claim().is_none())
                    .map(|w| (w.id().clone(), self.policy.quote(w)))
                    .filter(|(_, quote)| self.policy.is_eligible(quote, kind))
                    .collect();
                eligible
                    .into_iter()
                    .filter(|(id, _)| fleet.claim_payout(id).is_some())
                    .collect()
            })
            .await;

        info!(%kind, workers = claimed.len(), "Processing payouts");
        let records: Vec<PayoutRecord> = stream::iter(claimed)
            .map(|(worker_id, quote)| self.settle(worker_id, quote, kind))
            .buffer_unordered(SETTLE_CONCURRENCY)
            .collect()
            .await;

        let mut summary = CycleSummary::default();
        for record in records {
            match record.status {
                PayoutStatus::Completed => {
                    summary.paid += 1;
                    summary.total_net += record.net;
                }
                _ => summary.failed += 1,
            }
        }

        let message = format!(
            "{} payouts processed: {} paid (${}), {} failed",
            capitalize(kind.as_str()),
            summary.paid,
            summary.total_net,
            summary.failed
        );
        self.fleet
            .write(|fleet| fleet.record_activity(ActivityLevel::Info, None, message))
            .await;
        summary
    }

    /// Pay one worker now.
    pub async fn pay_worker(&self, worker_id: &WorkerId) -> Result<PayoutRecord, PayoutError> {
        let kind = PayoutKind::Manual;
        let quote = self
            .fleet
            .write(|fleet| -> Result<PayoutQuote, PayoutError> {
                let worker = fleet
                    .worker(worker_id)
                    .ok_or_else(|| PayoutError::WorkerNotFound {
                        id: worker_id.to_string(),
                    })?;
                if worker.payout_claim().is_some() {
                    return Err(PayoutError::InFlight {
                        id: worker_id.to_string(),
                    });
                }
                let quote = self.policy.quote(worker);
                if !self.policy.is_eligible(&quote, kind) {
                    return Err(PayoutError::BelowMinimum {
                        amount: quote.gross,
                        minimum: self.policy.minimum(kind),
                    });
                }
                fleet.claim_payout(worker_id);
                Ok(quote)
            })
            .await?;

        Ok(self.settle(worker_id.clone(), quote, kind).await)
    }

    /// Most recent records first.
    pub async fn history(&self) -> Vec<PayoutRecord> {
        self.history.read().await.iter().rev().cloned().collect()
    }

    /// Send a claimed payout. The claim is deducted on success and returned
    /// to the worker on failure.
    async fn settle(&self, worker_id: WorkerId, quote: PayoutQuote, kind: PayoutKind) -> PayoutRecord {
        let mut record = PayoutRecord {
            id: format!("payout_{}", Uuid::new_v4().simple()),
            worker_id: worker_id.clone(),
            kind,
            gross: quote.gross,
            fee: quote.fee,
            net: quote.net,
            status: PayoutStatus::Pending,
            reference: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.publish(&record).await;

        match self.gateway.send_payment(&self.recipient, quote.net).await {
            Ok(receipt) => {
                record.status = PayoutStatus::Completed;
                record.reference = Some(receipt.reference);
                record.completed_at = Some(Utc::now());
                info!(worker_id = %worker_id, net = %quote.net, "Payout completed");

                let message = format!("Payout completed: ${} to worker {worker_id}", quote.net);
                self.fleet
                    .write(|fleet| {
                        if !fleet.settle_payout(&worker_id) {
                            warn!(worker_id = %worker_id, "Paid worker left the fleet before settlement");
                        }
                        fleet.record_activity(ActivityLevel::Success, Some(worker_id.clone()), message);
                    })
                    .await;
            }
            Err(e) => {
                record.status = PayoutStatus::Failed;
                record.error = Some(e.to_string());
                record.completed_at = Some(Utc::now());
                error!(worker_id = %worker_id, gateway = self.gateway.name(), error = %e, "Payout failed");

                let message = format!("Payout failed for worker {worker_id}: {e}");
                self.fleet
                    .write(|fleet| {
                        fleet.release_payout(&worker_id);
                        fleet.record_activity(ActivityLevel::Error, Some(worker_id.clone()), message)
                    })
                    .await;
            }
        }

        self.publish(&record).await;
        record
    }

    /// Insert or update a record in the bounded history.
    async fn publish(&self, record: &PayoutRecord) {
        let mut history = self.history.write().await;
        match history.iter_mut().rev().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => {
                history.push_back(record.clone());
                while history.len() > HISTORY_CAPACITY {
                    history.pop_front();
                }
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Spawn the payout ticker: a daily cycle every `every`, plus a weekly cycle
/// when the tick lands on a Friday.
pub fn spawn_payout_task(service: Arc<PayoutService>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            service.run_cycle(PayoutKind::Daily).await;
            if Utc::now().weekday() == Weekday::Fri {
                let summary = service.run_cycle(PayoutKind::Weekly).await;
                if summary.failed > 0 {
                    warn!(failed = summary.failed, "Weekly payouts had failures");
                }
            }
        }
    })
}

//! Payment-to-entitlement synchronisation.
//!
//! Every entry point (signed webhook, event replay, admin grants, simulated
//! checkouts) funnels into [`EntitlementSync::process_payment`]. The pipeline
//! maps the paid amount to a tier, resolves the payer's identity by email,
//! reconciles against the stored tier without ever downgrading, persists the
//! merged metadata, then writes the realtime fan-out rows.
//!
//! Re-delivery is safe twice over: a processed provider event id is skipped
//! outright, and even without an id the reconciliation is monotonic.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::audit_repository::AuditRepository;
use crate::db::stripe_event_log_repository::StripeEventLogRepository;
use crate::models::audit::{
    NewEventRow, NewNotificationRow, NewWebhookFailure, EVENT_TYPE_SUBSCRIPTION_UPDATED,
    NOTIFICATION_TYPE_SUBSCRIPTION,
};
use crate::models::entitlement::{stored_plan_label, EntitlementMetadata};
use crate::models::plan::{PlanGrant, PlanTier};
use crate::services::user_store::{UserStore, UserStoreError};
use crate::utils::plan_mapping::{map_amount_to_plan, reconcile_plan};
use crate::utils::retry::{retry_with_backoff, RetryExhausted, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Mapped,
    UserResolved,
    Reconciled,
    Persisted,
    Notified,
}

impl ReconcileStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStage::Mapped => "mapped",
            ReconcileStage::UserResolved => "user_resolved",
            ReconcileStage::Reconciled => "reconciled",
            ReconcileStage::Persisted => "persisted",
            ReconcileStage::Notified => "notified",
        }
    }
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store failure tagged with the stage the pipeline was trying to reach.
#[derive(Debug, thiserror::Error)]
#[error("failed reaching {stage}: {source}")]
pub struct StageFailure {
    pub stage: ReconcileStage,
    #[source]
    pub source: UserStoreError,
}

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("entitlement for {email} not applied after {attempts} attempts ({stage}): {source}")]
    Exhausted {
        email: String,
        stage: ReconcileStage,
        attempts: usize,
        #[source]
        source: UserStoreError,
    },
}

/// A completed payment, normalised from whichever entry point saw it.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Provider event id; `None` for manual grants and simulations.
    pub event_id: Option<String>,
    pub event_type: String,
    pub email: String,
    /// Amount paid, in minor currency units.
    pub amount: i64,
    pub stripe_customer_id: Option<String>,
    pub paid_at: OffsetDateTime,
    /// Grants this tier instead of mapping `amount`.
    pub plan_override: Option<PlanTier>,
}

impl PaymentEvent {
    pub fn checkout(
        event_id: Option<String>,
        email: impl Into<String>,
        amount: i64,
        stripe_customer_id: Option<String>,
    ) -> Self {
        Self {
            event_id,
            event_type: "checkout.session.completed".to_string(),
            email: email.into(),
            amount,
            stripe_customer_id,
            paid_at: OffsetDateTime::now_utc(),
            plan_override: None,
        }
    }

    pub fn manual_grant(email: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            event_id: None,
            event_type: "manual.plan_grant".to_string(),
            email: email.into(),
            amount: 0,
            stripe_customer_id: None,
            paid_at: OffsetDateTime::now_utc(),
            plan_override: Some(plan),
        }
    }

    /// Metadata to write for `grant`. Manual grants carry no payment.
    fn metadata(&self, grant: PlanGrant) -> EntitlementMetadata {
        match self.plan_override {
            Some(_) => EntitlementMetadata::plan_grant(grant, self.paid_at),
            None => EntitlementMetadata::new(
                grant,
                self.amount,
                self.stripe_customer_id.clone(),
                self.paid_at,
            ),
        }
    }

    fn grant(&self) -> PlanGrant {
        match self.plan_override {
            Some(plan) => plan.into(),
            None => map_amount_to_plan(self.amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub user_id: Uuid,
    pub email: String,
    pub created: bool,
    pub previous_plan: Option<String>,
    pub purchased: PlanGrant,
    pub effective: PlanGrant,
    pub plan_changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The provider event id was already applied; nothing was written.
    Duplicate,
    Applied(ReconcileOutcome),
}

pub struct EntitlementSync {
    user_store: Arc<dyn UserStore>,
    audit: Arc<dyn AuditRepository>,
    event_log: Arc<dyn StripeEventLogRepository>,
    retry: RetryPolicy,
}

impl EntitlementSync {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        audit: Arc<dyn AuditRepository>,
        event_log: Arc<dyn StripeEventLogRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            user_store,
            audit,
            event_log,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn process_payment(
        &self,
        event: &PaymentEvent,
    ) -> Result<SyncOutcome, EntitlementError> {
        if let Some(event_id) = event.event_id.as_deref() {
            match self.event_log.has_processed_event(event_id).await {
                Ok(true) => {
                    info!(event_id, email = %event.email, "event already applied; skipping");
                    return Ok(SyncOutcome::Duplicate);
                }
                Ok(false) => {}
                // The reconcile itself is monotonic, so carry on without the log.
                Err(err) => warn!(?err, event_id, "failed to consult stripe event log"),
            }
        }

        let purchased = event.grant();
        debug!(
            stage = %ReconcileStage::Mapped,
            amount = event.amount,
            plan = %purchased.plan,
            credits = purchased.credits,
            "mapped payment to plan"
        );

        let outcome = match retry_with_backoff(&self.retry, "apply_entitlement", |attempt| {
            self.apply(event, purchased, attempt)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(exhausted) => return Err(self.record_failure(event, exhausted).await),
        };

        info!(
            user_id = %outcome.user_id,
            email = %outcome.email,
            created = outcome.created,
            previous_plan = outcome.previous_plan.as_deref().unwrap_or("none"),
            plan = %outcome.effective.plan,
            credits = outcome.effective.credits,
            stage = %ReconcileStage::Persisted,
            "entitlement applied"
        );

        self.notify(event, &outcome).await;

        if let Some(event_id) = event.event_id.as_deref() {
            if let Err(err) = self.event_log.record_event(event_id, &event.event_type).await {
                warn!(?err, event_id, "failed to record stripe event as processed");
            }
        }

        Ok(SyncOutcome::Applied(outcome))
    }

    async fn apply(
        &self,
        event: &PaymentEvent,
        purchased: PlanGrant,
        attempt: usize,
    ) -> Result<ReconcileOutcome, StageFailure> {
        let existing = self
            .user_store
            .find_by_email(&event.email)
            .await
            .map_err(|source| StageFailure {
                stage: ReconcileStage::UserResolved,
                source,
            })?;
        debug!(
            email = %event.email,
            found = existing.is_some(),
            attempt,
            stage = %ReconcileStage::UserResolved,
            "resolved user"
        );

        match existing {
            None => {
                let metadata = event.metadata(purchased);
                let user = self
                    .user_store
                    .create_user(&event.email, metadata.to_value())
                    .await
                    .map_err(|source| StageFailure {
                        stage: ReconcileStage::Persisted,
                        source,
                    })?;
                Ok(ReconcileOutcome {
                    user_id: user.id,
                    email: event.email.clone(),
                    created: true,
                    previous_plan: None,
                    purchased,
                    effective: purchased,
                    plan_changed: true,
                })
            }
            Some(user) => {
                let previous_plan = stored_plan_label(&user.user_metadata).map(str::to_string);
                let effective: PlanGrant =
                    reconcile_plan(previous_plan.as_deref(), purchased.plan).into();
                debug!(
                    user_id = %user.id,
                    previous_plan = previous_plan.as_deref().unwrap_or("none"),
                    purchased = %purchased.plan,
                    effective = %effective.plan,
                    stage = %ReconcileStage::Reconciled,
                    "reconciled plan"
                );

                let metadata = event.metadata(effective);
                let merged = metadata.merge_into(&user.user_metadata);
                self.user_store
                    .update_user_metadata(user.id, merged)
                    .await
                    .map_err(|source| StageFailure {
                        stage: ReconcileStage::Persisted,
                        source,
                    })?;

                Ok(ReconcileOutcome {
                    user_id: user.id,
                    email: event.email.clone(),
                    created: false,
                    plan_changed: previous_plan.as_deref() != Some(effective.plan.as_str()),
                    previous_plan,
                    purchased,
                    effective,
                })
            }
        }
    }

    /// Realtime fan-out. Failures are logged; the entitlement is already stored.
    async fn notify(&self, event: &PaymentEvent, outcome: &ReconcileOutcome) {
        let event_row = NewEventRow {
            user_id: outcome.user_id,
            event_type: EVENT_TYPE_SUBSCRIPTION_UPDATED.to_string(),
            payload: json!({
                "plan": outcome.effective.plan,
                "previous_plan": outcome.previous_plan,
                "credits": outcome.effective.credits,
                "amount": event.amount,
                "created": outcome.created,
                "source_event": event.event_id,
            }),
        };
        if let Err(err) = self.audit.insert_event(event_row).await {
            warn!(?err, user_id = %outcome.user_id, "failed to insert subscription event row");
        }

        let notification = NewNotificationRow {
            user_id: outcome.user_id,
            title: "Assinatura atualizada".to_string(),
            message: format!(
                "Seu plano {} está ativo. Créditos disponíveis: {}.",
                outcome.effective.plan,
                credits_label(outcome.effective.credits)
            ),
            kind: NOTIFICATION_TYPE_SUBSCRIPTION.to_string(),
        };
        if let Err(err) = self.audit.insert_notification(notification).await {
            warn!(?err, user_id = %outcome.user_id, "failed to insert subscription notification");
        }

        debug!(user_id = %outcome.user_id, stage = %ReconcileStage::Notified, "fan-out written");
    }

    async fn record_failure(
        &self,
        event: &PaymentEvent,
        exhausted: RetryExhausted<StageFailure>,
    ) -> EntitlementError {
        let RetryExhausted {
            attempts, source, ..
        } = exhausted;
        let StageFailure { stage, source } = source;
        error!(
            email = %event.email,
            event_id = event.event_id.as_deref().unwrap_or("none"),
            %stage,
            attempts,
            ?source,
            "giving up on entitlement update"
        );

        let failure = NewWebhookFailure {
            event_id: event.event_id.clone(),
            email: event.email.clone(),
            amount: event.amount,
            stage: stage.as_str().to_string(),
            error: source.to_string(),
        };
        if let Err(err) = self.audit.insert_webhook_failure(failure).await {
            warn!(?err, email = %event.email, "failed to persist webhook failure row");
        }

        EntitlementError::Exhausted {
            email: event.email.clone(),
            stage,
            attempts,
            source,
        }
    }
}

fn credits_label(credits: i64) -> String {
    if credits < 0 {
        "ilimitados".to_string()
    } else {
        credits.to_string()
    }
}

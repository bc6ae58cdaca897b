use crate::{
    auth::SessionContext,
    config::AppConfig,
    entities::{
        order, payment_attempt, AttemptStatus, Order, OrderModel, OrderStatus, PaymentAttempt,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{InitiatedPayment, PaymentGateway, VerificationStatus},
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MAX_VERIFY_BACKOFF: Duration = Duration::from_secs(5);

/// Order/payment reconciliation.
///
/// Owns every order status transition. All transitions for one order run
/// under that order's lock, so duplicate webhook deliveries, redirect
/// returns and user retries are serialized. Terminal orders treat further
/// payment events as idempotent no-ops.
///
/// Trust model: a client-side "payment succeeded" signal (redirect return,
/// popup callback) is advisory only. It triggers a server-side
/// `gateway.verify` call, and only that result moves an order to `paid`.
///
/// Reconciliation itself runs on its own task: the verification poll must
/// reach a settled outcome even when the buyer closes the tab and the
/// request future is dropped mid-poll.
pub struct PaymentService {
    inner: Arc<Reconciler>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Reconciler {
                db,
                gateway,
                event_sender,
                config,
                locks: DashMap::new(),
            }),
        }
    }

    /// Begins a payment attempt for an order.
    ///
    /// Allowed from `pending` (first attempt) and from `failed` (manual
    /// retry — a new attempt on the same order, never a new order).
    /// Rejected while another attempt is `initiated`. A gateway outage
    /// leaves the order where it was; initiation is retryable.
    pub async fn initiate_payment(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<InitiatedPayment, ServiceError> {
        self.inner.initiate_payment(session, order_id).await
    }

    /// Entry point for the client redirect return. The redirect is an
    /// advisory signal: it only triggers server-side verification and
    /// never transitions the order by itself.
    pub async fn handle_client_return(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<OrderStatus, ServiceError> {
        self.reconcile(order_id, reference).await
    }

    /// Entry point for signed gateway webhooks. Even an authenticated
    /// callback is reconciled through an independent verification call.
    pub async fn handle_gateway_callback(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<OrderStatus, ServiceError> {
        self.reconcile(order_id, reference).await
    }

    /// Spawns reconciliation as a detached task and awaits its outcome.
    /// The task owns the poll loop, so dropping this future (a vanished
    /// client, a closed connection) does not abandon reconciliation; the
    /// order still reaches a settled status at or before the deadline.
    pub async fn reconcile(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<OrderStatus, ServiceError> {
        let reconciler = Arc::clone(&self.inner);
        let reference = reference.to_string();
        let task = tokio::spawn(async move { reconciler.reconcile(order_id, &reference).await });
        match task.await {
            Ok(result) => result,
            Err(err) => Err(ServiceError::InternalError(format!(
                "reconciliation task failed: {err}"
            ))),
        }
    }

    /// Cancels an order. Allowed from `pending` and `payment_pending`;
    /// `paid` orders are never cancellable. Any open attempt is expired so
    /// a stray later callback cannot match an initiated attempt.
    pub async fn cancel_order(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        self.inner.cancel_order(session, order_id).await
    }

    pub async fn get_order_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        self.inner.get_order_status(order_id).await
    }

    /// Number of per-order locks currently retained. Locks are evicted
    /// once no operation holds them, so this stays bounded by the number
    /// of in-flight payment operations.
    pub fn retained_lock_count(&self) -> usize {
        self.inner.locks.len()
    }
}

/// The locked core of the payment service. Shared between request futures
/// and detached reconciliation tasks through an `Arc`.
struct Reconciler {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Reconciler {
    /// Lock keyed on the order id. Single logical owner per order: every
    /// transition path takes this lock first.
    fn order_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the registry entry once nothing else holds the lock. The
    /// check runs under the map's shard lock, so a concurrent
    /// `order_lock` either sees the entry (count > 1, kept) or recreates
    /// it after removal.
    fn release_order_lock(&self, order_id: Uuid) {
        self.locks
            .remove_if(&order_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[instrument(skip(self))]
    async fn initiate_payment(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<InitiatedPayment, ServiceError> {
        let lock = self.order_lock(order_id);
        let result = {
            let _guard = lock.lock().await;
            self.initiate_payment_locked(session, order_id).await
        };
        drop(lock);
        self.release_order_lock(order_id);
        result
    }

    async fn initiate_payment_locked(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<InitiatedPayment, ServiceError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != session.user_id {
            return Err(ServiceError::Forbidden(
                "order belongs to another account".to_string(),
            ));
        }

        if !order.status.can_transition_to(OrderStatus::PaymentPending) {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not payable from status '{}'",
                order_id, order.status
            )));
        }

        let open_attempt = PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .filter(payment_attempt::Column::Status.eq(AttemptStatus::Initiated))
            .one(&*self.db)
            .await?;
        if open_attempt.is_some() {
            return Err(ServiceError::Conflict(format!(
                "order {order_id} already has a payment attempt in progress"
            )));
        }

        let initiated = self
            .initiate_with_retry(order_id, order.total_amount, &order.phone_number)
            .await?;

        let txn = self.db.begin().await?;
        payment_attempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            reference: Set(initiated.reference.clone()),
            amount: Set(order.total_amount),
            status: Set(AttemptStatus::Initiated),
            initiated_at: Set(Utc::now()),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await?;
        self.transition(&txn, order, OrderStatus::PaymentPending).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentInitiated {
                order_id,
                reference: initiated.reference.clone(),
            })
            .await;
        info!(%order_id, reference = %initiated.reference, "payment initiated");

        Ok(initiated)
    }

    /// Converts an advisory payment signal into an authoritative order
    /// status.
    ///
    /// Polls `gateway.verify` with bounded exponential backoff until the
    /// verification deadline (anchored at the attempt's `initiated_at`, so
    /// a vanished client does not extend the window). Terminal orders and
    /// unknown references are idempotent no-ops.
    #[instrument(skip(self))]
    async fn reconcile(&self, order_id: Uuid, reference: &str) -> Result<OrderStatus, ServiceError> {
        let lock = self.order_lock(order_id);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(order_id, reference).await
        };
        drop(lock);
        self.release_order_lock(order_id);
        result
    }

    async fn reconcile_locked(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<OrderStatus, ServiceError> {
        let order = self.load_order(order_id).await?;

        if order.status.is_terminal() {
            self.note_duplicate(order_id, reference).await;
            return Ok(order.status);
        }

        let attempt = PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .filter(payment_attempt::Column::Reference.eq(reference))
            .one(&*self.db)
            .await?;

        // A reference that matches no initiated attempt of this order is a
        // forged or stale signal; ignore it.
        let attempt = match attempt {
            Some(a) if a.status == AttemptStatus::Initiated => a,
            _ => {
                self.note_duplicate(order_id, reference).await;
                return Ok(order.status);
            }
        };

        let deadline = attempt.initiated_at + self.config.verification_timeout();
        let mut backoff = self.config.verify_backoff();

        loop {
            if Utc::now() >= deadline {
                self.apply_expiry(order, attempt).await?;
                return Err(ServiceError::VerificationTimeout(order_id));
            }

            match self.gateway.verify(reference, order_id).await {
                Ok(VerificationStatus::Succeeded) => {
                    let status = self
                        .apply_result(order, attempt, AttemptStatus::Succeeded)
                        .await?;
                    return Ok(status);
                }
                Ok(VerificationStatus::Failed) => {
                    let status = self
                        .apply_result(order, attempt, AttemptStatus::Failed)
                        .await?;
                    return Ok(status);
                }
                Ok(VerificationStatus::Pending) => {
                    // Not settled yet; poll again until the deadline.
                }
                Err(ServiceError::GatewayUnavailable(reason)) => {
                    warn!(%order_id, %reference, %reason, "verification call failed; retrying");
                }
                Err(other) => return Err(other),
            }

            let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
            sleep(backoff.min(remaining)).await;
            backoff = (backoff * 2).min(MAX_VERIFY_BACKOFF);
        }
    }

    #[instrument(skip(self))]
    async fn cancel_order(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let lock = self.order_lock(order_id);
        let result = {
            let _guard = lock.lock().await;
            self.cancel_order_locked(session, order_id).await
        };
        drop(lock);
        self.release_order_lock(order_id);
        result
    }

    async fn cancel_order_locked(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != session.user_id {
            return Err(ServiceError::Forbidden(
                "order belongs to another account".to_string(),
            ));
        }

        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} cannot be cancelled from status '{}'",
                order_id, order.status
            )));
        }

        let txn = self.db.begin().await?;

        if let Some(open) = PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .filter(payment_attempt::Column::Status.eq(AttemptStatus::Initiated))
            .one(&txn)
            .await?
        {
            let mut active: payment_attempt::ActiveModel = open.into();
            active.status = Set(AttemptStatus::Expired);
            active.completed_at = Set(Some(Utc::now()));
            active.update(&txn).await?;
        }

        let updated = self.transition(&txn, order, OrderStatus::Cancelled).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCancelled(order_id)).await;
        info!(%order_id, "order cancelled");
        Ok(updated)
    }

    async fn get_order_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        Ok(self.load_order(order_id).await?.status)
    }

    async fn load_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    /// Applies an authoritative verification result: exactly one attempt
    /// completion and one order transition, in one transaction.
    async fn apply_result(
        &self,
        order: OrderModel,
        attempt: payment_attempt::Model,
        result: AttemptStatus,
    ) -> Result<OrderStatus, ServiceError> {
        let order_id = order.id;
        let reference = attempt.reference.clone();
        let next = match result {
            AttemptStatus::Succeeded => OrderStatus::Paid,
            _ => OrderStatus::Failed,
        };

        let txn = self.db.begin().await?;
        let mut active: payment_attempt::ActiveModel = attempt.into();
        active.status = Set(result);
        active.completed_at = Set(Some(Utc::now()));
        active.update(&txn).await?;
        let updated = self.transition(&txn, order, next).await?;
        txn.commit().await?;

        let event = match result {
            AttemptStatus::Succeeded => Event::PaymentVerified { order_id, reference },
            _ => Event::PaymentFailed { order_id, reference },
        };
        self.event_sender.send_or_log(event).await;
        info!(%order_id, status = %updated.status, "payment reconciled");

        Ok(updated.status)
    }

    /// No successful verification arrived within the deadline: the attempt
    /// expires and the order fails. The buyer may retry, which opens a new
    /// attempt on the same order.
    async fn apply_expiry(
        &self,
        order: OrderModel,
        attempt: payment_attempt::Model,
    ) -> Result<(), ServiceError> {
        let order_id = order.id;
        let reference = attempt.reference.clone();

        let txn = self.db.begin().await?;
        let mut active: payment_attempt::ActiveModel = attempt.into();
        active.status = Set(AttemptStatus::Expired);
        active.completed_at = Set(Some(Utc::now()));
        active.update(&txn).await?;
        self.transition(&txn, order, OrderStatus::Failed).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentExpired { order_id, reference })
            .await;
        warn!(%order_id, "payment verification timed out");
        Ok(())
    }

    async fn transition(
        &self,
        conn: &impl ConnectionTrait,
        current: OrderModel,
        next: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "illegal order transition '{}' -> '{}'",
                current.status, next
            )));
        }

        let version = current.version;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        Ok(active.update(conn).await?)
    }

    async fn note_duplicate(&self, order_id: Uuid, reference: &str) {
        info!(%order_id, %reference, "payment event for settled order ignored");
        self.event_sender
            .send_or_log(Event::DuplicateCallbackIgnored {
                order_id,
                reference: reference.to_string(),
            })
            .await;
    }

    /// Initiation calls are retried with bounded exponential backoff; only
    /// gateway unavailability is retryable.
    async fn initiate_with_retry(
        &self,
        order_id: Uuid,
        amount: Decimal,
        contact: &str,
    ) -> Result<InitiatedPayment, ServiceError> {
        let mut backoff = self.config.gateway_retry_backoff();
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..self.config.gateway_max_retries.max(1) {
            match self.gateway.initiate(order_id, amount, contact).await {
                Ok(initiated) => return Ok(initiated),
                Err(err @ ServiceError::GatewayUnavailable(_)) => {
                    warn!(%order_id, %err, attempt, "payment initiation failed");
                    last_error = Some(err);
                    if attempt + 1 < self.config.gateway_max_retries {
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_VERIFY_BACKOFF);
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ServiceError::GatewayUnavailable("gateway unreachable".to_string())))
    }
}

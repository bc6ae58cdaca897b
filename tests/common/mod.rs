#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use farmdirect_api::{
    auth::SessionContext,
    config::AppConfig,
    db,
    entities::{product, AccountRole, ProductModel},
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{InitiatedPayment, PaymentGateway, VerificationStatus},
    handlers::AppServices,
    services::users::RegisterInput,
    AppState,
};

/// Payment gateway double with scripted verification outcomes.
///
/// `verify` pops results from a queue; once the queue is drained every
/// further call returns the configured final status. `initiate` can be
/// told to fail a number of times before succeeding.
pub struct StubGateway {
    verify_script: Mutex<VecDeque<VerificationStatus>>,
    final_status: Mutex<VerificationStatus>,
    initiate_failures: AtomicU64,
    initiate_calls: AtomicU64,
    verify_calls: AtomicU64,
    reference_seq: AtomicU64,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            verify_script: Mutex::new(VecDeque::new()),
            final_status: Mutex::new(VerificationStatus::Succeeded),
            initiate_failures: AtomicU64::new(0),
            initiate_calls: AtomicU64::new(0),
            verify_calls: AtomicU64::new(0),
            reference_seq: AtomicU64::new(0),
        }
    }

    /// Queue verification outcomes to be returned in order.
    pub fn script_verify(&self, outcomes: &[VerificationStatus]) {
        let mut script = self.verify_script.lock().unwrap();
        script.extend(outcomes.iter().copied());
    }

    /// Status returned once the scripted outcomes are exhausted.
    pub fn set_final_status(&self, status: VerificationStatus) {
        *self.final_status.lock().unwrap() = status;
    }

    /// Make the next `n` initiate calls fail with `GatewayUnavailable`.
    pub fn fail_next_initiations(&self, n: u64) {
        self.initiate_failures.store(n, Ordering::SeqCst);
    }

    pub fn initiate_calls(&self) -> u64 {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> u64 {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initiate(
        &self,
        order_id: Uuid,
        _amount: Decimal,
        _payer_contact: &str,
    ) -> Result<InitiatedPayment, ServiceError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.initiate_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.initiate_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::GatewayUnavailable(
                "stubbed outage".to_string(),
            ));
        }

        let seq = self.reference_seq.fetch_add(1, Ordering::SeqCst);
        Ok(InitiatedPayment {
            reference: format!("ref-{order_id}-{seq}"),
            redirect_url: format!("https://gateway.test/pay/{order_id}/{seq}"),
        })
    }

    async fn verify(
        &self,
        _reference: &str,
        _order_id: Uuid,
    ) -> Result<VerificationStatus, ServiceError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.verify_script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(*self.final_status.lock().unwrap()))
    }
}

/// Application state backed by an in-memory SQLite database and a stub
/// payment gateway.
pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a test app after tweaking the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            0,
        );
        tweak(&mut cfg);

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let config = Arc::new(cfg);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(StubGateway::new());
        let services = AppServices::build(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            gateway.clone(),
        );

        let state = AppState {
            db,
            config,
            event_sender,
            services,
        };

        Self {
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub async fn register_buyer(&self, email: &str) -> SessionContext {
        self.register(email, AccountRole::Buyer).await
    }

    pub async fn register_farmer(&self, email: &str) -> SessionContext {
        self.register(email, AccountRole::Farmer).await
    }

    async fn register(&self, email: &str, role: AccountRole) -> SessionContext {
        let account = self
            .state
            .services
            .users
            .register(RegisterInput {
                name: "Test Account".to_string(),
                email: email.to_string(),
                phone: "+2348012345678".to_string(),
                password: "a sufficiently long password".to_string(),
                role,
            })
            .await
            .expect("failed to register account");

        SessionContext {
            user_id: account.user.id,
            role,
        }
    }

    /// Insert a product listing directly, bypassing the catalog service.
    pub async fn seed_product(&self, farmer: &SessionContext, price: Decimal) -> ProductModel {
        self.seed_product_with_stock(farmer, price, 100).await
    }

    pub async fn seed_product_with_stock(
        &self,
        farmer: &SessionContext,
        price: Decimal,
        stock: i32,
    ) -> ProductModel {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            farmer_id: Set(farmer.user_id),
            name: Set("Yellow Maize".to_string()),
            description: Set(Some("Freshly harvested".to_string())),
            unit: Set("bag".to_string()),
            unit_price: Set(price),
            available: Set(true),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product")
    }
}

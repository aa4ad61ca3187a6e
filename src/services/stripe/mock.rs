use super::{
    CheckoutSession, CreateCheckoutSessionRequest, StripeEvent, StripeService, StripeServiceError,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub events: Arc<Mutex<Vec<StripeEvent>>>,
    pub fail_checkout: bool,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(self, event: StripeEvent) -> Self {
        self.events.lock().unwrap().push(event);
        self
    }
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}", prefix, ts)
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        // capture the request
        self.last_create_requests.lock().unwrap().push(req.clone());
        if self.fail_checkout {
            return Err(StripeServiceError::Api("mock checkout failure".into()));
        }

        Ok(CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        })
    }

    async fn retrieve_event(&self, event_id: &str) -> Result<StripeEvent, StripeServiceError> {
        let opt = self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == event_id)
            .cloned();
        opt.ok_or_else(|| StripeServiceError::NotFound(format!("event {} not found", event_id)))
    }
}

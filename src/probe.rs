//! Outbound probes.
//!
//! A probe races three events: the response, a transport error and the
//! check's timer. Each event tries to fill the same [`OutcomeSlot`]; the
//! first one wins and every later attempt is dropped. The request is not
//! aborted when the timer wins, its late result is simply discarded.
//!
//! Redirects are never followed: the status of the first response is the
//! one compared against the check's success codes.

use reqwest::redirect::Policy;
use reqwest::{Client, Method, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::models::{Check, Outcome};

/// Single-assignment cell shared by the racing events of one probe.
#[derive(Clone)]
pub struct OutcomeSlot {
    filled: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl OutcomeSlot {
    pub fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            filled: Arc::new(AtomicBool::new(false)),
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        (slot, rx)
    }

    /// Returns `true` only for the call that actually delivered the outcome.
    pub fn fill(&self, outcome: Outcome) -> bool {
        if self
            .filled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                // Receiver gone means nobody is waiting any more; the slot still counts as filled.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self { client })
    }

    /// Probes `check` once and yields exactly one outcome.
    pub async fn probe(&self, check: &Check) -> Outcome {
        let (slot, rx) = OutcomeSlot::new();
        let timeout = Duration::from_secs(check.timeout_seconds.max(1));

        match self.build_request(check, timeout) {
            Ok(request) => {
                let request_slot = slot.clone();
                let check_id = check.id.clone();
                tokio::spawn(async move {
                    let outcome = match request.send().await {
                        Ok(response) => Outcome::response(response.status().as_u16()),
                        Err(e) if e.is_timeout() => Outcome::timeout(),
                        Err(e) => Outcome::failure(e.to_string()),
                    };
                    if !request_slot.fill(outcome) {
                        debug!(check_id = %check_id, "Late transport event ignored");
                    }
                });
            }
            Err(message) => {
                slot.fill(Outcome::failure(message));
            }
        }

        let timer_slot = slot.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_slot.fill(Outcome::timeout());
        });

        let outcome = rx
            .await
            .unwrap_or_else(|_| Outcome::failure("probe abandoned"));
        timer.abort();
        outcome
    }

    fn build_request(&self, check: &Check, timeout: Duration) -> Result<reqwest::RequestBuilder, String> {
        let url = Url::parse(&check.url).map_err(|e| format!("invalid url {}: {}", check.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme {}", url.scheme()));
        }
        let method = Method::from_bytes(check.method.to_uppercase().as_bytes())
            .map_err(|_| format!("invalid method {}", check.method))?;
        Ok(self.client.request(method, url).timeout(timeout))
    }
}

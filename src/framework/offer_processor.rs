//! Offer ingestion: a queue between the transport callback and the offer pass.
//!
//! Offers are buffered and handed to the handler in batches on a worker task, so
//! a slow pass applies backpressure instead of blocking the transport. With a
//! bounded queue, offers that do not fit are declined right away.

use super::driver::DriverSession;
use crate::config::OffersConfig;
use crate::logging::log_offer_operation;
use crate::models::{Offer, OfferId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumer of offer batches
pub trait OfferHandler: Send + Sync {
    /// Whether offers can be processed yet. Offers arriving earlier are declined briefly.
    fn is_ready(&self) -> bool;

    /// Run one pass over `offers`, returning the ids of the offers consumed
    fn process_offers(&self, offers: &[Offer]) -> Vec<OfferId>;
}

enum OfferSender {
    Bounded(mpsc::Sender<Offer>),
    Unbounded(mpsc::UnboundedSender<Offer>),
}

enum OfferReceiver {
    Bounded(mpsc::Receiver<Offer>),
    Unbounded(mpsc::UnboundedReceiver<Offer>),
}

impl OfferReceiver {
    async fn recv(&mut self) -> Option<Offer> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<Offer> {
        match self {
            Self::Bounded(rx) => rx.try_recv().ok(),
            Self::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

pub struct OfferProcessor {
    sender: OfferSender,
    session: DriverSession,
    short_decline_seconds: u64,
    pending: Arc<watch::Sender<usize>>,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OfferProcessor {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn start(handler: Arc<dyn OfferHandler>, session: DriverSession, config: &OffersConfig) -> Self {
        let (sender, receiver) = if config.is_unbounded() {
            let (tx, rx) = mpsc::unbounded_channel();
            (OfferSender::Unbounded(tx), OfferReceiver::Unbounded(rx))
        } else {
            let (tx, rx) = mpsc::channel(config.queue_size);
            (OfferSender::Bounded(tx), OfferReceiver::Bounded(rx))
        };
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let shutdown = Arc::new(Notify::new());

        let worker = tokio::spawn(run_worker(
            receiver,
            handler,
            session.clone(),
            config.clone(),
            Arc::clone(&pending),
            Arc::clone(&shutdown),
        ));

        info!(
            queue_size = config.queue_size,
            unbounded = config.is_unbounded(),
            "Offer processor started"
        );

        Self {
            sender,
            session,
            short_decline_seconds: config.short_decline_seconds,
            pending,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue offers for the next batch. Returns how many were queued; the rest
    /// were declined with the short refusal.
    pub fn enqueue(&self, offers: Vec<Offer>) -> usize {
        let mut queued = 0;
        let mut rejected = Vec::new();
        for offer in offers {
            self.pending.send_modify(|n| *n += 1);
            let result = match &self.sender {
                OfferSender::Bounded(tx) => tx.try_send(offer).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(offer)
                    | mpsc::error::TrySendError::Closed(offer) => offer,
                }),
                OfferSender::Unbounded(tx) => tx.send(offer).map_err(|e| e.0),
            };
            match result {
                Ok(()) => queued += 1,
                Err(offer) => {
                    self.pending.send_modify(|n| *n = n.saturating_sub(1));
                    rejected.push(offer);
                }
            }
        }

        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Offer queue full, declining offers");
            log_offer_operation("decline_queue_full", rejected.len(), None);
            decline(&self.session, &rejected, self.short_decline_seconds);
        }
        queued
    }

    /// Offers queued or being processed
    pub fn pending_offers(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every queued offer has been processed
    pub async fn await_offers_processed(&self) {
        let mut rx = self.pending.subscribe();
        if rx.wait_for(|n| *n == 0).await.is_err() {
            debug!("Offer processor stopped while waiting for offers");
        }
    }

    /// Stop the worker after the batch in progress, if any
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Offer worker ended abnormally");
            }
        }
    }
}

async fn run_worker(
    mut receiver: OfferReceiver,
    handler: Arc<dyn OfferHandler>,
    session: DriverSession,
    config: OffersConfig,
    pending: Arc<watch::Sender<usize>>,
    shutdown: Arc<Notify>,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown.notified() => {
                debug!("Offer worker stopping");
                break;
            }
            offer = receiver.recv() => offer,
        };
        let Some(first) = first else {
            break;
        };

        let mut batch = vec![first];
        while let Some(offer) = receiver.try_recv() {
            batch.push(offer);
        }
        let count = batch.len();

        let handler = Arc::clone(&handler);
        let session = session.clone();
        let config = config.clone();
        let outcome =
            tokio::task::spawn_blocking(move || process_batch(handler.as_ref(), &session, &batch, &config))
                .await;
        if let Err(e) = outcome {
            error!(error = %e, offers = count, "Offer pass panicked");
        }
        pending.send_modify(|n| *n = n.saturating_sub(count));
    }
}

fn process_batch(handler: &dyn OfferHandler, session: &DriverSession, offers: &[Offer], config: &OffersConfig) {
    if !handler.is_ready() {
        info!(offers = offers.len(), "Scheduler not ready, declining offers");
        log_offer_operation("decline_not_ready", offers.len(), None);
        decline(session, offers, config.short_decline_seconds);
        return;
    }

    let used: HashSet<OfferId> = handler.process_offers(offers).into_iter().collect();
    let unused: Vec<Offer> = offers
        .iter()
        .filter(|offer| !used.contains(&offer.id))
        .cloned()
        .collect();
    debug!(used = used.len(), unused = unused.len(), "Offer batch processed");
    if !unused.is_empty() {
        log_offer_operation("decline_unused", unused.len(), None);
        decline(session, &unused, config.long_decline_seconds);
    }
}

fn decline(session: &DriverSession, offers: &[Offer], refuse_seconds: u64) {
    let driver = match session.driver() {
        Ok(driver) => driver,
        Err(e) => {
            warn!(error = %e, offers = offers.len(), "Cannot decline offers");
            return;
        }
    };
    for offer in offers {
        if let Err(e) = driver.decline_offer(&offer.id, refuse_seconds) {
            warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
        }
    }
}

//! JSONL event replay.
//!
//! Each input line is one operation against the engine, tagged by `op`.
//! Requests, offers and parties are named by caller-chosen string aliases so
//! event files can cross-reference entities without knowing the ids the
//! engine generates; bookings are addressed through the accepted offer's
//! alias (they are 1:1).

use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::application::engine::TripEngine;
use crate::domain::actor::Actor;
use crate::domain::booking::TripBooking;
use crate::domain::dispute::DisputeDecision;
use crate::domain::offer::Quotation;
use crate::domain::require::NewTripRequire;
use crate::error::{EngineError, Result};
use crate::infrastructure::clock::ManualClock;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationEvent {
    PostRequire {
        require: String,
        traveler: String,
        #[serde(flatten)]
        spec: NewTripRequire,
    },
    SubmitOffer {
        offer: String,
        require: String,
        guide: String,
        #[serde(flatten)]
        quotation: Quotation,
    },
    AcceptOffer {
        offer: String,
        traveler: String,
    },
    RejectOffer {
        offer: String,
        traveler: String,
        #[serde(default)]
        reason: Option<String>,
    },
    WithdrawOffer {
        offer: String,
        guide: String,
    },
    CancelBooking {
        offer: String,
        traveler: String,
    },
    /// Simulated gateway confirmation: creates the payment intent if the
    /// traveler never did, then delivers the capture callback.
    ConfirmPayment {
        offer: String,
    },
    ConfirmArrival {
        offer: String,
        traveler: String,
    },
    ConfirmComplete {
        offer: String,
        traveler: String,
    },
    ConfirmNoShow {
        offer: String,
        traveler: String,
    },
    ReportNoShow {
        offer: String,
        guide: String,
    },
    DisputeNoShow {
        offer: String,
        traveler: String,
        description: String,
        #[serde(default)]
        evidence_ref: Option<String>,
    },
    ResolveDispute {
        offer: String,
        admin: String,
        decision: DisputeDecision,
        justification: String,
    },
    /// Moves the replay clock forward, e.g. past the no-show dispute window.
    AdvanceTime {
        hours: i64,
    },
    Sweep,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub failed: usize,
}

/// Applies an event stream to the engine, keeping the alias maps.
pub struct EventReplayer {
    engine: Arc<TripEngine>,
    clock: Arc<ManualClock>,
    actors: HashMap<String, Uuid>,
    requires: HashMap<String, Uuid>,
    offers: HashMap<String, Uuid>,
    offer_aliases: HashMap<Uuid, String>,
}

impl EventReplayer {
    pub fn new(engine: Arc<TripEngine>, clock: Arc<ManualClock>) -> Self {
        Self {
            engine,
            clock,
            actors: HashMap::new(),
            requires: HashMap::new(),
            offers: HashMap::new(),
            offer_aliases: HashMap::new(),
        }
    }

    /// Replays every non-blank line. A failing event is logged and skipped;
    /// the stream keeps going.
    pub async fn replay<R: BufRead>(&mut self, reader: R) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let outcome = match serde_json::from_str::<OperationEvent>(&line) {
                Ok(event) => self.apply(event).await,
                Err(err) => Err(EngineError::Event(err)),
            };
            match outcome {
                Ok(()) => summary.applied += 1,
                Err(err) => {
                    warn!(line = number + 1, %err, "event rejected");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub async fn apply(&mut self, event: OperationEvent) -> Result<()> {
        match event {
            OperationEvent::PostRequire {
                require,
                traveler,
                spec,
            } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let posted = self.engine.post_require(actor, spec).await?;
                self.requires.insert(require, posted.id);
            }
            OperationEvent::SubmitOffer {
                offer,
                require,
                guide,
                quotation,
            } => {
                let actor = Actor::guide(self.actor_id(&guide));
                let require_id = self.require_id(&require)?;
                let submitted = self.engine.submit_offer(actor, require_id, quotation).await?;
                self.offers.insert(offer.clone(), submitted.id);
                self.offer_aliases.insert(submitted.id, offer);
            }
            OperationEvent::AcceptOffer { offer, traveler } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let offer_id = self.offer_id(&offer)?;
                self.engine.accept_offer(actor, offer_id).await?;
            }
            OperationEvent::RejectOffer {
                offer,
                traveler,
                reason,
            } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let offer_id = self.offer_id(&offer)?;
                self.engine.reject_offer(actor, offer_id, reason).await?;
            }
            OperationEvent::WithdrawOffer { offer, guide } => {
                let actor = Actor::guide(self.actor_id(&guide));
                let offer_id = self.offer_id(&offer)?;
                self.engine.withdraw_offer(actor, offer_id).await?;
            }
            OperationEvent::CancelBooking { offer, traveler } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let booking = self.booking(&offer).await?;
                self.engine.cancel_booking(actor, booking.id).await?;
            }
            OperationEvent::ConfirmPayment { offer } => {
                let booking = self.booking(&offer).await?;
                let traveler = Actor::traveler(booking.traveler);
                let reference = self
                    .engine
                    .create_payment_intent(traveler, booking.id)
                    .await?;
                self.engine.confirm_payment(booking.id, &reference).await?;
            }
            OperationEvent::ConfirmArrival { offer, traveler } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let booking = self.booking(&offer).await?;
                self.engine.confirm_arrival(actor, booking.id).await?;
            }
            OperationEvent::ConfirmComplete { offer, traveler } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let booking = self.booking(&offer).await?;
                self.engine.confirm_complete(actor, booking.id).await?;
            }
            OperationEvent::ConfirmNoShow { offer, traveler } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let booking = self.booking(&offer).await?;
                self.engine.confirm_no_show(actor, booking.id).await?;
            }
            OperationEvent::ReportNoShow { offer, guide } => {
                let actor = Actor::guide(self.actor_id(&guide));
                let booking = self.booking(&offer).await?;
                self.engine.report_no_show(actor, booking.id).await?;
            }
            OperationEvent::DisputeNoShow {
                offer,
                traveler,
                description,
                evidence_ref,
            } => {
                let actor = Actor::traveler(self.actor_id(&traveler));
                let booking = self.booking(&offer).await?;
                self.engine
                    .dispute_no_show(actor, booking.id, description, evidence_ref)
                    .await?;
            }
            OperationEvent::ResolveDispute {
                offer,
                admin,
                decision,
                justification,
            } => {
                let actor = Actor::admin(self.actor_id(&admin));
                let booking = self.booking(&offer).await?;
                self.engine
                    .resolve_dispute(actor, booking.id, decision, justification)
                    .await?;
            }
            OperationEvent::AdvanceTime { hours } => {
                if hours < 0 {
                    return Err(EngineError::Validation(
                        "the clock only moves forward".to_string(),
                    ));
                }
                self.clock.advance(Duration::hours(hours));
            }
            OperationEvent::Sweep => {
                self.engine.run_sweep().await?;
            }
        }
        Ok(())
    }

    /// The alias an offer was introduced under, for reporting.
    pub fn offer_alias(&self, offer_id: Uuid) -> Option<&str> {
        self.offer_aliases.get(&offer_id).map(String::as_str)
    }

    fn actor_id(&mut self, alias: &str) -> Uuid {
        *self
            .actors
            .entry(alias.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    fn require_id(&self, alias: &str) -> Result<Uuid> {
        self.requires
            .get(alias)
            .copied()
            .ok_or_else(|| EngineError::Validation(format!("unknown request alias: {alias}")))
    }

    fn offer_id(&self, alias: &str) -> Result<Uuid> {
        self.offers
            .get(alias)
            .copied()
            .ok_or_else(|| EngineError::Validation(format!("unknown offer alias: {alias}")))
    }

    async fn booking(&self, offer_alias: &str) -> Result<TripBooking> {
        let offer_id = self.offer_id(offer_alias)?;
        self.engine.booking_by_offer(offer_id).await
    }
}

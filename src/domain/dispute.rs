use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::booking::BookingStatus;
use crate::domain::money::share_of;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    Resolved,
}

/// Admin arbitration outcome. Each decision maps to a fixed settlement split
/// and a decision-specific terminal booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeDecision {
    GuideWins,
    UserWins,
    SplitCost,
}

impl DisputeDecision {
    /// The guide's share of the escrowed total, rounded to cents. The
    /// traveler is always refunded the exact remainder.
    pub fn guide_share(&self, total: Decimal) -> Decimal {
        match self {
            DisputeDecision::GuideWins => share_of(total, 1, 2),
            DisputeDecision::UserWins => Decimal::ZERO,
            DisputeDecision::SplitCost => share_of(total, 1, 4),
        }
    }

    /// `GuideWins` converges with the undisputed no-show default: same split,
    /// same terminal status.
    pub fn terminal_status(&self) -> BookingStatus {
        match self {
            DisputeDecision::GuideWins => BookingStatus::NoShowConfirmed,
            DisputeDecision::UserWins => BookingStatus::NoShowRefunded,
            DisputeDecision::SplitCost => BookingStatus::NoShowSplit,
        }
    }
}

/// A traveler's formal contest of a guide's no-show report.
///
/// Never physically deleted; resolution records the decision and the admin's
/// mandatory justification and the report stays readable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeReport {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub reporter: Uuid,
    pub reported: Uuid,
    pub description: String,
    pub evidence_ref: Option<String>,
    pub status: DisputeStatus,
    pub decision: Option<DisputeDecision>,
    pub justification: Option<String>,
    pub filed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DisputeReport {
    pub fn file(
        booking_id: Uuid,
        reporter: Uuid,
        reported: Uuid,
        description: String,
        evidence_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            reporter,
            reported,
            description,
            evidence_ref,
            status: DisputeStatus::Pending,
            decision: None,
            justification: None,
            filed_at: now,
            resolved_at: None,
        }
    }

    /// Records the admin's decision provisionally. The dispute stays
    /// `Pending` until the settlement commits, so a failed settlement can be
    /// retried; [`DisputeReport::mark_resolved`] makes it final.
    pub fn record_decision(
        &mut self,
        decision: DisputeDecision,
        justification: String,
    ) -> Result<()> {
        if self.status == DisputeStatus::Resolved {
            return Err(EngineError::AlreadyResolved);
        }
        if justification.trim().is_empty() {
            return Err(EngineError::Validation(
                "a resolution justification is required".to_string(),
            ));
        }
        self.decision = Some(decision);
        self.justification = Some(justification);
        Ok(())
    }

    pub fn mark_resolved(&mut self, now: DateTime<Utc>) {
        self.status = DisputeStatus::Resolved;
        self.resolved_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_settlement_table() {
        let total = dec!(4000);
        assert_eq!(DisputeDecision::GuideWins.guide_share(total), dec!(2000));
        assert_eq!(DisputeDecision::UserWins.guide_share(total), dec!(0));
        assert_eq!(DisputeDecision::SplitCost.guide_share(total), dec!(1000));
    }

    #[test]
    fn test_terminal_statuses() {
        assert_eq!(
            DisputeDecision::GuideWins.terminal_status(),
            BookingStatus::NoShowConfirmed
        );
        assert_eq!(
            DisputeDecision::UserWins.terminal_status(),
            BookingStatus::NoShowRefunded
        );
        assert_eq!(
            DisputeDecision::SplitCost.terminal_status(),
            BookingStatus::NoShowSplit
        );
    }

    #[test]
    fn test_justification_required() {
        let mut d = DisputeReport::file(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "guide never showed".to_string(),
            None,
            Utc::now(),
        );
        assert!(matches!(
            d.record_decision(DisputeDecision::SplitCost, "   ".to_string()),
            Err(EngineError::Validation(_))
        ));
        d.record_decision(DisputeDecision::SplitCost, "partial blame".to_string())
            .unwrap();
    }

    #[test]
    fn test_resolution_is_final() {
        let mut d = DisputeReport::file(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "guide never showed".to_string(),
            Some("evidence-123".to_string()),
            Utc::now(),
        );
        d.record_decision(DisputeDecision::UserWins, "no guide activity".to_string())
            .unwrap();
        d.mark_resolved(Utc::now());
        assert!(matches!(
            d.record_decision(DisputeDecision::GuideWins, "changed my mind".to_string()),
            Err(EngineError::AlreadyResolved)
        ));
    }
}

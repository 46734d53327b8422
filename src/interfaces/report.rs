use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

use crate::application::engine::TripEngine;
use crate::domain::payment::PaymentStatus;
use crate::error::Result;
use crate::interfaces::jsonl::EventReplayer;

/// One booking's final escrow position in the settlement report.
#[derive(Debug, Serialize)]
pub struct SettlementRow {
    pub offer: String,
    pub status: String,
    pub total: Decimal,
    pub released: Decimal,
    pub refunded: Decimal,
    pub in_escrow: Decimal,
}

/// Collects a row per booking, in creation order.
pub async fn settlement_rows(
    engine: &TripEngine,
    replayer: &EventReplayer,
) -> Result<Vec<SettlementRow>> {
    let mut rows = Vec::new();
    for booking in engine.all_bookings().await? {
        let payment = engine.payment(booking.id).await?;
        let offer = replayer
            .offer_alias(booking.offer_id)
            .unwrap_or_default()
            .to_string();
        // Nothing is held for a booking that was never captured.
        let in_escrow = if payment.status == PaymentStatus::Pending {
            Decimal::ZERO
        } else {
            payment.headroom()
        };
        rows.push(SettlementRow {
            offer,
            status: booking.status.as_str().to_string(),
            total: payment.total,
            released: payment.released,
            refunded: payment.refunded,
            in_escrow,
        });
    }
    Ok(rows)
}

pub fn write_settlement<W: Write>(rows: &[SettlementRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

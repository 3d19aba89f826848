//! Reservation lifecycle events.

use rungate_core::hooks::EventKind;

/// Events fired by the capacity ledger as reservations move through their
/// lifecycle. Register for them through the `on_*` methods on
/// [`crate::CapacityLedgerBuilder`].
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// A reservation was granted against available headroom.
    ReservationGranted {
        /// Ledger-assigned reservation id.
        reservation_id: u64,
        /// Tool that requested the reservation.
        tool: String,
    },
    /// An unconsumed reservation hit its TTL and was reclaimed by the sweep.
    ReservationExpired {
        /// Ledger-assigned reservation id.
        reservation_id: u64,
        /// Tool that held the reservation.
        tool: String,
    },
    /// A reservation was released by its holder.
    ReservationReleased {
        /// Ledger-assigned reservation id.
        reservation_id: u64,
    },
}

impl EventKind for LedgerEvent {
    fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ReservationGranted { .. } => "reservation_granted",
            LedgerEvent::ReservationExpired { .. } => "reservation_expired",
            LedgerEvent::ReservationReleased { .. } => "reservation_released",
        }
    }
}

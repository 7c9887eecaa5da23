//! `stockflow-reservations` — reservation lifecycle and allocation planning.
//!
//! A reservation is a multi-item, multi-warehouse hold on ledger stock tied
//! to an external order. This crate owns the status state machine and the
//! pure cross-warehouse allocator; applying a plan against the ledger is the
//! infra coordinator's job.

pub mod allocator;
pub mod reservation;

pub use allocator::{
    allocate, AllocationError, AllocationPlan, BasketLine, CandidateStock, PlanEntry, Shortfall,
};
pub use reservation::{Reservation, ReservationAction, ReservationItem, ReservationStatus};

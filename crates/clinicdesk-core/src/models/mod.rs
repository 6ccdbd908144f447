//! Data models for the clinic backend.
//!
//! - Auth wire types: `AuthResponse`, `SignupData`, `UserInfo`
//! - Appointments: `Appointment`, `AppointmentsResponse`, `AppointmentsParams`
//! - Availability calendar: `AvailabilitySlot`, `AvailabilityUpdate`

pub mod appointment;
pub mod auth;
pub mod availability;

pub use appointment::{
    Appointment, AppointmentStatus, AppointmentsParams, AppointmentsResponse, Pagination,
};
pub use auth::{AuthResponse, SignupData, UserInfo};
pub use availability::{AvailabilitySlot, AvailabilityUpdate, NewSlot, SlotRef};

// libs/consultation-cell/src/lib.rs
//! # Consultation Cell
//!
//! Owns the consultation record and its lifecycle:
//!
//! - `services::transitions` - the status state machine and the per-role action table
//! - `services::repository` - record store access (Supabase and in-memory)
//! - `services::consultation` - booking, assignment, scheduling and doctor updates
//!
//! Every status write in the workspace goes through `ConsultationService`, which
//! consults the transition table before touching the store.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Action, Actor, Consultation, ConsultationError, ConsultationStatus, ConsultationType,
    Contact, ConsultationContacts,
};
pub use router::{consultation_routes, consultation_routes_with_service};
pub use services::{
    ConsultationRepository, ConsultationService, InMemoryConsultationRepository,
    SupabaseConsultationRepository,
};

pub mod consultation;
pub mod repository;
pub mod transitions;

pub use consultation::{ConsultationService, PaymentCascade};
pub use repository::{
    ConsultationRepository, InMemoryConsultationRepository, SupabaseConsultationRepository,
};

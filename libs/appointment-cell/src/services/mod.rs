pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod patients;
pub mod store;
pub mod supabase_store;
pub mod sweeper;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use patients::{TherapistPatientService, PATIENT_HISTORY_PAGE_SIZE};
pub use store::{AppointmentRepository, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
pub use sweeper::spawn_finish_sweeper;

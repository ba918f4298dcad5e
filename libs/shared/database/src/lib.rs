pub mod supabase;

pub use supabase::{rest_path, DatabaseError, Prefer, SupabaseClient};

pub mod directory;
pub mod profile;

pub use directory::{InMemoryUserDirectory, SupabaseUserDirectory, UserDirectory};
pub use profile::{validate_username, UserService};

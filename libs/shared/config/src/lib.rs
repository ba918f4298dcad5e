use std::env;
use std::str::FromStr;
use tracing::warn;

/// Where the cells keep their documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            "supabase" => Ok(StorageBackend::Supabase),
            other => Err(format!("Unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub supabase_jwt_secret: String,
    pub storage_backend: StorageBackend,
    pub server_port: u16,
    /// Offset of the clinic's wall clock from UTC; slot labels are in clinic time.
    pub clinic_utc_offset_minutes: i32,
    pub session_duration_minutes: u32,
    pub message_encryption_key: String,
    pub notification_max_retries: u32,
    pub finish_sweep_interval_secs: u64,
    pub chat_room_capacity: usize,
    pub user_seed_path: Option<String>,
}

/// Upper bound for `NOTIFICATION_MAX_RETRIES`.
pub const MAX_NOTIFICATION_RETRIES: u32 = 10;

fn clamp_retries(requested: u32) -> u32 {
    if requested > MAX_NOTIFICATION_RETRIES {
        warn!(
            "NOTIFICATION_MAX_RETRIES={} is too high, using {}",
            requested, MAX_NOTIFICATION_RETRIES
        );
        return MAX_NOTIFICATION_RETRIES;
    }
    requested
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|raw| match raw.parse() {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        warn!("{}, falling back to in-memory storage", e);
                        None
                    }
                })
                .unwrap_or(StorageBackend::Memory),
            server_port: var_or("SERVER_PORT", 5000),
            clinic_utc_offset_minutes: var_or("CLINIC_UTC_OFFSET_MINUTES", 0),
            session_duration_minutes: var_or("SESSION_DURATION_MINUTES", 60),
            message_encryption_key: env::var("MESSAGE_ENCRYPTION_KEY")
                .unwrap_or_else(|_| {
                    warn!("MESSAGE_ENCRYPTION_KEY not set, using development key");
                    "sentivoice-development-message-key".to_string()
                }),
            notification_max_retries: clamp_retries(var_or("NOTIFICATION_MAX_RETRIES", 3)),
            finish_sweep_interval_secs: var_or("FINISH_SWEEP_INTERVAL_SECS", 300),
            chat_room_capacity: var_or("CHAT_ROOM_CAPACITY", 100),
            user_seed_path: env::var("USER_SEED_PATH").ok(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
            && (self.storage_backend == StorageBackend::Memory || self.is_supabase_configured())
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storage_backend_names() {
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!(" Supabase ".parse::<StorageBackend>(), Ok(StorageBackend::Supabase));
        assert!("mongo".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn clamps_notification_retries() {
        assert_eq!(clamp_retries(3), 3);
        assert_eq!(clamp_retries(MAX_NOTIFICATION_RETRIES), MAX_NOTIFICATION_RETRIES);
        assert_eq!(clamp_retries(40), MAX_NOTIFICATION_RETRIES);
    }
}

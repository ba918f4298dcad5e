use chrono::{NaiveTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Session modality, shared by availability windows and appointments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    #[default]
    #[serde(alias = "in_person", alias = "inperson")]
    InPerson,
    Online,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::InPerson => write!(f, "in-person"),
            SessionType::Online => write!(f, "online"),
        }
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "in-person" | "in_person" | "inperson" => Ok(SessionType::InPerson),
            "online" => Ok(SessionType::Online),
            other => Err(format!("Unknown session type '{}'", other)),
        }
    }
}

/// A slot label such as `"2:00 PM"`.
///
/// Accepts 12h and 24h spellings and always renders the 12h label, so two
/// spellings of the same slot compare equal. Slots have minute resolution:
/// seconds in the input are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(NaiveTime);

const SLOT_FORMATS: [&str; 4] = ["%I:%M %p", "%I:%M%p", "%H:%M", "%H:%M:%S"];

impl SlotTime {
    pub fn new(time: NaiveTime) -> Self {
        Self(truncate_to_minute(time))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn label(&self) -> String {
        self.0.format("%-I:%M %p").to_string()
    }
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for SlotTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        SLOT_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(&normalized, format).ok())
            .map(SlotTime::new)
            .ok_or_else(|| format!("Invalid time '{}', expected e.g. '2:00 PM' or '14:00'", value))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

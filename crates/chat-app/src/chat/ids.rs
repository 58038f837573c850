use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(display("identifier '{raw}' is invalid for {id_type}"))]
pub struct IdError {
    stage: &'static str,
    id_type: &'static str,
    raw: String,
    source: ParseIntError,
}

// Both id types share one shape; snapshots store them as decimal strings.
macro_rules! define_chat_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn parse(raw: &str) -> Result<Self, IdError> {
                let parsed = raw.trim().parse::<u64>().context(IdSnafu {
                    stage: "parse-chat-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(raw: &str) -> Result<Self, IdError> {
                Self::parse(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct IdVisitor;

                impl Visitor<'_> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(formatter, "a {} as a decimal string or integer", $id_type)
                    }

                    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        $name::parse(value).map_err(E::custom)
                    }

                    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        Ok($name(value))
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

define_chat_id!(ChatId, "chat-id");
define_chat_id!(MessageId, "message-id");

/// Highest persisted id the generator will seed itself above.
pub const SEED_CEILING: u64 = u64::MAX / 2;

/// Hands out strictly increasing raw ids shared by chats and messages.
///
/// The first id is never below the current unix time in milliseconds, which keeps
/// new ids above anything written by earlier runs that used timestamps as ids.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Seeds the counter above both the clock and `floor`.
    ///
    /// A floor at or above [`SEED_CEILING`] is ignored: the counter starts far below
    /// it and cannot climb that high, so such ids are never reissued either way.
    pub fn seeded_above(floor: Option<u64>) -> Self {
        let after_floor = floor
            .filter(|raw| *raw < SEED_CEILING)
            .map_or(0, |raw| raw + 1);
        Self::starting_at(current_unix_millis().max(after_floor))
    }

    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn chat_id(&self) -> ChatId {
        ChatId::new(self.next_raw())
    }

    pub fn message_id(&self) -> MessageId {
        MessageId::new(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::seeded_above(None)
    }
}

pub fn current_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

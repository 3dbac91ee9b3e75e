//! Identifier service.
//!
//! Primary ids are 26-character ULIDs: a 48-bit millisecond timestamp
//! followed by 80 random bits, Crockford base32 encoded so that string order
//! equals generation order. Within one millisecond the random part is
//! incremented instead of redrawn, so ids from one process strictly increase.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use ulid::Ulid;

use crate::error::IdError;

/// Length of every generated id.
pub const ID_LEN: usize = 26;

const RANDOM_BITS: u32 = 80;
const RANDOM_MAX: u128 = (1u128 << RANDOM_BITS) - 1;

static GENERATOR: Lazy<Mutex<IdGenerator>> = Lazy::new(|| Mutex::new(IdGenerator::new()));

/// Generate a new process-wide monotonic id.
///
/// # Errors
///
/// Returns [`IdError::Rng`] if the OS random source fails and
/// [`IdError::Overflow`] if 2^80 ids were requested in one millisecond.
pub fn generate_id() -> Result<String, IdError> {
    let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    GENERATOR
        .lock()
        .next(now_ms, &mut OsRng)
        .map(|id| id.to_string())
}

/// Return `2 * n` lowercase hex characters drawn from the OS random source.
///
/// # Errors
///
/// Returns [`IdError::Rng`] if the random source fails.
pub fn random_hex(n: usize) -> Result<String, IdError> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| IdError::Rng(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Validate an id and return the time embedded in it.
///
/// # Errors
///
/// Returns [`IdError::Invalid`] if `value` is not a well-formed id.
pub fn parse_id(value: &str) -> Result<DateTime<Utc>, IdError> {
    let invalid = |reason: String| IdError::Invalid {
        value: value.to_string(),
        reason,
    };
    if value.len() != ID_LEN {
        return Err(invalid(format!("expected {ID_LEN} characters")));
    }
    let ulid = Ulid::from_string(value).map_err(|e| invalid(e.to_string()))?;
    let ms = i64::try_from(ulid.timestamp_ms()).map_err(|e| invalid(e.to_string()))?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| invalid("timestamp out of range".into()))
}

/// Monotonic ULID state. One instance backs [`generate_id`]; separate
/// instances exist for tests that drive the clock by hand.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Option<(u64, u128)>,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id for wall-clock time `now_ms`.
    ///
    /// A clock that stands still or moves backwards keeps the previous
    /// timestamp and increments the random part.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Rng`] when `rng` fails, [`IdError::Overflow`] when
    /// the random part is exhausted.
    pub fn next<R: RngCore>(&mut self, now_ms: u64, rng: &mut R) -> Result<Ulid, IdError> {
        let (ms, random) = match self.last {
            Some((last_ms, last_random)) if now_ms <= last_ms => {
                if last_random >= RANDOM_MAX {
                    return Err(IdError::Overflow);
                }
                (last_ms, last_random + 1)
            }
            _ => (now_ms, draw_random(rng)?),
        };
        self.last = Some((ms, random));
        Ok(Ulid::from_parts(ms, random))
    }
}

fn draw_random<R: RngCore>(rng: &mut R) -> Result<u128, IdError> {
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes[6..])
        .map_err(|e| IdError::Rng(e.to_string()))?;
    Ok(u128::from_be_bytes(bytes) & RANDOM_MAX)
}

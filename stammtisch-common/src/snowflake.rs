//! Time-ordered ids in the classic snowflake layout.
//!
//! A snowflake packs a millisecond timestamp measured from a configurable
//! epoch, a worker id, a process id, and a per-process increment into one
//! `u64`. Ids generated this way sort by creation time, with the low bits
//! breaking ties between ids minted in the same millisecond.

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u64 = 42;
pub const WORKER_ID_BITS: u64 = 5;
pub const PROCESS_ID_BITS: u64 = 5;
pub const INCREMENT_BITS: u64 = 12;

pub const TIMESTAMP_OFFSET: u64 = WORKER_ID_BITS + PROCESS_ID_BITS + INCREMENT_BITS;
pub const WORKER_ID_OFFSET: u64 = PROCESS_ID_BITS + INCREMENT_BITS;
pub const PROCESS_ID_OFFSET: u64 = INCREMENT_BITS;

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimeError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Specified time does not fit into the timestamp bits.")]
    TimestampTooLarge,
}

/// Milliseconds between the epoch of `E` and `time`, checked against the
/// timestamp bit width.
pub fn millis_since_epoch<E: Epoch>(time: UtcDateTime) -> Result<u64, SnowflakeTimeError> {
    let millis = (time - E::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeTimeError::TimeBeforeEpoch);
    }
    let millis = u64::try_from(millis).map_err(|_| SnowflakeTimeError::TimestampTooLarge)?;
    if millis >= 1 << TIMESTAMP_BITS {
        return Err(SnowflakeTimeError::TimestampTooLarge);
    }
    Ok(millis)
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct WorkerId(u8);

impl WorkerId {
    #[must_use]
    pub fn new(id: u8) -> Option<Self> {
        (u64::from(id) < 1 << WORKER_ID_BITS).then_some(Self(id))
    }

    #[must_use]
    pub fn new_unchecked(id: u8) -> Self {
        Self::new(id).expect("WorkerId out of range.")
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct ProcessId(u8);

impl ProcessId {
    #[must_use]
    pub fn new(id: u8) -> Option<Self> {
        (u64::from(id) < 1 << PROCESS_ID_BITS).then_some(Self(id))
    }

    #[must_use]
    pub fn new_unchecked(id: u8) -> Self {
        Self::new(id).expect("ProcessId out of range.")
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for WorkerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = u8::deserialize(deserializer)?;
        WorkerId::new(inner)
            .ok_or_else(|| Error::invalid_value(Unexpected::Unsigned(inner.into()), &"WorkerId"))
    }
}

impl<'de> Deserialize<'de> for ProcessId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = u8::deserialize(deserializer)?;
        ProcessId::new(inner)
            .ok_or_else(|| Error::invalid_value(Unexpected::Unsigned(inner.into()), &"ProcessId"))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Increment(u16);

impl Increment {
    #[must_use]
    pub fn new(increment: u16) -> Option<Self> {
        (u64::from(increment) < 1 << INCREMENT_BITS).then_some(Self(increment))
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) % (1 << INCREMENT_BITS))
    }

    pub fn advance(&mut self) {
        *self = self.next();
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp_millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: Increment,
    ) -> Self {
        let snowflake = timestamp_millis << TIMESTAMP_OFFSET
            | u64::from(worker_id.get()) << WORKER_ID_OFFSET
            | u64::from(process_id.get()) << PROCESS_ID_OFFSET
            | u64::from(increment.get());

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        self.0 >> TIMESTAMP_OFFSET
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        WorkerId((self.0 >> WORKER_ID_OFFSET) as u8 & ((1 << WORKER_ID_BITS) - 1))
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        #[allow(clippy::cast_possible_truncation)]
        ProcessId((self.0 >> PROCESS_ID_OFFSET) as u8 & ((1 << PROCESS_ID_BITS) - 1))
    }

    #[must_use]
    pub fn increment(self) -> Increment {
        #[allow(clippy::cast_possible_truncation)]
        Increment(self.0 as u16 & ((1 << INCREMENT_BITS) - 1))
    }
}

impl<SnowflakeEpoch: Epoch> Snowflake<SnowflakeEpoch> {
    /// The creation time encoded in the timestamp bits.
    #[must_use]
    pub fn created_at(self) -> UtcDateTime {
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.timestamp_millis() as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    next_increment: Increment,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: Increment::default(),
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        self.process_id
    }
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimeError> {
        let timestamp_millis = millis_since_epoch::<SnowflakeEpoch>(time)?;

        let increment = self.next_increment;
        self.next_increment.advance();

        Ok(Snowflake::from_parts(
            timestamp_millis,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    #[must_use]
    pub fn generate(&mut self) -> Snowflake<SnowflakeEpoch> {
        self.generate_at(UtcDateTime::now())
            .expect("System time not representable as a snowflake timestamp.")
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, Increment, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeTimeError, WorkerId,
        millis_since_epoch,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn part_ranges() {
        for legal in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal).is_some());
            assert!(ProcessId::new(legal).is_some());
        }
        for illegal in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal).is_none());
            assert!(ProcessId::new(illegal).is_none());
        }

        for legal in [0, 0xFF, 0xFFF] {
            assert!(Increment::new(legal).is_some());
        }
        for illegal in [0x1000, 0xFF00, u16::MAX] {
            assert!(Increment::new(illegal).is_none());
        }
    }

    #[test]
    fn millis_range_checks() {
        assert_eq!(millis_since_epoch::<MillennialEpoch>(MillennialEpoch::EPOCH_TIME), Ok(0));
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimeError::TimeBeforeEpoch)
        );
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x03FF_FFFF_FFFF)
            ),
            Ok(0x03FF_FFFF_FFFF)
        );
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimeError::TimestampTooLarge)
        );
    }

    #[test]
    fn increment_wraps() {
        assert_eq!(Increment::new(0).unwrap().next(), Increment::new(1).unwrap());
        assert_eq!(Increment::new(0xFFF).unwrap().next(), Increment::new(0).unwrap());

        let mut increment = Increment::new(0xFFE).unwrap();
        increment.advance();
        assert_eq!(increment, Increment::new(0xFFF).unwrap());
        increment.advance();
        assert_eq!(increment, Increment::new(0).unwrap());
    }

    #[test]
    fn parts_round_trip() {
        let time = utc_datetime!(2025-10-24 10:30);
        let timestamp_millis = millis_since_epoch::<MillennialEpoch>(time).unwrap();
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();
        let increment = Increment::new(100).unwrap();

        let snowflake = Snowflake::<MillennialEpoch>::from_parts(
            timestamp_millis,
            worker_id,
            process_id,
            increment,
        );

        assert_eq!(snowflake.timestamp_millis(), timestamp_millis);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), increment);
        assert_eq!(snowflake.created_at(), time);
    }

    #[test]
    fn generator_is_monotonic_within_a_millisecond() {
        let worker_id = WorkerId::new(10).unwrap();
        let process_id = ProcessId::new(0).unwrap();
        let time = utc_datetime!(2025-10-24 10:55);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();

        assert_eq!(first.increment(), Increment::new(0).unwrap());
        assert_eq!(second.increment(), Increment::new(1).unwrap());
        assert!(first < second);
    }
}

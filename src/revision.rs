//! Revision stamps and their allocation.

use crate::error::StoreError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A totally ordered, globally unique version stamp.
///
/// Ordering is lexicographic on (timestamp, counter, cluster id), which the
/// derived `Ord` provides through field order. Revisions are immutable and
/// never reused: each cluster node allocates strictly increasing stamps
/// through its own [`RevisionGenerator`], and the cluster id disambiguates
/// stamps from different writer processes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    timestamp: u64,
    counter: u32,
    cluster_id: u32,
}

impl Revision {
    pub fn new(timestamp: u64, counter: u32, cluster_id: u32) -> Self {
        Self {
            timestamp,
            counter,
            cluster_id,
        }
    }

    /// Milliseconds since the Unix epoch at allocation time.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Tie-breaker within one millisecond.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Identifier of the writer process that allocated this revision.
    pub fn cluster_id(&self) -> u32 {
        self.cluster_id
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.timestamp, self.counter, self.cluster_id)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self)
    }
}

impl FromStr for Revision {
    type Err = StoreError;

    /// Parses the canonical `"<timestamp>-<counter>-<clusterId>"` form.
    /// Total inverse of `Display`: anything that does not round-trip is
    /// rejected with [`StoreError::MalformedRevision`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || StoreError::MalformedRevision(s.to_string());

        let mut parts = s.split('-');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(c), Some(n), None) => Ok(Revision {
                timestamp: t.parse().map_err(|_| malformed())?,
                counter: c.parse().map_err(|_| malformed())?,
                cluster_id: n.parse().map_err(|_| malformed())?,
            }),
            _ => Err(malformed()),
        }
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Low bits of the packed allocation word reserved for the counter.
const COUNTER_BITS: u32 = 20;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Allocates strictly increasing revisions for one cluster node.
///
/// The last issued (timestamp, counter) pair is packed into a single atomic
/// word and advanced with a compare-and-swap loop, so allocation is lock-free
/// and never blocks. When the clock stalls (or runs backwards) the counter
/// advances instead; a counter overflow carries into the timestamp, which
/// keeps the tuple strictly increasing in every case.
pub struct RevisionGenerator {
    cluster_id: u32,
    last: AtomicU64,
}

impl RevisionGenerator {
    pub fn new(cluster_id: u32) -> Self {
        Self {
            cluster_id,
            last: AtomicU64::new(0),
        }
    }

    pub fn cluster_id(&self) -> u32 {
        self.cluster_id
    }

    /// Allocate the next revision. Thread-safe; every returned revision
    /// compares strictly greater than any previously returned one.
    pub fn next(&self) -> Revision {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let now = current_time_millis() << COUNTER_BITS;
            let next = if now > prev { now } else { prev + 1 };
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    return Revision::new(
                        next >> COUNTER_BITS,
                        (next & COUNTER_MASK) as u32,
                        self.cluster_id,
                    );
                }
                Err(observed) => prev = observed,
            }
        }
    }
}

fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

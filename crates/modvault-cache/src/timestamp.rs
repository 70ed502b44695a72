use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A file modification time, represented as nanoseconds since the Unix
/// epoch so it can be compared, serialized, and hashed without lossy
/// float arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i128);

impl Timestamp {
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or_else(|err| -(err.duration().as_nanos() as i128));
        Self(nanos)
    }

    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        metadata
            .modified()
            .map(Self::from_system_time)
            .unwrap_or(Self(0))
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs_err::metadata(path)?))
    }

    #[must_use]
    pub const fn as_nanos(self) -> i128 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_wallclock() {
        let earlier = Timestamp::from_system_time(SystemTime::UNIX_EPOCH);
        let later = Timestamp::from_system_time(SystemTime::now());
        assert!(earlier < later);
    }
}

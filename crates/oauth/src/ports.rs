use std::{fmt, str::FromStr};

/// Lowest port tried for the local callback listener by default.
pub const DEFAULT_MIN_CALLBACK_PORT: u16 = 32768;
/// Highest port tried for the local callback listener by default.
pub const DEFAULT_MAX_CALLBACK_PORT: u16 = 61000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid callback port range `{0}`: expected MIN-MAX with 0 < MIN <= MAX")]
pub struct InvalidPortRange(String);

/// Inclusive range of candidate ports for the callback listener.
///
/// Ports are tried lowest first; every failed attempt consumes the current
/// lowest port until the range is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCandidateRange {
    min: u16,
    max: u16,
}

impl PortCandidateRange {
    pub fn new(min: u16, max: u16) -> Result<Self, InvalidPortRange> {
        if min == 0 || min > max {
            return Err(InvalidPortRange(format!("{min}-{max}")));
        }
        Ok(Self { min, max })
    }

    /// Range holding exactly one port.
    pub fn single(port: u16) -> Result<Self, InvalidPortRange> {
        Self::new(port, port)
    }

    pub fn lowest(&self) -> u16 {
        self.min
    }

    pub fn highest(&self) -> u16 {
        self.max
    }

    /// Number of candidate ports, always at least one.
    pub fn length(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// The range without its lowest port, or `None` when that was the last one.
    pub fn consume_lower(&self) -> Option<Self> {
        (self.min < self.max).then(|| Self {
            min: self.min + 1,
            max: self.max,
        })
    }
}

impl Default for PortCandidateRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_CALLBACK_PORT,
            max: DEFAULT_MAX_CALLBACK_PORT,
        }
    }
}

impl fmt::Display for PortCandidateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for PortCandidateRange {
    type Err = InvalidPortRange;

    /// Parses `MIN-MAX` or a single `PORT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPortRange(s.to_string());
        let parse = |part: &str| part.trim().parse::<u16>().map_err(|_| invalid());
        match s.split_once('-') {
            Some((min, max)) => Self::new(parse(min)?, parse(max)?).map_err(|_| invalid()),
            None => Self::single(parse(s)?).map_err(|_| invalid()),
        }
    }
}

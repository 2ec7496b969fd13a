use tracing::warn;

pub const STAGING_BUFFER_SIZE_ENV: &str = "DARE_STAGING_BUFFER_SIZE";
pub const STAGING_BUFFER_COUNT_ENV: &str = "DARE_STAGING_BUFFER_COUNT";

/// Smallest staging buffer the copy engine accepts
pub const MIN_STAGING_BUFFER_SIZE: u64 = 32;

/// Sizing of the copy engine's staging ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Bytes of staging memory owned by each resource set. Also the chunk size large buffer
    /// uploads are split into
    pub staging_buffer_size: u64,
    /// Number of resource sets rotated by the copy engine
    pub staging_buffer_count: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            staging_buffer_size: 8 * 1024 * 1024,
            staging_buffer_count: 2,
        }
    }
}

impl StreamingConfig {
    /// Reads overrides from `DARE_STAGING_BUFFER_SIZE` and `DARE_STAGING_BUFFER_COUNT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config out of an arbitrary key lookup. Missing keys keep their defaults, values
    /// which fail to parse are reported and ignored
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(STAGING_BUFFER_SIZE_ENV) {
            match parse_size(&value) {
                Ok(size) => config.staging_buffer_size = size,
                Err(e) => warn!("Ignoring {STAGING_BUFFER_SIZE_ENV}={value:?}: {e}"),
            }
        }
        if let Some(value) = lookup(STAGING_BUFFER_COUNT_ENV) {
            match value.trim().parse::<usize>() {
                Ok(count) => config.staging_buffer_count = count,
                Err(e) => warn!("Ignoring {STAGING_BUFFER_COUNT_ENV}={value:?}: {e}"),
            }
        }
        config.validated()
    }

    /// Clamps both knobs to their minimum
    pub fn validated(mut self) -> Self {
        if self.staging_buffer_size < MIN_STAGING_BUFFER_SIZE {
            warn!(
                "Staging buffer size {} is below the minimum, using {}",
                self.staging_buffer_size, MIN_STAGING_BUFFER_SIZE
            );
            self.staging_buffer_size = MIN_STAGING_BUFFER_SIZE;
        }
        if self.staging_buffer_count == 0 {
            warn!("Staging buffer count of 0 requested, using 1");
            self.staging_buffer_count = 1;
        }
        self
    }
}

/// Accepts plain byte counts as well as `K`, `M` and `G` binary suffixes
fn parse_size(value: &str) -> anyhow::Result<u64> {
    let value = value.trim();
    let (digits, shift) = match value.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&value[..value.len() - 1], 10),
        Some('M') => (&value[..value.len() - 1], 20),
        Some('G') => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };
    let base: u64 = digits.trim().parse()?;
    base.checked_mul(1 << shift)
        .ok_or_else(|| anyhow::anyhow!("{value} overflows a 64 bit size"))
}

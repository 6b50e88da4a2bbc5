use chrono::TimeDelta;

/// Retention tags every deployment understands, with their interval in hours.
const STANDARD_INTERVALS: [(&str, i64); 7] = [
    ("hourly", 1),
    ("daily", 24),
    ("weekly", 7 * 24),
    ("biweekly", 14 * 24),
    ("monthly", 28 * 24),
    ("quarterly", 91 * 24),
    ("yearly", 365 * 24),
];

/// Maps tag names to the maximum age an archive may have and still count as fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    intervals: Vec<(String, TimeDelta)>,
}

impl RetentionPolicy {
    pub fn standard() -> Self {
        Self {
            intervals: STANDARD_INTERVALS
                .iter()
                .map(|(name, hours)| (name.to_string(), TimeDelta::hours(*hours)))
                .collect(),
        }
    }

    /// Adds a tag, or replaces the interval of an existing one.
    pub fn with_interval(mut self, tag: &str, interval: TimeDelta) -> Self {
        match self.intervals.iter_mut().find(|(name, _)| name == tag) {
            Some(existing) => existing.1 = interval,
            None => self.intervals.push((tag.to_string(), interval)),
        }
        self
    }

    pub fn interval(&self, tag: &str) -> Option<TimeDelta> {
        self.intervals
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, interval)| *interval)
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.intervals.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Splits a comma separated tag list such as `"daily, weekly"`.
///
/// Order is kept and unknown names are passed through; the scheduler reports them.
pub fn parse_tag_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

//! Periodic table naming
//!
//! Tables are named `<prefix><number>` where the number counts fixed-length
//! periods since the Unix epoch. The interval a table covers is derived
//! solely from its name: table `n` spans `[n * period, (n + 1) * period - 1]`
//! milliseconds, inclusive on both ends.

use crate::chunk::types::TimeInterval;
use crate::error::{RetentionError, RetentionResult};

/// Milliseconds in one day, the conventional table period
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Naming scheme for time-partitioned index tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    prefix: String,
    period_millis: i64,
}

impl TableSchema {
    /// Create a schema with an arbitrary period
    ///
    /// # Panics
    /// Panics if the period is not positive
    pub fn new(prefix: impl Into<String>, period_millis: i64) -> Self {
        assert!(period_millis > 0, "TableSchema: period must be positive");
        Self {
            prefix: prefix.into(),
            period_millis,
        }
    }

    /// Conventional daily tables
    pub fn daily(prefix: impl Into<String>) -> Self {
        Self::new(prefix, DAY_MILLIS)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn period_millis(&self) -> i64 {
        self.period_millis
    }

    /// Name of table `number`
    pub fn table_name(&self, number: i64) -> String {
        format!("{}{}", self.prefix, number)
    }

    /// Name of the table covering `timestamp`
    pub fn table_for(&self, timestamp: i64) -> String {
        self.table_name(timestamp.div_euclid(self.period_millis))
    }

    /// Interval covered by a table, derived from its name
    pub fn interval_of(&self, table_name: &str) -> RetentionResult<TimeInterval> {
        let number = table_name
            .strip_prefix(&self.prefix)
            .ok_or_else(|| RetentionError::InvalidTableName(table_name.to_string()))?;
        let number: i64 = number
            .parse()
            .map_err(|_| RetentionError::InvalidTableName(table_name.to_string()))?;

        let start = number * self.period_millis;
        Ok(TimeInterval::new(start, start + self.period_millis - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_of_daily_table() {
        let schema = TableSchema::daily("index_");
        let interval = schema.interval_of("index_19000").unwrap();

        assert_eq!(interval.start, 19000 * DAY_MILLIS);
        assert_eq!(interval.end, 19001 * DAY_MILLIS - 1);
    }

    #[test]
    fn test_adjacent_tables_do_not_overlap() {
        let schema = TableSchema::daily("index_");
        let a = schema.interval_of("index_10").unwrap();
        let b = schema.interval_of("index_11").unwrap();

        assert_eq!(a.end + 1, b.start);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_table_for_timestamp() {
        let schema = TableSchema::new("t_", 1000);
        assert_eq!(schema.table_for(0), "t_0");
        assert_eq!(schema.table_for(999), "t_0");
        assert_eq!(schema.table_for(1000), "t_1");

        let interval = schema.interval_of(&schema.table_for(5500)).unwrap();
        assert!(interval.contains(5500));
    }

    #[test]
    fn test_invalid_table_names() {
        let schema = TableSchema::daily("index_");
        for bad in ["logs_42", "index_", "index_abc", "index_12x"] {
            assert!(matches!(
                schema.interval_of(bad),
                Err(RetentionError::InvalidTableName(_))
            ));
        }
    }
}

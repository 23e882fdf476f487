//! Time-to-live expiry for stored rows
//!
//! Envelopes carry their insertion time. Reads ignore envelopes older than
//! the TTL, and a periodic sweep reclaims them together with any attribute,
//! quote or sender rows no remaining envelope references.

use std::time::Duration;

use rusqlite::{Connection, params};

/// Number of inserts between two opportunistic sweeps
pub const SWEEP_INTERVAL: u64 = 256;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub envelopes: usize,
    pub attributes: usize,
    pub quotes: usize,
    pub senders: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.envelopes + self.attributes + self.quotes + self.senders
    }
}

/// TTL applied to envelope rows. A zero TTL never expires anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    ttl: Duration,
}

impl ExpiryPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn never() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Oldest `inserted_at` (unix seconds) still readable at `now`
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        if !self.is_enabled() {
            return None;
        }
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        Some(now.saturating_sub(ttl))
    }

    /// Cutoff usable directly as a query bound
    pub fn read_bound(&self, now: i64) -> i64 {
        self.cutoff(now).unwrap_or(i64::MIN)
    }

    /// Delete expired envelopes, then parents left without references.
    ///
    /// Sentinel rows (key 0) are never touched.
    pub fn sweep(&self, conn: &mut Connection, now: i64) -> rusqlite::Result<SweepStats> {
        let Some(cutoff) = self.cutoff(now) else {
            return Ok(SweepStats::default());
        };

        let tx = conn.transaction()?;
        let mut stats = SweepStats::default();

        stats.envelopes += tx.execute(
            "DELETE FROM group_message WHERE inserted_at < ?1",
            params![cutoff],
        )?;
        stats.envelopes += tx.execute(
            "DELETE FROM private_message WHERE inserted_at < ?1",
            params![cutoff],
        )?;

        stats.attributes = tx.execute(
            r#"
            DELETE FROM message_attribute
            WHERE id != 0
              AND id NOT IN (SELECT attribute_id FROM group_message)
              AND id NOT IN (SELECT attribute_id FROM private_message)
            "#,
            [],
        )?;
        stats.quotes = tx.execute(
            r#"
            DELETE FROM quoted_info
            WHERE id != 0
              AND id NOT IN (SELECT quoted_info_id FROM group_message)
              AND id NOT IN (SELECT quoted_info_id FROM private_message)
            "#,
            [],
        )?;
        stats.senders = tx.execute(
            r#"
            DELETE FROM uin_info
            WHERE uin != 0
              AND uin NOT IN (SELECT sender_uin FROM message_attribute)
            "#,
            [],
        )?;

        tx.commit()?;
        Ok(stats)
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let policy = ExpiryPolicy::never();
        assert!(!policy.is_enabled());
        assert_eq!(policy.cutoff(1_000), None);
        assert_eq!(policy.read_bound(1_000), i64::MIN);
    }

    #[test]
    fn test_cutoff() {
        let policy = ExpiryPolicy::new(Duration::from_secs(3600));
        assert!(policy.is_enabled());
        assert_eq!(policy.cutoff(10_000), Some(6_400));
        assert_eq!(policy.cutoff(i64::MIN), Some(i64::MIN));
    }

    #[test]
    fn test_sweep_noop_when_disabled() {
        let mut conn = Connection::open_in_memory().unwrap();
        let stats = ExpiryPolicy::never().sweep(&mut conn, 0).unwrap();
        assert_eq!(stats.total(), 0);
    }
}

//! Tumbling-window quota budget with hold/commit/release semantics.
//!
//! One [`WindowBudget`] guards one per-minute pool (tokens or requests).
//! All four entry points acquire the budget's mutex for their whole
//! duration; none of them suspends while holding it. There is no background
//! timer: the window rolls lazily, atomically with whichever operation
//! observed that it expired.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::{BudgetKind, BudgetSnapshot, Reservation};

/// Default tumbling-window length in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Outcome of a lock attempt on one budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Capacity was reserved under `handle` until reported, released, or
    /// reclaimed at window roll-over.
    Allowed {
        handle: String,
        available_after: u64,
        seconds_until_reset: u64,
    },
    /// The current window has no room for the requested amount.
    Denied { seconds_until_reset: u64 },
    /// The requested amount was not a positive integer; no state changed.
    Invalid { reason: String },
}

/// Outcome of a report or release.
///
/// A handle that has already been reclaimed by a window roll is benign:
/// clients cannot reliably observe window boundaries, so a lost handle is
/// success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled,
    AlreadyReclaimed,
}

struct WindowState {
    window_start: DateTime<Utc>,
    committed: u64,
    held: u64,
    reservations: HashMap<String, Reservation>,
}

/// A single tumbling-minute counter.
pub struct WindowBudget {
    kind: BudgetKind,
    limit: u64,
    window: Duration,
    state: Mutex<WindowState>,
}

impl WindowBudget {
    /// Create a budget with the standard 60-second window.
    pub fn new(kind: BudgetKind, limit: u64) -> Self {
        Self::with_window(kind, limit, Duration::seconds(DEFAULT_WINDOW_SECS))
    }

    /// Create a budget with a custom window length.
    ///
    /// The window length is an engineering parameter, not configuration:
    /// production always runs the 60-second window, and the short-window
    /// constructors exist for drills and time-dependent tests.
    pub fn with_window(kind: BudgetKind, limit: u64, window: Duration) -> Self {
        assert!(window > Duration::zero(), "window must be positive");
        Self {
            kind,
            limit,
            window,
            state: Mutex::new(WindowState {
                // Sentinel start: the first operation anchors the window to
                // the boundary containing its own clock observation.
                window_start: DateTime::<Utc>::MIN_UTC,
                committed: 0,
                held: 0,
                reservations: HashMap::new(),
            }),
        }
    }

    pub const fn kind(&self) -> BudgetKind {
        self.kind
    }

    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Reserve `amount` against the current window.
    pub async fn lock(&self, client_id: &str, amount: i64) -> LockOutcome {
        self.lock_at(Utc::now(), client_id, amount).await
    }

    /// Time-explicit variant of [`lock`](Self::lock); the service passes
    /// `Utc::now()`.
    pub async fn lock_at(&self, now: DateTime<Utc>, client_id: &str, amount: i64) -> LockOutcome {
        let mut state = self.state.lock().await;
        self.roll(&mut state, now);

        if amount <= 0 {
            return LockOutcome::Invalid {
                reason: format!("amount must be a positive integer, got {amount}"),
            };
        }
        let amount = amount.unsigned_abs();

        let in_use = state.committed.saturating_add(state.held);
        if in_use.saturating_add(amount) > self.limit {
            debug!(
                kind = %self.kind,
                client_id,
                amount,
                committed = state.committed,
                held = state.held,
                limit = self.limit,
                "lock denied"
            );
            return LockOutcome::Denied {
                seconds_until_reset: self.seconds_until_reset(&state, now),
            };
        }

        let handle = Uuid::new_v4().to_string();
        state.held += amount;
        state.reservations.insert(
            handle.clone(),
            Reservation {
                client_id: client_id.to_string(),
                amount,
                acquired_at: now,
            },
        );
        LockOutcome::Allowed {
            handle,
            available_after: self
                .limit
                .saturating_sub(state.committed.saturating_add(state.held)),
            seconds_until_reset: self.seconds_until_reset(&state, now),
        }
    }

    /// Commit actual usage for a reservation.
    ///
    /// `used` is authoritative: it may exceed the reserved amount (chat
    /// output length is unknown at lock time) and `committed` is never
    /// clamped, so the window can be transiently oversubscribed and
    /// subsequent locks deny until roll-over.
    pub async fn report(&self, handle: &str, used: i64) -> SettleOutcome {
        self.report_at(Utc::now(), handle, used).await
    }

    /// Time-explicit variant of [`report`](Self::report).
    pub async fn report_at(&self, now: DateTime<Utc>, handle: &str, used: i64) -> SettleOutcome {
        let mut state = self.state.lock().await;
        self.roll(&mut state, now);

        let Some(reservation) = state.reservations.remove(handle) else {
            return SettleOutcome::AlreadyReclaimed;
        };
        let used = used.max(0).unsigned_abs();
        if used > reservation.amount {
            // Observable signal for chronic under-estimation.
            warn!(
                kind = %self.kind,
                client_id = %reservation.client_id,
                reserved = reservation.amount,
                used,
                "reported usage exceeds reservation"
            );
        }
        state.held = state.held.saturating_sub(reservation.amount);
        state.committed = state.committed.saturating_add(used);
        SettleOutcome::Settled
    }

    /// Drop a reservation, returning its amount to the available pool.
    pub async fn release(&self, handle: &str) -> SettleOutcome {
        self.release_at(Utc::now(), handle).await
    }

    /// Time-explicit variant of [`release`](Self::release).
    pub async fn release_at(&self, now: DateTime<Utc>, handle: &str) -> SettleOutcome {
        let mut state = self.state.lock().await;
        self.roll(&mut state, now);

        let Some(reservation) = state.reservations.remove(handle) else {
            return SettleOutcome::AlreadyReclaimed;
        };
        state.held = state.held.saturating_sub(reservation.amount);
        SettleOutcome::Settled
    }

    /// Snapshot the current window.
    pub async fn status(&self) -> BudgetSnapshot {
        self.status_at(Utc::now()).await
    }

    /// Time-explicit variant of [`status`](Self::status).
    pub async fn status_at(&self, now: DateTime<Utc>) -> BudgetSnapshot {
        let mut state = self.state.lock().await;
        self.roll(&mut state, now);

        BudgetSnapshot {
            kind: self.kind,
            limit: self.limit,
            committed: state.committed,
            held: state.held,
            available: self
                .limit
                .saturating_sub(state.committed.saturating_add(state.held)),
            seconds_until_reset: self.seconds_until_reset(&state, now),
        }
    }

    /// Advance the window if `now` is at least one window length past its
    /// start. A backward clock jump never rewinds; a forward jump of any
    /// size advances to the new boundary exactly once.
    fn roll(&self, state: &mut WindowState, now: DateTime<Utc>) {
        if now.signed_duration_since(state.window_start) < self.window {
            return;
        }
        let discarded = state.held;
        if discarded > 0 || !state.reservations.is_empty() {
            debug!(
                kind = %self.kind,
                discarded_held = discarded,
                reservations = state.reservations.len(),
                "window rolled; outstanding reservations reclaimed"
            );
        }
        state.window_start = Self::window_floor(now, self.window);
        state.committed = 0;
        state.held = 0;
        state.reservations.clear();
    }

    /// Largest window boundary at or before `at`.
    fn window_floor(at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        let window_secs = window.num_seconds().max(1);
        let ts = at.timestamp();
        let floored = ts - ts.rem_euclid(window_secs);
        DateTime::from_timestamp(floored, 0).expect("window boundary within chrono range")
    }

    /// Whole seconds until the window rolls, rounded up, always in
    /// `(0, window]` after a roll check.
    fn seconds_until_reset(&self, state: &WindowState, now: DateTime<Utc>) -> u64 {
        let end = state.window_start + self.window;
        let remaining_ms = end.signed_duration_since(now).num_milliseconds();
        let secs = (remaining_ms + 999).div_euclid(1_000);
        u64::try_from(secs.max(1)).unwrap_or(1).min(self.window.num_seconds().unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn budget(limit: u64) -> WindowBudget {
        WindowBudget::new(BudgetKind::CompletionTokens, limit)
    }

    fn minute(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    fn handle_of(outcome: &LockOutcome) -> String {
        match outcome {
            LockOutcome::Allowed { handle, .. } => handle.clone(),
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lock_reserves_and_reports_commit() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let outcome = budget.lock_at(t0, "worker-a", 600).await;
        let handle = handle_of(&outcome);
        let status = budget.status_at(t0).await;
        assert_eq!(status.held, 600);
        assert_eq!(status.available, 400);

        assert_eq!(
            budget.report_at(t0, &handle, 550).await,
            SettleOutcome::Settled
        );
        let status = budget.status_at(t0).await;
        assert_eq!(status.committed, 550);
        assert_eq!(status.held, 0);
        assert_eq!(status.available, 450);
    }

    #[tokio::test]
    async fn test_lock_denies_when_window_full() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let _ = budget.lock_at(t0, "a", 600).await;
        match budget.lock_at(t0, "b", 500).await {
            LockOutcome::Denied {
                seconds_until_reset,
            } => {
                assert!(seconds_until_reset > 0);
                assert!(seconds_until_reset <= 60);
            }
            other => panic!("expected Denied, got {other:?}"),
        }
        // The denied lock left no residue.
        assert_eq!(budget.status_at(t0).await.held, 600);
    }

    #[tokio::test]
    async fn test_nonpositive_amounts_are_validation_denials() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        for amount in [0, -1, -1000] {
            match budget.lock_at(t0, "a", amount).await {
                LockOutcome::Invalid { .. } => {}
                other => panic!("expected Invalid for {amount}, got {other:?}"),
            }
        }
        let status = budget.status_at(t0).await;
        assert_eq!(status.held, 0);
        assert_eq!(status.committed, 0);
    }

    #[tokio::test]
    async fn test_amount_equal_to_limit_boundary() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        // Full-limit lock succeeds from an empty budget.
        let h = handle_of(&budget.lock_at(t0, "a", 1000).await);
        budget.release_at(t0, &h).await;

        // ...and denies from any non-empty one.
        let _ = budget.lock_at(t0, "a", 1).await;
        assert!(matches!(
            budget.lock_at(t0, "b", 1000).await,
            LockOutcome::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn test_amount_above_limit_denied() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);
        assert!(matches!(
            budget.lock_at(t0, "a", 1001).await,
            LockOutcome::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn test_release_restores_snapshot() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let before = budget.status_at(t0).await;
        let handle = handle_of(&budget.lock_at(t0, "a", 400).await);
        assert_eq!(
            budget.release_at(t0, &handle).await,
            SettleOutcome::Settled
        );
        let after = budget.status_at(t0).await;
        assert_eq!(before.available, after.available);
        assert_eq!(before.committed, after.committed);
        assert_eq!(before.held, after.held);
    }

    #[tokio::test]
    async fn test_over_report_oversubscribes_until_rollover() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let handle = handle_of(&budget.lock_at(t0, "a", 100).await);
        // Actual usage far beyond the reservation: authoritative, unclamped.
        budget.report_at(t0, &handle, 1500).await;

        let status = budget.status_at(t0).await;
        assert_eq!(status.committed, 1500);
        assert_eq!(status.available, 0);
        assert!(matches!(
            budget.lock_at(t0, "b", 1).await,
            LockOutcome::Denied { .. }
        ));

        // The next window starts clean.
        let t1 = t0 + Duration::seconds(60);
        assert!(matches!(
            budget.lock_at(t1, "b", 1).await,
            LockOutcome::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_report_on_reclaimed_handle_is_noop_success() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let handle = handle_of(&budget.lock_at(t0, "a", 600).await);
        let t1 = t0 + Duration::seconds(61);
        assert_eq!(
            budget.report_at(t1, &handle, 600).await,
            SettleOutcome::AlreadyReclaimed
        );
        // No stale committed usage leaks into the fresh window.
        let status = budget.status_at(t1).await;
        assert_eq!(status.committed, 0);
        assert_eq!(status.held, 0);
    }

    #[tokio::test]
    async fn test_release_on_unknown_handle_is_noop_success() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);
        assert_eq!(
            budget.release_at(t0, "no-such-handle").await,
            SettleOutcome::AlreadyReclaimed
        );
    }

    #[tokio::test]
    async fn test_rollover_clears_everything() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let _ = budget.lock_at(t0, "a", 300).await;
        let h = handle_of(&budget.lock_at(t0, "a", 200).await);
        budget.report_at(t0, &h, 250).await;

        let t1 = t0 + Duration::seconds(60);
        let status = budget.status_at(t1).await;
        assert_eq!(status.committed, 0);
        assert_eq!(status.held, 0);
        assert_eq!(status.available, 1000);
    }

    #[tokio::test]
    async fn test_backward_clock_jump_does_not_rewind() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let _ = budget.lock_at(t0, "a", 600).await;
        // Clock steps back 90 seconds: the window must not rewind and the
        // reservation must survive.
        let status = budget.status_at(t0 - Duration::seconds(90)).await;
        assert_eq!(status.held, 600);
    }

    #[tokio::test]
    async fn test_forward_clock_jump_advances_once() {
        let budget = budget(1000);
        let t0 = minute(1_700_000_040);

        let _ = budget.lock_at(t0, "a", 600).await;
        let t1 = t0 + Duration::seconds(60 * 5 + 23);
        let status = budget.status_at(t1).await;
        assert_eq!(status.held, 0);
        // The new window is aligned to the minute containing t1.
        assert_eq!(status.seconds_until_reset, 60 - 23);
    }

    #[tokio::test]
    async fn test_seconds_until_reset_range() {
        let budget = budget(1000);
        for offset in [0, 1, 30, 59] {
            let now = minute(1_700_000_040) + Duration::seconds(offset);
            let status = budget.status_at(now).await;
            assert!(status.seconds_until_reset >= 1, "offset {offset}");
            assert!(status.seconds_until_reset <= 60, "offset {offset}");
            assert_eq!(status.seconds_until_reset, 60 - offset.unsigned_abs());
        }
    }

    #[tokio::test]
    async fn test_report_equivalence_law() {
        // lock(n) then report(h, used) leaves the same committed + held as
        // lock(used) then report(h, used), absent a window boundary.
        let t0 = minute(1_700_000_040);

        let a = budget(1000);
        let h = handle_of(&a.lock_at(t0, "w", 300).await);
        a.report_at(t0, &h, 450).await;
        let sa = a.status_at(t0).await;

        let b = budget(1000);
        let h = handle_of(&b.lock_at(t0, "w", 450).await);
        b.report_at(t0, &h, 450).await;
        let sb = b.status_at(t0).await;

        assert_eq!(sa.committed + sa.held, sb.committed + sb.held);
    }

    /// One randomly generated budget operation.
    #[derive(Debug, Clone)]
    enum Op {
        Lock(i64),
        ReportNth(usize, i64),
        ReleaseNth(usize),
        AdvanceSecs(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50i64..500).prop_map(Op::Lock),
            (0usize..8, 0i64..800).prop_map(|(n, used)| Op::ReportNth(n, used)),
            (0usize..8).prop_map(Op::ReleaseNth),
            (0i64..150).prop_map(Op::AdvanceSecs),
        ]
    }

    proptest! {
        /// For any interleaving of lock/report/release/roll, the window
        /// invariants hold and capacity is conserved: everything locked is
        /// eventually reported, released, or discarded at roll-over.
        #[test]
        fn prop_invariants_and_conservation(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async move {
                const LIMIT: u64 = 1000;
                let budget = budget(LIMIT);
                let mut now = minute(1_700_000_040);
                let mut live: Vec<(String, u64)> = Vec::new();
                let mut locked_total: u64 = 0;
                let mut settled_total: u64 = 0;
                // Sum of (used - reserved) overages in the current window;
                // the only way committed + held can exceed the limit.
                let mut overage_this_window: u64 = 0;

                for op in ops {
                    match op {
                        Op::Lock(amount) => {
                            if let LockOutcome::Allowed { handle, .. } =
                                budget.lock_at(now, "w", amount).await
                            {
                                let amount = amount.unsigned_abs();
                                locked_total += amount;
                                live.push((handle, amount));
                            }
                        }
                        Op::ReportNth(n, used) => {
                            if !live.is_empty() {
                                let (handle, amount) = live.remove(n % live.len());
                                if budget.report_at(now, &handle, used).await
                                    == SettleOutcome::Settled
                                {
                                    settled_total += amount;
                                    overage_this_window +=
                                        used.max(0).unsigned_abs().saturating_sub(amount);
                                }
                            }
                        }
                        Op::ReleaseNth(n) => {
                            if !live.is_empty() {
                                let (handle, amount) = live.remove(n % live.len());
                                if budget.release_at(now, &handle).await
                                    == SettleOutcome::Settled
                                {
                                    settled_total += amount;
                                }
                            }
                        }
                        Op::AdvanceSecs(secs) => {
                            let before = budget.status_at(now).await;
                            now += Duration::seconds(secs);
                            let after = budget.status_at(now).await;
                            if after.seconds_until_reset > before.seconds_until_reset
                                || secs >= 60
                            {
                                // Window rolled: outstanding reservations were
                                // discarded, which settles them for conservation.
                                settled_total +=
                                    live.drain(..).map(|(_, amount)| amount).sum::<u64>();
                                overage_this_window = 0;
                            }
                        }
                    }

                    let status = budget.status_at(now).await;
                    prop_assert!(
                        status.committed + status.held <= LIMIT + overage_this_window,
                        "committed {} + held {} exceeds limit plus overage {}",
                        status.committed,
                        status.held,
                        overage_this_window
                    );
                    let live_sum: u64 = live.iter().map(|(_, a)| a).sum();
                    prop_assert_eq!(status.held, live_sum);
                }

                // Conservation: locked = settled + still-outstanding.
                let live_sum: u64 = live.iter().map(|(_, a)| a).sum();
                prop_assert_eq!(locked_total, settled_total + live_sum);
                Ok(())
            })?;
        }
    }
}

//! Token+request budget pair manipulated atomically by one endpoint group.
//!
//! A pair composes a token pool with a request pool: one lock consumes one
//! request slot and `amount` tokens, all-or-nothing. Every operation touches
//! the tokens budget strictly before the requests budget, so no interleaving
//! with other operations on the same budgets can deadlock.

use chrono::{DateTime, Utc};

use crate::domain::models::{PairHandle, PairSnapshot};
use crate::services::window_budget::{LockOutcome, SettleOutcome, WindowBudget};

/// Which pool of a paired budget refused a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    TokenPool,
    RequestPool,
}

impl DenialKind {
    /// Client-facing denial message. The wording is load-bearing: it is the
    /// quota-denial signature the worker fleet was built around.
    pub const fn message(self) -> &'static str {
        match self {
            Self::TokenPool => "token limit would be exceeded",
            Self::RequestPool => "api rate limit would be exceeded",
        }
    }
}

/// Outcome of a combined lock on a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairLockOutcome {
    Allowed {
        handle: PairHandle,
        seconds_until_reset: u64,
    },
    Denied {
        kind: DenialKind,
        seconds_until_reset: u64,
    },
    Invalid {
        reason: String,
    },
}

/// Two budgets manipulated as one atomic unit.
pub struct BudgetPair {
    tokens: WindowBudget,
    requests: WindowBudget,
}

impl BudgetPair {
    pub const fn new(tokens: WindowBudget, requests: WindowBudget) -> Self {
        Self { tokens, requests }
    }

    pub const fn tokens(&self) -> &WindowBudget {
        &self.tokens
    }

    pub const fn requests(&self) -> &WindowBudget {
        &self.requests
    }

    /// Reserve `token_amount` tokens and one request slot, all-or-nothing.
    pub async fn lock(&self, client_id: &str, token_amount: i64) -> PairLockOutcome {
        self.lock_at(Utc::now(), client_id, token_amount).await
    }

    /// Time-explicit variant of [`lock`](Self::lock).
    pub async fn lock_at(
        &self,
        now: DateTime<Utc>,
        client_id: &str,
        token_amount: i64,
    ) -> PairLockOutcome {
        let token_handle = match self.tokens.lock_at(now, client_id, token_amount).await {
            LockOutcome::Allowed { handle, .. } => handle,
            LockOutcome::Denied {
                seconds_until_reset,
            } => {
                return PairLockOutcome::Denied {
                    kind: DenialKind::TokenPool,
                    seconds_until_reset,
                }
            }
            LockOutcome::Invalid { reason } => return PairLockOutcome::Invalid { reason },
        };

        match self.requests.lock_at(now, client_id, 1).await {
            LockOutcome::Allowed {
                handle,
                seconds_until_reset,
                ..
            } => PairLockOutcome::Allowed {
                handle: PairHandle::new(token_handle, handle),
                seconds_until_reset,
            },
            LockOutcome::Denied {
                seconds_until_reset,
            } => {
                // Compensating release of the token half; the combined lock
                // must leave no residue when either pool denies.
                self.tokens.release_at(now, &token_handle).await;
                PairLockOutcome::Denied {
                    kind: DenialKind::RequestPool,
                    seconds_until_reset,
                }
            }
            LockOutcome::Invalid { reason } => {
                self.tokens.release_at(now, &token_handle).await;
                PairLockOutcome::Invalid { reason }
            }
        }
    }

    /// Commit `used_tokens` against the token half and exactly one request
    /// slot against the request half. A half missing from the handle is
    /// benign; a half whose window already rolled is equally benign.
    pub async fn report(&self, handle: &PairHandle, used_tokens: i64) -> SettleOutcome {
        self.report_at(Utc::now(), handle, used_tokens).await
    }

    /// Time-explicit variant of [`report`](Self::report).
    pub async fn report_at(
        &self,
        now: DateTime<Utc>,
        handle: &PairHandle,
        used_tokens: i64,
    ) -> SettleOutcome {
        let mut settled = false;
        if let Some(token_handle) = &handle.tokens {
            settled |= self.tokens.report_at(now, token_handle, used_tokens).await
                == SettleOutcome::Settled;
        }
        if let Some(request_handle) = &handle.requests {
            settled |=
                self.requests.report_at(now, request_handle, 1).await == SettleOutcome::Settled;
        }
        if settled {
            SettleOutcome::Settled
        } else {
            SettleOutcome::AlreadyReclaimed
        }
    }

    /// Drop both halves of a reservation locked as a pair.
    pub async fn release(&self, handle: &PairHandle) -> SettleOutcome {
        self.release_at(Utc::now(), handle).await
    }

    /// Time-explicit variant of [`release`](Self::release).
    pub async fn release_at(&self, now: DateTime<Utc>, handle: &PairHandle) -> SettleOutcome {
        let mut settled = false;
        if let Some(token_handle) = &handle.tokens {
            settled |=
                self.tokens.release_at(now, token_handle).await == SettleOutcome::Settled;
        }
        if let Some(request_handle) = &handle.requests {
            settled |=
                self.requests.release_at(now, request_handle).await == SettleOutcome::Settled;
        }
        if settled {
            SettleOutcome::Settled
        } else {
            SettleOutcome::AlreadyReclaimed
        }
    }

    /// Snapshot both halves.
    pub async fn status(&self) -> PairSnapshot {
        self.status_at(Utc::now()).await
    }

    /// Time-explicit variant of [`status`](Self::status).
    pub async fn status_at(&self, now: DateTime<Utc>) -> PairSnapshot {
        PairSnapshot {
            tokens: self.tokens.status_at(now).await,
            requests: self.requests.status_at(now).await,
        }
    }
}

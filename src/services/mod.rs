//! Service layer: the admission-control core and the worker loop.

pub mod budget_pair;
pub mod estimator;
pub mod processors;
pub mod quota_wait;
pub mod window_budget;
pub mod worker;

pub use budget_pair::{BudgetPair, DenialKind, PairLockOutcome};
pub use estimator::CostEstimator;
pub use quota_wait::{QuotaWait, QuotaWaitConfig, ResetQuery};
pub use window_budget::{LockOutcome, SettleOutcome, WindowBudget};
pub use worker::{Worker, WorkerConfig};

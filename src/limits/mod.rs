mod keys;
mod quota;
mod rate_limit;

pub use keys::{CooldownStore, IdempotencyStore, LockStore};
pub use quota::{QuotaKind, QuotaService};
pub use rate_limit::RateLimiter;

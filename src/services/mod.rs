//! 业务能力层（Services）
//!
//! 纯逻辑，不持有后台任务，也不触发宿主回调

pub mod normalizer;
pub mod page_store;
pub mod reconciler;
pub mod result_writer;
pub mod staleness;

pub use normalizer::{normalize_direct, normalize_session, resolve_image_url, NormalizeCtx};
pub use page_store::{PageCounts, PageStore};
pub use reconciler::{reconcile, ReconcileReport};
pub use result_writer::ResultWriter;
pub use staleness::{StallReason, StalenessPolicy, StalenessTracker};

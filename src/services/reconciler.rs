//! 会话快照合并 - 业务能力层
//!
//! 把一次 `BatchStatus` 合并进本地页面状态表。纯函数，不发请求、不触发回调

use crate::models::{BatchStatus, NormalizedPageData, PageStatus, RemotePageStatus};
use crate::services::normalizer::{normalize_session, resolve_image_url, NormalizeCtx};
use crate::services::page_store::PageStore;
use chrono::{DateTime, Utc};
use tracing::debug;

const REMOTE_FAILURE: &str = "页面处理失败";
const MISSING_RESULT: &str = "会话已结束但未返回该页的提取结果";

/// 一次合并的结果
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// 本次首次进入 Completed 的页
    pub newly_completed: Vec<NormalizedPageData>,
    /// 本次首次进入 Error 的页
    pub newly_failed: Vec<u32>,
    /// 发生变化的页数（含图片地址更新）
    pub changed: usize,
}

enum Target {
    Keep,
    Pending,
    Processing,
    Completed(NormalizedPageData),
    Error(String),
}

/// 合并规则：
/// - `pages_info` 中有明确状态的页取该状态，Completed 还需要能解析出文档 ID
/// - 在途集合中的页为 Processing
/// - 页码不超过 `completed + failed` 且无明确条目的页，有文档则 Completed，否则 Error
/// - 本地已 Completed 的页不会被回退
pub fn reconcile(
    store: &mut PageStore,
    status: &BatchStatus,
    ctx: &NormalizeCtx,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let in_flight = status.in_flight_pages();
    let finished = status.finished_pages();

    for page in store.iter_mut() {
        let page_number = page.page_number();
        if page.status() == PageStatus::Completed {
            continue;
        }

        let info = status.pages_info.get(&page_number);
        let document = status.document_for_page(page_number);

        if let Some(url) = document
            .and_then(|d| d.image_url.as_deref())
            .or_else(|| info.and_then(|i| i.image_url.as_deref()))
        {
            let resolved = resolve_image_url(&ctx.api_base_url, url);
            if !resolved.is_empty() && resolved != page.image_ref() {
                page.set_image_ref(resolved);
                report.changed += 1;
            }
        }

        let explicit = info.and_then(|i| i.status).filter(|s| *s != RemotePageStatus::Unknown);
        let target = match explicit {
            Some(RemotePageStatus::Completed) => {
                match normalize_session(page_number, document, info, ctx, now) {
                    Some(data) => Target::Completed(data),
                    // 完成但文档还没落库，先当作处理中
                    None => Target::Processing,
                }
            }
            Some(RemotePageStatus::Failed) => Target::Error(
                info.and_then(|i| i.error.clone())
                    .unwrap_or_else(|| REMOTE_FAILURE.to_string()),
            ),
            Some(RemotePageStatus::Processing) => Target::Processing,
            Some(RemotePageStatus::Pending) => Target::Pending,
            Some(RemotePageStatus::Unknown) | None => {
                if in_flight.contains(&page_number) {
                    Target::Processing
                } else if page_number <= finished {
                    match normalize_session(page_number, document, None, ctx, now) {
                        Some(data) => Target::Completed(data),
                        None => Target::Error(MISSING_RESULT.to_string()),
                    }
                } else {
                    Target::Keep
                }
            }
        };

        match target {
            Target::Keep => {}
            Target::Pending if page.status() != PageStatus::Pending => {
                // 服务端重新排队（自动重试）时回到 Pending
                page.mark_pending();
                report.changed += 1;
            }
            Target::Processing if page.status() != PageStatus::Processing => {
                page.mark_processing();
                report.changed += 1;
            }
            Target::Completed(data) => {
                debug!("[页 {}] 会话报告完成, 文档 {}", page_number, data.id);
                page.mark_completed(data.clone());
                report.newly_completed.push(data);
                report.changed += 1;
            }
            Target::Error(message) => {
                let first_time = page.status() != PageStatus::Error;
                if first_time || page.error_message() != Some(message.as_str()) {
                    page.mark_error(message);
                    report.changed += 1;
                }
                if first_time {
                    report.newly_failed.push(page_number);
                }
            }
            _ => {}
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, PageDescriptor};
    use serde_json::json;

    fn ctx() -> NormalizeCtx {
        NormalizeCtx {
            document_type: DocumentType::Kosu,
            original_file_name: "kosu.pdf".into(),
            api_base_url: "http://api.local".into(),
        }
    }

    fn store(n: u32) -> PageStore {
        PageStore::seed((1..=n).map(PageDescriptor::placeholder))
    }

    fn status(value: serde_json::Value) -> BatchStatus {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn explicit_page_info_wins() {
        let mut pages = store(3);
        let snapshot = status(json!({
            "status": "processing",
            "total_pages": 3,
            "completed_pages": 1,
            "failed_pages": 1,
            "processing_pages": [3],
            "pages_info": {
                "1": {"status": "completed", "document_id": "doc-1", "image_url": "/uploads/1.png"},
                "2": {"status": "failed", "error": "image illisible"}
            },
            "documents": [{"page": 1, "id": "doc-1", "data": {"operateurs": 4}}]
        }));

        let report = reconcile(&mut pages, &snapshot, &ctx(), Utc::now());

        assert_eq!(report.newly_completed.len(), 1);
        assert_eq!(report.newly_completed[0].data, json!({"operateurs": 4}));
        assert_eq!(report.newly_failed, vec![2]);
        assert_eq!(pages.get(1).unwrap().status(), PageStatus::Completed);
        assert_eq!(pages.get(1).unwrap().image_ref(), "http://api.local/uploads/1.png");
        assert_eq!(pages.get(2).unwrap().error_message(), Some("image illisible"));
        assert_eq!(pages.get(3).unwrap().status(), PageStatus::Processing);
    }

    #[test]
    fn repeated_snapshot_reports_nothing_new() {
        let mut pages = store(1);
        let snapshot = status(json!({
            "status": "processing",
            "total_pages": 1,
            "pages_info": {"1": {"status": "completed", "document_id": 5}}
        }));
        assert_eq!(reconcile(&mut pages, &snapshot, &ctx(), Utc::now()).newly_completed.len(), 1);
        let again = reconcile(&mut pages, &snapshot, &ctx(), Utc::now());
        assert!(again.newly_completed.is_empty());
        assert_eq!(again.changed, 0);
    }

    #[test]
    fn completed_without_document_id_waits() {
        let mut pages = store(1);
        let snapshot = status(json!({
            "status": "processing",
            "total_pages": 1,
            "pages_info": {"1": {"status": "completed"}}
        }));
        let report = reconcile(&mut pages, &snapshot, &ctx(), Utc::now());
        assert!(report.newly_completed.is_empty());
        assert_eq!(pages.get(1).unwrap().status(), PageStatus::Processing);
    }

    #[test]
    fn finished_count_infers_pages_without_entries() {
        let mut pages = store(3);
        let snapshot = status(json!({
            "status": "processing",
            "total_pages": 3,
            "completed_pages": 1,
            "failed_pages": 1,
            "processing_page": 3,
            "documents": [{"page": 1, "id": 11, "data": {}}]
        }));
        let report = reconcile(&mut pages, &snapshot, &ctx(), Utc::now());

        assert_eq!(report.newly_completed.len(), 1);
        assert_eq!(pages.get(1).unwrap().status(), PageStatus::Completed);
        assert_eq!(pages.get(2).unwrap().status(), PageStatus::Error);
        assert_eq!(pages.get(2).unwrap().error_message(), Some(MISSING_RESULT));
        assert_eq!(pages.get(3).unwrap().status(), PageStatus::Processing);
    }

    #[test]
    fn completed_pages_are_never_downgraded() {
        let mut pages = store(1);
        let done = status(json!({
            "status": "processing",
            "total_pages": 1,
            "pages_info": {"1": {"status": "completed", "document_id": "a"}}
        }));
        reconcile(&mut pages, &done, &ctx(), Utc::now());

        let regressed = status(json!({
            "status": "processing",
            "total_pages": 1,
            "processing_pages": [1]
        }));
        reconcile(&mut pages, &regressed, &ctx(), Utc::now());
        assert_eq!(pages.get(1).unwrap().status(), PageStatus::Completed);
    }

    #[test]
    fn server_retry_moves_error_back_to_pending() {
        let mut pages = store(1);
        pages.get_mut(1).unwrap().mark_error("boom");
        let requeued = status(json!({
            "status": "processing",
            "total_pages": 1,
            "pages_info": {"1": {"status": "queued"}}
        }));
        let report = reconcile(&mut pages, &requeued, &ctx(), Utc::now());
        assert_eq!(report.changed, 1);
        assert_eq!(pages.get(1).unwrap().status(), PageStatus::Pending);
    }
}

//! Filesystem watcher event classification (spec §4.E "Watcher
//! handling"). The actual subscription (via `notify`/
//! `notify-debouncer-full`) lives in [`super::server`]; this module is
//! the pure decision table so it can be tested without a real
//! filesystem watch.

/// Which structural tree(s), if any, a watcher event should rebuild, and
/// what HMR broadcast (if any) follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchAction {
    RebuildPagesAndBroadcastRouter,
    RebuildPagesAndRefreshComponent { path: String },
    RebuildApi,
    ReloadJobs,
    RefreshComponent { path: String },
    Ignore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// The subtree a changed path falls under, relative to the project root.
pub struct WatchedTree;

/// Classify one watcher event per spec §4.E's ordered rules:
/// - `src/pages/**`, create/delete → rebuild pages router, broadcast router refresh.
/// - `src/pages/**`, update on `.tsx` → component-level refresh.
/// - `src/api/**` → rebuild API router, no broadcast.
/// - `src/jobs/**` → reload jobs.
/// - any other `.tsx` change → component-level refresh.
pub fn classify_event(path: &str, kind: EventKind) -> WatchAction {
    let without_extension = crate::common::strip_js_extension(path);

    if path.starts_with("src/pages/") {
        return match kind {
            EventKind::Create | EventKind::Delete => WatchAction::RebuildPagesAndBroadcastRouter,
            EventKind::Update if path.ends_with(".tsx") => {
                WatchAction::RebuildPagesAndRefreshComponent {
                    path: without_extension.to_string(),
                }
            }
            EventKind::Update => WatchAction::Ignore,
        };
    }
    if path.starts_with("src/api/") {
        return WatchAction::RebuildApi;
    }
    if path.starts_with("src/jobs/") {
        return WatchAction::ReloadJobs;
    }
    if path.ends_with(".tsx") {
        return WatchAction::RefreshComponent {
            path: without_extension.to_string(),
        };
    }
    WatchAction::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_create_rebuilds_and_broadcasts_router() {
        assert_eq!(
            classify_event("src/pages/home/page.tsx", EventKind::Create),
            WatchAction::RebuildPagesAndBroadcastRouter
        );
        assert_eq!(
            classify_event("src/pages/home/page.tsx", EventKind::Delete),
            WatchAction::RebuildPagesAndBroadcastRouter
        );
    }

    /// Scenario 6 — dev server HMR.
    #[test]
    fn scenario_6_page_update_refreshes_component_without_extension() {
        assert_eq!(
            classify_event("src/pages/home/page.tsx", EventKind::Update),
            WatchAction::RebuildPagesAndRefreshComponent {
                path: "src/pages/home/page".to_string()
            }
        );
    }

    #[test]
    fn api_change_rebuilds_without_broadcast() {
        assert_eq!(
            classify_event("src/api/users/route.ts", EventKind::Update),
            WatchAction::RebuildApi
        );
    }

    #[test]
    fn jobs_change_reloads_jobs() {
        assert_eq!(
            classify_event("src/jobs/cleanup.job.ts", EventKind::Update),
            WatchAction::ReloadJobs
        );
    }

    #[test]
    fn unrelated_tsx_change_refreshes_component() {
        assert_eq!(
            classify_event("src/components/button.tsx", EventKind::Update),
            WatchAction::RefreshComponent {
                path: "src/components/button".to_string()
            }
        );
    }

    #[test]
    fn non_tsx_unrelated_change_is_ignored() {
        assert_eq!(
            classify_event("README.md", EventKind::Update),
            WatchAction::Ignore
        );
    }
}

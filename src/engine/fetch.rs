use std::collections::HashSet;

use super::client::ForgejoClient;
use super::types::{NormalizedRun, RawRun, Repository};
use crate::error::Result;

pub(crate) const RUN_PAGE_LIMIT: usize = 50;
pub(crate) const MAX_RUN_PAGES: usize = 5;

impl ForgejoClient {
    /// Fetch and normalize the run history of one repository.
    ///
    /// Paginates up to [`MAX_RUN_PAGES`] pages of [`RUN_PAGE_LIMIT`] runs and
    /// stops early when a page is empty, short, or (beyond the first page)
    /// introduces no workflow name not already seen.
    ///
    /// Every returned run is normalized and carries the identity of `repo`,
    /// never of any repository object embedded in the payload.
    pub async fn fetch_repo_runs(&self, repo: &Repository) -> Result<Vec<NormalizedRun>> {
        let mut runs = Vec::new();
        let mut seen_workflows: HashSet<String> = HashSet::new();
        let owner = repo.owner_name();

        for page in 1..=MAX_RUN_PAGES {
            let value = self
                .call(&format!(
                    "/repos/{owner}/{}/actions/runs?page={page}&limit={RUN_PAGE_LIMIT}",
                    repo.name
                ))
                .await?;
            // Bare array on old servers, {workflow_runs: [...]} on new ones.
            let items = value.get("workflow_runs").cloned().unwrap_or(value);
            let batch: Vec<RawRun> = serde_json::from_value(items)?;
            if batch.is_empty() {
                break;
            }

            let fetched = batch.len();
            let known_workflows = seen_workflows.len();
            for raw in batch {
                let run = raw.normalize(repo);
                seen_workflows.insert(run.workflow_name.clone());
                runs.push(run);
            }

            // Early stop once a full page adds no new workflow: further pages
            // are assumed to be stale history not worth the call cost. Note
            // that repositories whose inactive workflows appear only on later
            // pages will have those histories under-fetched.
            if seen_workflows.len() == known_workflows && page > 1 {
                break;
            }
            if fetched < RUN_PAGE_LIMIT {
                break;
            }
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::RepoOwner;
    use mockito::Matcher;
    use serde_json::json;

    fn repo() -> Repository {
        Repository {
            id: 1,
            full_name: "acme/api-gateway".to_string(),
            name: "api-gateway".to_string(),
            owner: RepoOwner {
                login: Some("acme".to_string()),
                username: None,
            },
        }
    }

    fn run_page(workflow: &str, count: usize, offset: usize) -> serde_json::Value {
        let runs: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "id": (offset + i) as i64,
                    "status": "completed",
                    "conclusion": "success",
                    "head_branch": "main",
                    "created_at": "2026-08-01T12:00:00Z",
                    "run_number": (offset + i) as i64,
                    "name": workflow
                })
            })
            .collect();
        json!({ "workflow_runs": runs })
    }

    fn client_for(server: &mockito::Server) -> ForgejoClient {
        ForgejoClient::new(&server.url(), None).unwrap()
    }

    async fn mock_page(
        server: &mut mockito::Server,
        page: usize,
        body: &serde_json::Value,
        hits: usize,
    ) -> mockito::Mock {
        server
            .mock("GET", "/api/v1/repos/acme/api-gateway/actions/runs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), page.to_string()),
                Matcher::UrlEncoded("limit".into(), RUN_PAGE_LIMIT.to_string()),
            ]))
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_stops_after_short_page_with_all_runs() {
        let mut server = mockito::Server::new_async().await;
        // Page 2 carries a new workflow so only the short-page rule stops it.
        let p1 = mock_page(&mut server, 1, &run_page("build", 50, 0), 1).await;
        let p2 = mock_page(&mut server, 2, &run_page("deploy", 10, 50), 1).await;

        let runs = client_for(&server).fetch_repo_runs(&repo()).await.unwrap();

        assert_eq!(runs.len(), 60);
        assert_eq!(runs[0].repo_full_name, "acme/api-gateway");
        assert_eq!(runs[0].job_path, "acme/api-gateway/build");
        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn test_stops_when_page_brings_no_new_workflow() {
        let mut server = mockito::Server::new_async().await;
        let p1 = mock_page(&mut server, 1, &run_page("build", 50, 0), 1).await;
        let p2 = mock_page(&mut server, 2, &run_page("build", 50, 50), 1).await;
        let p3 = mock_page(&mut server, 3, &run_page("deploy", 50, 100), 0).await;

        let runs = client_for(&server).fetch_repo_runs(&repo()).await.unwrap();

        assert_eq!(runs.len(), 100);
        p1.assert_async().await;
        p2.assert_async().await;
        p3.assert_async().await;
    }

    #[tokio::test]
    async fn test_never_exceeds_page_budget() {
        let mut server = mockito::Server::new_async().await;
        // Every page full and every page a fresh workflow name: only the
        // page budget can stop this.
        let mut mocks = Vec::new();
        for page in 1..=MAX_RUN_PAGES + 1 {
            let body = run_page(&format!("wf-{page}"), 50, page * 50);
            let hits = usize::from(page <= MAX_RUN_PAGES);
            mocks.push(mock_page(&mut server, page, &body, hits).await);
        }

        let runs = client_for(&server).fetch_repo_runs(&repo()).await.unwrap();

        assert_eq!(runs.len(), MAX_RUN_PAGES * RUN_PAGE_LIMIT);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_empty_first_page_yields_no_runs() {
        let mut server = mockito::Server::new_async().await;
        let p1 = mock_page(&mut server, 1, &json!({ "workflow_runs": [] }), 1).await;

        let runs = client_for(&server).fetch_repo_runs(&repo()).await.unwrap();
        assert!(runs.is_empty());
        p1.assert_async().await;
    }

    #[tokio::test]
    async fn test_accepts_bare_array_response() {
        let mut server = mockito::Server::new_async().await;
        let bare = json!([{
            "id": 1,
            "status": "running",
            "prettyref": "main",
            "name": "build"
        }]);
        let p1 = mock_page(&mut server, 1, &bare, 1).await;

        let runs = client_for(&server).fetch_repo_runs(&repo()).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].head_branch, "main");
        p1.assert_async().await;
    }
}

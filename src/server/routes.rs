use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{LocalKey, Url, User, Visit, VisitSource, WebkitTime};
use crate::query::{QueryEngine, UrlFilter, VisitGraph};
use crate::server::AppState;
use crate::storage::{DbStats, SqliteStore};
use crate::Error;

#[derive(Deserialize)]
pub struct UrlsParams {
    pub user: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct KeyParams {
    pub key: String,
}

#[derive(Deserialize)]
pub struct ChainParams {
    pub key: String,
    pub depth: Option<usize>,
}

#[derive(Deserialize)]
pub struct GraphParams {
    pub key: String,
    pub max_nodes: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A visit with everything directly attached to it
#[derive(Debug, Serialize)]
pub struct VisitDetail {
    pub visit: Visit,
    pub url: Url,
    pub source: Option<VisitSource>,
    pub predecessor: Option<Visit>,
    pub successors: Vec<Visit>,
}

/// Nodes of a bounded walk plus the lineage edges among them
#[derive(Debug, Serialize)]
pub struct GraphView {
    pub nodes: Vec<Visit>,
    /// `(from_visit, visit)` pairs, both ends inside `nodes`
    pub edges: Vec<(LocalKey, LocalKey)>,
}

impl GraphView {
    pub fn from_nodes(nodes: Vec<Visit>) -> Self {
        let present: HashSet<LocalKey> = nodes.iter().map(Visit::key).collect();
        let edges = nodes
            .iter()
            .filter_map(|v| v.from_visit_key().map(|from| (from, v.key())))
            .filter(|(from, _)| present.contains(from))
            .collect();
        Self { nodes, edges }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: Error) -> ApiError {
    (error_status(&error), Json(ErrorResponse { error: error.to_string() }))
}

/// Run `f` against a fresh read-only connection on the blocking pool
async fn with_store<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> crate::Result<T> + Send + 'static,
{
    let path = state.database_path.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::open_read_only(&path)?;
        f(&store)
    })
    .await;

    match joined {
        Ok(result) => result.map(Json).map_err(api_error),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: e.to_string() }),
        )),
    }
}

fn parse_key(key: &str) -> Result<LocalKey, ApiError> {
    LocalKey::parse(key).map_err(api_error)
}

fn parse_time(value: Option<String>) -> Result<Option<WebkitTime>, ApiError> {
    value
        .map(|v| v.parse::<WebkitTime>())
        .transpose()
        .map_err(api_error)
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<DbStats> {
    with_store(&state, |store| store.stats()).await
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Vec<User>> {
    with_store(&state, |store| QueryEngine::new(store).list_users()).await
}

pub async fn list_urls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UrlsParams>,
) -> ApiResult<Vec<Url>> {
    let filter = UrlFilter {
        user: params.user,
        visited_before: parse_time(params.before)?,
        visited_after: parse_time(params.after)?,
        url_pattern: params.url,
        title_pattern: params.title,
        limit: params.limit,
        offset: params.offset,
    };
    with_store(&state, move |store| QueryEngine::new(store).list_urls(&filter)).await
}

pub async fn get_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> ApiResult<Url> {
    let key = parse_key(&params.key)?;
    with_store(&state, move |store| QueryEngine::new(store).get_url(key)).await
}

pub async fn url_visits(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> ApiResult<Vec<Visit>> {
    let key = parse_key(&params.key)?;
    with_store(&state, move |store| QueryEngine::new(store).visits_for_url(key)).await
}

pub async fn get_visit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> ApiResult<VisitDetail> {
    let key = parse_key(&params.key)?;
    with_store(&state, move |store| {
        let engine = QueryEngine::new(store);
        let graph = VisitGraph::new(store);
        let visit = engine.get_visit(key)?;
        Ok(VisitDetail {
            url: engine.get_url(visit.url_key())?,
            source: engine.visit_source(key)?,
            predecessor: graph.predecessor(&visit)?,
            successors: graph.successors(&visit)?,
            visit,
        })
    })
    .await
}

pub async fn visit_chain(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChainParams>,
) -> ApiResult<Vec<Visit>> {
    let key = parse_key(&params.key)?;
    let depth = params.depth.unwrap_or(state.max_graph_nodes);
    with_store(&state, move |store| {
        let visit = QueryEngine::new(store).get_visit(key)?;
        VisitGraph::new(store).lineage_chain(&visit, depth)
    })
    .await
}

pub async fn visit_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphParams>,
) -> ApiResult<GraphView> {
    let key = parse_key(&params.key)?;
    let max_nodes = params.max_nodes.unwrap_or(state.max_graph_nodes);
    with_store(&state, move |store| {
        let visit = QueryEngine::new(store).get_visit(key)?;
        let nodes = VisitGraph::new(store).reachable_subgraph(&visit, max_nodes)?;
        Ok(GraphView::from_nodes(nodes))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{seed_user, url, visit};

    fn seeded_state(dir: &std::path::Path) -> Arc<AppState> {
        let path = dir.join("historian.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            seed_user(
                &store,
                "alice",
                &[url(0, 1, "https://a.test", "A", 13109575048813599)],
                &[visit(0, 10, 1, 0), visit(0, 11, 1, 10), visit(0, 12, 1, 11)],
            );
        }
        Arc::new(AppState {
            database_path: path,
            max_graph_nodes: 50,
        })
    }

    #[test]
    fn test_error_status() {
        assert_eq!(error_status(&Error::not_found("Url", "1/2")), StatusCode::NOT_FOUND);
        assert_eq!(error_status(&Error::InvalidArgument("x".into())), StatusCode::BAD_REQUEST);
        let io = Error::Io(std::io::Error::other("disk"));
        assert_eq!(error_status(&io), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_graph_view_keeps_internal_edges() {
        let view = GraphView::from_nodes(vec![visit(1, 11, 1, 10), visit(1, 10, 1, 0), visit(1, 12, 1, 99)]);
        assert_eq!(view.edges, vec![(LocalKey::new(1, 10), LocalKey::new(1, 11))]);
    }

    #[tokio::test]
    async fn test_get_url_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());

        let Json(found) = get_url(State(state.clone()), Query(KeyParams { key: "1/1".into() }))
            .await
            .unwrap();
        assert_eq!(found.address, "https://a.test");

        let (status, Json(body)) = get_url(State(state.clone()), Query(KeyParams { key: "1/2".into() }))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Url with index 1/2 does not exist");

        let (status, _) = get_url(State(state), Query(KeyParams { key: "nope".into() }))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_visit_chain_and_graph() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());

        let Json(chain) = visit_chain(
            State(state.clone()),
            Query(ChainParams { key: "1/12".into(), depth: None }),
        )
        .await
        .unwrap();
        let ids: Vec<i64> = chain.iter().map(|v| v.local_id).collect();
        assert_eq!(ids, vec![12, 11, 10]);

        let Json(graph) = visit_graph(
            State(state.clone()),
            Query(GraphParams { key: "1/10".into(), max_nodes: Some(2) }),
        )
        .await
        .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges, vec![(LocalKey::new(1, 10), LocalKey::new(1, 11))]);

        let Json(detail) = get_visit(State(state), Query(KeyParams { key: "1/11".into() }))
            .await
            .unwrap();
        assert_eq!(detail.predecessor.map(|v| v.local_id), Some(10));
        assert_eq!(detail.successors.len(), 1);
        assert_eq!(detail.url.local_id, 1);
    }

    #[tokio::test]
    async fn test_list_urls_rejects_bad_time() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());

        let params = UrlsParams {
            user: Some("alice".into()),
            before: Some("yesterday-ish".into()),
            after: None,
            url: None,
            title: None,
            limit: None,
            offset: None,
        };
        let (status, _) = list_urls(State(state), Query(params)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

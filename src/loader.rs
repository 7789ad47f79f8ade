use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{debug, trace, warn};

use crate::client::{self, ApiError, Backend};
use crate::protocol::{DataResponse, MetadataResponse, Row};
use crate::query::QueryState;

/// Rows of lookahead before the end of the buffer at which the next page
/// is requested.
pub const SCROLL_THRESHOLD_ROWS: usize = 200;

/// Buffer and pagination bookkeeping for the current page session. Owned
/// exclusively by the [`Loader`]; the render engine only reads it.
#[derive(Debug, Default)]
pub struct LoadState {
    /// Append-only within one page session; discarded wholesale on reset.
    pub rows: Vec<Row>,
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
    pub loading: bool,
    pub total_rows_unfiltered: usize,
    pub total_rows_filtered: usize,
    pub file_size: u64,
}

enum FetchKind {
    Metadata(Result<MetadataResponse, ApiError>),
    Data {
        reset: bool,
        result: Result<DataResponse, ApiError>,
    },
}

struct FetchOutcome {
    session: u64,
    kind: FetchKind,
}

/// What the event loop should react to after draining the fetch channel.
#[derive(Debug)]
pub enum LoadEvent {
    MetadataLoaded(MetadataResponse),
    MetadataFailed(ApiError),
    Appended { reset: bool, appended: usize },
    LoadFailed(ApiError),
}

/// Drives progressive loading against the backend. Fetches run on spawned
/// threads and report back over a channel drained by `poll`; the `loading`
/// flag is the sole guard keeping at most one fetch in flight. Every reset
/// bumps the session id, and responses from a superseded session are
/// discarded without touching the buffer.
pub struct Loader {
    backend: Arc<dyn Backend>,
    path: String,
    session: u64,
    /// A reset arrived while a fetch was in flight; issue it as soon as the
    /// stale response lands.
    pending_reset: bool,
    tx: Sender<FetchOutcome>,
    rx: Receiver<FetchOutcome>,
    pub state: LoadState,
}

impl Loader {
    pub fn new(backend: Arc<dyn Backend>, path: String, page_size: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            path,
            session: 0,
            pending_reset: false,
            tx,
            rx,
            state: LoadState {
                page_size,
                has_more: true,
                ..LoadState::default()
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetch file metadata. The first data load is issued by the caller
    /// once the metadata lands, keeping the two sequenced rather than
    /// concurrent. A refresh while a fetch is in flight is ignored.
    pub fn open(&mut self) {
        if self.state.loading {
            return;
        }
        self.session += 1;
        self.state.rows.clear();
        self.state.offset = 0;
        self.state.has_more = true;
        self.state.loading = true;
        let backend = Arc::clone(&self.backend);
        let path = self.path.clone();
        let tx = self.tx.clone();
        let session = self.session;
        thread::spawn(move || {
            let result = client::fetch_metadata(backend.as_ref(), &path);
            let _ = tx.send(FetchOutcome {
                session,
                kind: FetchKind::Metadata(result),
            });
        });
    }

    /// Begin a new page session: zero the offset, drop the row buffer and
    /// immediately load the first page. If a fetch is in flight its
    /// response is already stale (the session id moved on); the load is
    /// queued and issued the moment that response is discarded.
    pub fn reset(&mut self, query: &QueryState) {
        self.session += 1;
        self.state.rows.clear();
        self.state.offset = 0;
        self.state.has_more = true;
        if self.state.loading {
            trace!("Reset while loading; queueing reload for session {}", self.session);
            self.pending_reset = true;
            return;
        }
        self.spawn_data_fetch(query, true);
    }

    /// Append the next page. No-op while a fetch is in flight or when the
    /// backend reported the end of the data.
    pub fn load_more(&mut self, query: &QueryState) {
        if self.state.loading || !self.state.has_more {
            return;
        }
        self.spawn_data_fetch(query, false);
    }

    /// True when the viewport bottom has moved into the lookahead window
    /// near the end of the buffer and another page should be requested.
    pub fn near_buffer_end(&self, viewport_bottom: usize) -> bool {
        self.state.has_more
            && !self.state.loading
            && viewport_bottom + SCROLL_THRESHOLD_ROWS >= self.state.rows.len()
    }

    fn spawn_data_fetch(&mut self, query: &QueryState, reset: bool) {
        self.state.loading = true;
        let request = query.to_request(&self.path, self.state.offset, self.state.page_size);
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let session = self.session;
        debug!(
            "Fetching rows {}..{} (session {session}, reset {reset})",
            request.offset,
            request.offset + request.limit
        );
        thread::spawn(move || {
            let result = client::fetch_data(backend.as_ref(), &request);
            let _ = tx.send(FetchOutcome {
                session,
                kind: FetchKind::Data { reset, result },
            });
        });
    }

    /// Drain one fetch outcome, if any. Called once per event-loop tick.
    /// The `loading` flag is released on every path, including stale
    /// discards and failures, so the viewer stays operable.
    pub fn poll(&mut self, query: &QueryState) -> Option<LoadEvent> {
        let outcome = self.rx.try_recv().ok()?;
        self.state.loading = false;
        if outcome.session != self.session {
            debug!(
                "Discarding response from superseded session {} (current {})",
                outcome.session, self.session
            );
            if self.pending_reset {
                self.pending_reset = false;
                self.spawn_data_fetch(query, true);
            }
            return None;
        }
        match outcome.kind {
            FetchKind::Metadata(Ok(meta)) => {
                self.state.total_rows_unfiltered = meta.total_rows;
                self.state.total_rows_filtered = meta.total_rows;
                self.state.file_size = meta.file_size;
                Some(LoadEvent::MetadataLoaded(meta))
            }
            FetchKind::Metadata(Err(e)) => {
                warn!("Metadata load failed: {e}");
                Some(LoadEvent::MetadataFailed(e))
            }
            FetchKind::Data { reset, result: Ok(response) } => {
                let appended = response.data.len();
                self.state.rows.extend(response.data);
                self.state.offset += appended;
                self.state.has_more = response.has_more;
                if reset {
                    self.state.total_rows_filtered = response.total_rows;
                }
                Some(LoadEvent::Appended { reset, appended })
            }
            FetchKind::Data { result: Err(e), .. } => {
                warn!("Data load failed: {e}");
                Some(LoadEvent::LoadFailed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a canned dataset of `total` single-column rows, honoring
    /// offset/limit, and counts data calls.
    struct PagedBackend {
        total: usize,
        calls: AtomicUsize,
    }

    impl PagedBackend {
        fn new(total: usize) -> Self {
            Self {
                total,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Backend for PagedBackend {
        fn call(&self, endpoint: &str, payload: &Value) -> Result<Value, ApiError> {
            match endpoint {
                "metadata" => Ok(json!({
                    "columns": [{"name": "n", "type": "int64"}],
                    "totalRows": self.total,
                    "fileSize": 1024,
                })),
                "data" => {
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    let offset = payload["offset"].as_u64().unwrap() as usize;
                    let limit = payload["limit"].as_u64().unwrap() as usize;
                    let end = (offset + limit).min(self.total);
                    let rows: Vec<Value> = (offset..end)
                        .map(|i| json!({"n": i, "__row_index__": i + 1}))
                        .collect();
                    Ok(json!({
                        "data": rows,
                        "hasMore": end < self.total,
                        "totalRows": self.total,
                    }))
                }
                other => panic!("unexpected endpoint {other}"),
            }
        }
    }

    /// Blocks data calls until released, for exercising in-flight states.
    struct GatedBackend {
        inner: PagedBackend,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl Backend for GatedBackend {
        fn call(&self, endpoint: &str, payload: &Value) -> Result<Value, ApiError> {
            if endpoint == "data" {
                self.gate.lock().unwrap().recv().unwrap();
            }
            self.inner.call(endpoint, payload)
        }
    }

    fn wait_event(loader: &mut Loader, query: &QueryState) -> LoadEvent {
        for _ in 0..500 {
            if let Some(event) = loader.poll(query) {
                return event;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("no load event arrived");
    }

    #[test]
    fn open_then_reset_pages_through_the_file() {
        let backend = Arc::new(PagedBackend::new(1000));
        let query = QueryState::default();
        let mut loader = Loader::new(backend.clone(), "t.parquet".to_string(), 500);

        loader.open();
        assert!(matches!(
            wait_event(&mut loader, &query),
            LoadEvent::MetadataLoaded(_)
        ));
        assert_eq!(loader.state.total_rows_unfiltered, 1000);
        assert_eq!(loader.state.file_size, 1024);

        loader.reset(&query);
        assert!(matches!(
            wait_event(&mut loader, &query),
            LoadEvent::Appended { reset: true, appended: 500 }
        ));
        assert_eq!(loader.state.offset, 500);
        assert!(loader.state.has_more);

        loader.load_more(&query);
        assert!(matches!(
            wait_event(&mut loader, &query),
            LoadEvent::Appended { reset: false, appended: 500 }
        ));
        assert_eq!(loader.state.rows.len(), 1000);
        assert!(!loader.state.has_more);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn load_more_is_a_noop_while_loading_or_exhausted() {
        let (release, gate) = mpsc::channel();
        let backend = Arc::new(GatedBackend {
            inner: PagedBackend::new(1000),
            gate: Mutex::new(gate),
        });
        let query = QueryState::default();
        let mut loader = Loader::new(backend.clone(), "t.parquet".to_string(), 500);
        loader.state.total_rows_unfiltered = 1000;

        loader.reset(&query);
        assert!(loader.state.loading);
        // Rapid repeated triggers while the fetch is in flight must not
        // spawn further requests.
        loader.load_more(&query);
        loader.load_more(&query);
        release.send(()).unwrap();
        wait_event(&mut loader, &query);
        assert_eq!(backend.inner.calls.load(Ordering::SeqCst), 1);

        // Exhausted: no more triggers once has_more is false.
        loader.state.has_more = false;
        loader.load_more(&query);
        assert!(!loader.state.loading);
        assert_eq!(backend.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_during_flight_discards_stale_response() {
        let (release, gate) = mpsc::channel();
        let backend = Arc::new(GatedBackend {
            inner: PagedBackend::new(800),
            gate: Mutex::new(gate),
        });
        let query = QueryState::default();
        let mut loader = Loader::new(backend, "t.parquet".to_string(), 500);

        loader.reset(&query);
        // Filter changed while the first page is still in flight.
        loader.reset(&query);
        assert!(loader.state.rows.is_empty());
        assert_eq!(loader.state.offset, 0);

        // Release both fetches; the first response is stale and dropped,
        // the queued reset load then lands.
        release.send(()).unwrap();
        release.send(()).unwrap();
        let event = wait_event(&mut loader, &query);
        assert!(matches!(event, LoadEvent::Appended { reset: true, .. }));
        assert_eq!(loader.state.rows.len(), 500);
        assert_eq!(loader.state.offset, 500);
    }

    struct FailingBackend;

    impl Backend for FailingBackend {
        fn call(&self, _endpoint: &str, _payload: &Value) -> Result<Value, ApiError> {
            Err(ApiError::Network("connection refused".to_string()))
        }
    }

    #[test]
    fn failure_releases_loading_and_keeps_buffer() {
        let query = QueryState::default();
        let mut loader = Loader::new(Arc::new(FailingBackend), "t.parquet".to_string(), 500);
        loader.state.rows.push(protocol_row(1));
        loader.state.offset = 1;

        loader.load_more(&query);
        let event = wait_event(&mut loader, &query);
        assert!(matches!(event, LoadEvent::LoadFailed(ApiError::Network(_))));
        assert!(!loader.state.loading);
        assert_eq!(loader.state.rows.len(), 1);
        assert_eq!(loader.state.offset, 1);
    }

    #[test]
    fn near_buffer_end_respects_guards() {
        let backend = Arc::new(PagedBackend::new(1000));
        let mut loader = Loader::new(backend, "t.parquet".to_string(), 500);
        loader.state.rows = (0..500).map(protocol_row).collect();
        loader.state.has_more = true;

        assert!(!loader.near_buffer_end(40));
        assert!(loader.near_buffer_end(300));
        loader.state.loading = true;
        assert!(!loader.near_buffer_end(300));
        loader.state.loading = false;
        loader.state.has_more = false;
        assert!(!loader.near_buffer_end(300));
    }

    fn protocol_row(n: usize) -> Row {
        serde_json::from_value(json!({"n": n})).unwrap()
    }
}

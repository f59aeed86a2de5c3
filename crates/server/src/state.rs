use axum::extract::FromRef;
use domain::IngestEvent;
use storage::Db;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub tx_ingest: broadcast::Sender<IngestEvent>,
    pub admin_token: String,
}

impl AppState {
    pub fn new(db: Db, admin_token: impl Into<String>) -> Self {
        let (tx_ingest, _rx_ingest) = broadcast::channel(100);
        Self {
            db,
            tx_ingest,
            admin_token: admin_token.into(),
        }
    }

    /// 没有 SSE 订阅者时 send 会失败，忽略即可
    pub fn publish(&self, event: IngestEvent) {
        let _ = self.tx_ingest.send(event);
    }
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sg_mcp::{
    ResponseBody, SessionTransport, TransportError, TransportRequest, TransportResponse,
};

use crate::session::{Session, SessionData};

/// Transport double that only counts `close` calls.
#[derive(Default)]
pub struct CountingTransport {
    pub id: String,
    pub closes: AtomicUsize,
}

impl CountingTransport {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for CountingTransport {
    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    async fn handle_request(
        &self,
        _request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::new(200, Some(self.id.clone()), ResponseBody::Empty))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

pub fn transport(id: &str) -> Arc<CountingTransport> {
    Arc::new(CountingTransport {
        id: id.into(),
        ..Default::default()
    })
}

pub fn session(id: &str) -> Arc<Session> {
    Arc::new(Session::new(id, transport(id), SessionData::new()))
}

//! Request-id correlation. Owned exclusively by the worker's single task
//! loop — never shared across an `.await` — so a plain `HashMap` needs no
//! lock, matching the "resolver map" design note.

use polytrade_core::WorkerError;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub type RequestId = String;

/// One venue response per submitted chunk: the venue-assigned ids (for
/// `placeOrders`) or confirmed-canceled ids (for `cancelOrders`), or an
/// error if the venue rejected the whole chunk.
pub type VenueResponse = Result<Vec<String>, WorkerError>;

#[derive(Debug, Default)]
pub struct ResolverMap {
    pending: HashMap<RequestId, oneshot::Sender<VenueResponse>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight request, returning the receiver the
    /// caller awaits for the venue's eventual reply.
    pub fn register(&mut self, request_id: RequestId) -> oneshot::Receiver<VenueResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        rx
    }

    /// Resolves a pending request by id. A resolve with no matching
    /// pending entry (late/duplicate venue reply) is silently dropped.
    pub fn resolve(&mut self, request_id: &str, response: VenueResponse) {
        if let Some(tx) = self.pending.remove(request_id) {
            let _ = tx.send(response);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_registered_receiver() {
        let mut map = ResolverMap::new();
        let rx = map.register("r1".into());
        map.resolve("r1", Ok(vec!["o1".into()]));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), vec!["o1".to_string()]);
    }

    #[test]
    fn resolve_with_unknown_request_id_is_a_no_op() {
        let mut map = ResolverMap::new();
        map.resolve("ghost", Ok(vec![]));
        assert_eq!(map.pending_count(), 0);
    }

    #[test]
    fn register_tracks_pending_count() {
        let mut map = ResolverMap::new();
        let _rx = map.register("r1".into());
        assert_eq!(map.pending_count(), 1);
    }
}

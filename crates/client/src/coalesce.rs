//! At most one in-flight request per request signature.
//!
//! Issuing a request whose signature matches one already in flight cancels
//! the older one; its caller sees [`ClientError::Superseded`]. Each entry
//! carries a registration id so that an older request settling late never
//! removes a newer request's entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::ClientError;

/// Builds the signature of a request: `method&url&query&body`.
///
/// `query` and `body` are JSON-serialized; `Value::Null` stands for "absent".
pub fn request_signature(
    method: &str,
    url: &str,
    query: &serde_json::Value,
    body: &serde_json::Value,
) -> String {
    format!("{method}&{url}&{query}&{body}")
}

struct Registration {
    id: Uuid,
    token: CancellationToken,
}

/// Table of in-flight requests keyed by signature.
#[derive(Default)]
pub struct RequestCoalescer {
    pending: Mutex<HashMap<String, Registration>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request, cancelling any in-flight request with the same key.
    ///
    /// The returned token is a child of `parent`, so cancelling `parent`
    /// cancels the request too. The entry is removed when the guard drops.
    pub fn register(&self, key: String, parent: &CancellationToken) -> PendingRequest<'_> {
        let id = Uuid::new_v4();
        let token = parent.child_token();

        let previous = self.table().insert(
            key.clone(),
            Registration {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(key = %key, "superseding in-flight request");
            previous.token.cancel();
        }

        PendingRequest {
            coalescer: self,
            key,
            id,
            token,
            parent: parent.clone(),
        }
    }

    /// Runs `request` under the guard for `key`.
    ///
    /// Resolves to [`ClientError::Superseded`] if a newer identical request
    /// replaces this one, or [`ClientError::Cancelled`] if `parent` fires.
    pub async fn run<T, F>(
        &self,
        key: String,
        parent: &CancellationToken,
        request: F,
    ) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let pending = self.register(key, parent);
        tokio::select! {
            biased;
            _ = pending.token.cancelled() => Err(pending.cancel_reason()),
            result = request => result,
        }
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }
}

/// A registered in-flight request. Settles its entry on drop.
pub struct PendingRequest<'a> {
    coalescer: &'a RequestCoalescer,
    key: String,
    id: Uuid,
    token: CancellationToken,
    parent: CancellationToken,
}

impl PendingRequest<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the token fired: the caller's parent, or a newer request.
    pub fn cancel_reason(&self) -> ClientError {
        if self.parent.is_cancelled() {
            ClientError::Cancelled
        } else {
            ClientError::Superseded
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        let mut table = self.coalescer.table();
        if table.get(&self.key).is_some_and(|r| r.id == self.id) {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn signature_joins_parts() {
        let sig = request_signature(
            "POST",
            "http://h/init",
            &serde_json::Value::Null,
            &json!({"a": 1}),
        );
        assert_eq!(sig, r#"POST&http://h/init&null&{"a":1}"#);
    }

    #[test]
    fn signatures_differ_by_body() {
        let q = serde_json::Value::Null;
        assert_ne!(
            request_signature("POST", "u", &q, &json!({"partNumber": 1})),
            request_signature("POST", "u", &q, &json!({"partNumber": 2}))
        );
    }

    #[test]
    fn register_cancels_previous() {
        let coalescer = RequestCoalescer::new();
        let parent = CancellationToken::new();

        let first = coalescer.register("k".into(), &parent);
        assert!(!first.token().is_cancelled());

        let second = coalescer.register("k".into(), &parent);
        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert!(matches!(first.cancel_reason(), ClientError::Superseded));
        assert_eq!(coalescer.in_flight(), 1);
    }

    #[test]
    fn late_settlement_keeps_newer_entry() {
        let coalescer = RequestCoalescer::new();
        let parent = CancellationToken::new();

        let first = coalescer.register("k".into(), &parent);
        let second = coalescer.register("k".into(), &parent);
        drop(first);
        assert_eq!(coalescer.in_flight(), 1);
        drop(second);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let coalescer = RequestCoalescer::new();
        let parent = CancellationToken::new();
        let a = coalescer.register("a".into(), &parent);
        let b = coalescer.register("b".into(), &parent);
        assert!(!a.token().is_cancelled());
        assert!(!b.token().is_cancelled());
        assert_eq!(coalescer.in_flight(), 2);
    }

    #[test]
    fn parent_cancel_is_reported_as_cancelled() {
        let coalescer = RequestCoalescer::new();
        let parent = CancellationToken::new();
        let pending = coalescer.register("k".into(), &parent);
        parent.cancel();
        assert!(pending.token().is_cancelled());
        assert!(matches!(pending.cancel_reason(), ClientError::Cancelled));
    }

    #[tokio::test]
    async fn identical_in_flight_requests_first_is_superseded() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let parent = CancellationToken::new();

        let c1 = Arc::clone(&coalescer);
        let p1 = parent.clone();
        let first = tokio::spawn(async move {
            c1.run("k".into(), &p1, async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ClientError>(1)
            })
            .await
        });

        // Let the first request register.
        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let second = coalescer
            .run("k".into(), &parent, async { Ok::<_, ClientError>(2) })
            .await
            .unwrap();
        assert_eq!(second, 2);

        let first = first.await.unwrap();
        assert!(matches!(first, Err(ClientError::Superseded)));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn run_reports_parent_cancellation() {
        let coalescer = RequestCoalescer::new();
        let parent = CancellationToken::new();
        parent.cancel();
        let result = coalescer
            .run("k".into(), &parent, async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ClientError>(())
            })
            .await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(coalescer.in_flight(), 0);
    }
}

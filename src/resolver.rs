use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::catalog::transport::Transport;
use crate::catalog::{CatalogClient, require_id};
use crate::error::{GENERIC_NOT_FOUND, PlaybackError, ResolutionStep, StepFailure};
use crate::types::MediaLocator;

const CHAIN: [ResolutionStep; 3] = [
    ResolutionStep::Path,
    ResolutionStep::QueryFallback,
    ResolutionStep::Relay,
];

/// Resolves a playable [`MediaLocator`] by walking path, query and relay
/// lookups in order until one yields a stream URL.
pub struct LocatorResolver<T> {
    catalog: Rc<CatalogClient<T>>,
}

impl<T: Transport> LocatorResolver<T> {
    pub fn new(catalog: Rc<CatalogClient<T>>) -> Self {
        Self { catalog }
    }

    pub async fn resolve(&self, id: &str, sequence: usize) -> Result<MediaLocator, PlaybackError> {
        let id = require_id(id, "video id")?;
        let mut attempts = Vec::new();
        let mut last_upstream_message = None;

        for step in CHAIN {
            let outcome = match step {
                ResolutionStep::Path => self.catalog.play_by_path(id, sequence).await,
                ResolutionStep::QueryFallback => self.catalog.play_by_query(id, sequence).await,
                ResolutionStep::Relay => self.catalog.play_via_relay(id, sequence).await,
            };

            let error = match outcome {
                Ok(payload) => {
                    if let Some(message) = &payload.upstream_message {
                        last_upstream_message = Some(message.clone());
                    }
                    if let Some(mut locator) = payload.into_locator() {
                        locator.sequence.get_or_insert(sequence);
                        info!(%id, sequence, %step, "resolved stream");
                        return Ok(locator);
                    }
                    PlaybackError::UpstreamFormat(String::from("response carried no stream url"))
                }
                Err(err) => {
                    if let Some(message) = err.upstream_message() {
                        last_upstream_message = Some(message.to_string());
                    }
                    err
                }
            };

            if error.is_timeout() {
                warn!(%id, sequence, %step, "resolution step timed out");
            } else {
                debug!(%id, sequence, %step, error = %error, "resolution step failed");
            }
            attempts.push(StepFailure { step, error });
        }

        warn!(%id, sequence, "all resolution steps exhausted");
        Err(PlaybackError::NotFound {
            message: last_upstream_message.unwrap_or_else(|| GENERIC_NOT_FOUND.to_string()),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::testing::{ScriptedTransport, client, gated_client};
    use crate::gate::RateGate;

    fn resolver(transport: ScriptedTransport) -> LocatorResolver<ScriptedTransport> {
        LocatorResolver::new(Rc::new(client(transport)))
    }

    fn seen(resolver: &LocatorResolver<ScriptedTransport>) -> Vec<String> {
        resolver.catalog.transport().seen.borrow().clone()
    }

    #[tokio::test]
    async fn primary_success_skips_fallbacks() {
        let resolver = resolver(
            ScriptedTransport::new()
                .json("v1/play/", r#"{"url":"a.m3u8","subtitles":[{"language":"id","url":"id.vtt"}]}"#)
                .json("/play?", r#"{"url":"never.m3u8"}"#)
                .json("/proxy/", r#"{"url":"never.m3u8"}"#),
        );
        let locator = resolver.resolve("v1", 3).await.expect("resolves");
        assert_eq!(locator.stream_url, "a.m3u8");
        assert_eq!(locator.subtitles.len(), 1);
        assert_eq!(locator.sequence, Some(3));
        assert_eq!(seen(&resolver).len(), 1);
    }

    #[tokio::test]
    async fn non_json_primary_walks_to_relay_in_order() {
        let resolver = resolver(
            ScriptedTransport::new()
                .json("v1/play/", "<!DOCTYPE html><title>Error</title>")
                .json("/play?", r#"{"code":1}"#)
                .json("/proxy/", r#"{"url":"b.m3u8"}"#),
        );
        let locator = resolver.resolve("v1", 0).await.expect("relay resolves");
        assert_eq!(locator.stream_url, "b.m3u8");

        let seen = seen(&resolver);
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("/play/v1?"));
        assert!(seen[1].contains("/play?") && seen[1].contains("videoFakeId=v1"));
        assert!(seen[2].contains("/api/proxy/play/v1?"));
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_steps_wait_for_the_gate_but_the_relay_does_not() {
        let resolver = LocatorResolver::new(Rc::new(gated_client(
            ScriptedTransport::new()
                .json("v1/play/", r#"{"code":1}"#)
                .json("/play?", r#"{"code":1}"#)
                .json("/proxy/", r#"{"url":"r.m3u8"}"#),
            RateGate::new(Duration::from_millis(500)),
        )));
        resolver.resolve("v1", 0).await.expect("relay resolves");

        let sent = resolver.catalog.transport().sent.borrow().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].0 - sent[0].0 >= Duration::from_millis(500));
        assert_eq!(sent[2].0, sent[1].0);
        assert!(sent.iter().all(|(_, timeout)| *timeout == Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn timeout_only_fails_its_own_step() {
        let resolver = resolver(
            ScriptedTransport::new()
                .fail("v1/play/", PlaybackError::Timeout(10))
                .json("/play?", r#"{"videoUrl":"q.m3u8"}"#),
        );
        let locator = resolver.resolve("v1", 1).await.expect("query fallback");
        assert_eq!(locator.stream_url, "q.m3u8");
        assert_eq!(seen(&resolver).len(), 2);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_upstream_message() {
        let resolver = resolver(
            ScriptedTransport::new()
                .json("v1/play/", r#"{"message":"first complaint"}"#)
                .status("/play?", 403, r#"{"msg":"region blocked"}"#)
                .fail("/proxy/", PlaybackError::network("connection refused")),
        );
        let err = resolver.resolve("v1", 0).await.expect_err("nothing playable");
        match err {
            PlaybackError::NotFound { message, attempts } => {
                assert_eq!(message, "region blocked");
                let steps: Vec<ResolutionStep> = attempts.iter().map(|a| a.step).collect();
                assert_eq!(steps, CHAIN.to_vec());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhaustion_without_message_uses_generic_text() {
        let resolver = resolver(
            ScriptedTransport::new()
                .json("v1/play/", "{}")
                .json("/play?", "not json")
                .fail("/proxy/", PlaybackError::Timeout(10)),
        );
        let err = resolver.resolve("v1", 0).await.expect_err("nothing playable");
        assert!(matches!(err, PlaybackError::NotFound { .. }));
        assert_eq!(err.to_string(), GENERIC_NOT_FOUND);
    }

    #[tokio::test]
    async fn sentinel_id_fails_validation_without_requests() {
        let resolver = resolver(ScriptedTransport::new());
        let err = resolver.resolve("undefined", 0).await.expect_err("sentinel");
        assert!(matches!(err, PlaybackError::Validation(_)));
        assert!(seen(&resolver).is_empty());
    }
}

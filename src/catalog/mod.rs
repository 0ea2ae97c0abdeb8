use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::PlaybackError;
use crate::gate::RateGate;
use crate::types::{EpisodeRef, RankKind, Title};

pub mod adapter;
pub mod transport;

use adapter::PlayPayload;
use transport::Transport;

const HOME_TAB: u32 = 17;
const MIN_QUERY_LEN: usize = 3;
const BODY_SNIPPET_LEN: usize = 120;

/// Client for the upstream catalog API plus the play relay.
///
/// Upstream calls pass through the shared [`RateGate`]; relay calls go to our
/// own server and are not gated.
pub struct CatalogClient<T> {
    transport: T,
    gate: Rc<RateGate>,
    api_base: Url,
    relay_base: Url,
    lang: String,
    timeout: Duration,
}

impl<T: Transport> CatalogClient<T> {
    pub fn new(
        transport: T,
        gate: Rc<RateGate>,
        api_base: &str,
        relay_base: &str,
        lang: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let api_base =
            Url::parse(api_base).with_context(|| format!("invalid catalog API base {api_base}"))?;
        let relay_base =
            Url::parse(relay_base).with_context(|| format!("invalid relay base {relay_base}"))?;
        Ok(Self {
            transport,
            gate,
            api_base,
            relay_base,
            lang: lang.to_string(),
            timeout,
        })
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn home(&self, page: u32, limit: u32) -> Result<Vec<Title>, PlaybackError> {
        let params = [
            ("tab", HOME_TAB.to_string()),
            ("page", page.to_string()),
            ("limit", limit.to_string()),
        ];
        let value = self.upstream_json(&["home"], &params).await?;
        Ok(adapter::normalize_title_list(&value))
    }

    pub async fn recommendations(&self) -> Result<Vec<Title>, PlaybackError> {
        let value = self.upstream_json(&["recommend"], &[]).await?;
        Ok(adapter::normalize_title_list(&value))
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<Title>, PlaybackError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(PlaybackError::Validation(format!(
                "search query must be at least {MIN_QUERY_LEN} characters"
            )));
        }
        let params = [("q", query.to_string()), ("page", page.to_string())];
        let value = self.upstream_json(&["search"], &params).await?;
        Ok(adapter::normalize_title_list(&value))
    }

    pub async fn rank(&self, kind: RankKind, page: u32) -> Result<Vec<Title>, PlaybackError> {
        let params = [
            ("type", kind.as_param().to_string()),
            ("page", page.to_string()),
        ];
        let value = self.upstream_json(&["rank"], &params).await?;
        Ok(adapter::normalize_title_list(&value))
    }

    pub async fn detail(&self, title_id: &str) -> Result<Title, PlaybackError> {
        let title_id = require_id(title_id, "title id")?;
        let value = self.upstream_json(&["drama", title_id], &[]).await?;
        let mut title = adapter::normalize_title(&value);
        if title.external_id.is_empty() {
            title.external_id = title_id.to_string();
        }
        Ok(title)
    }

    pub async fn episodes(&self, title_id: &str) -> Result<Vec<EpisodeRef>, PlaybackError> {
        let title_id = require_id(title_id, "title id")?;
        let value = self.upstream_json(&["episodes", title_id], &[]).await?;
        Ok(adapter::normalize_episodes(&value))
    }

    /// `GET /play/{id}?seq=`
    pub async fn play_by_path(&self, id: &str, seq: usize) -> Result<PlayPayload, PlaybackError> {
        let value = self
            .upstream_json(&["play", id], &[("seq", seq.to_string())])
            .await?;
        Ok(adapter::normalize_play(&value))
    }

    /// `GET /play?videoFakeId={id}&seq=`, for ids the upstream rejects as path
    /// segments.
    pub async fn play_by_query(&self, id: &str, seq: usize) -> Result<PlayPayload, PlaybackError> {
        let params = [("videoFakeId", id.to_string()), ("seq", seq.to_string())];
        let value = self.upstream_json(&["play"], &params).await?;
        Ok(adapter::normalize_play(&value))
    }

    /// `GET {relay}/api/proxy/play/{id}?seq=&lang=`
    pub async fn play_via_relay(&self, id: &str, seq: usize) -> Result<PlayPayload, PlaybackError> {
        let url = self.build_url(
            &self.relay_base,
            &["api", "proxy", "play", id],
            &[("seq", seq.to_string())],
        )?;
        let value = self.fetch_json(&url).await?;
        Ok(adapter::normalize_play(&value))
    }

    async fn upstream_json(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<Value, PlaybackError> {
        let url = self.build_url(&self.api_base, segments, params)?;
        self.gate.pass().await;
        self.fetch_json(&url).await
    }

    async fn fetch_json(&self, url: &Url) -> Result<Value, PlaybackError> {
        debug!(%url, "catalog request");
        let reply = self.transport.get(url, self.timeout).await?;
        if !reply.is_success() {
            let upstream_message = serde_json::from_str::<Value>(&reply.body)
                .ok()
                .and_then(|value| adapter::upstream_message(&value));
            warn!(%url, status = reply.status, "catalog request failed");
            return Err(PlaybackError::Network {
                message: format!("HTTP {}", reply.status),
                upstream_message,
            });
        }
        serde_json::from_str(&reply.body).map_err(|err| {
            warn!(%url, error = %err, "catalog response is not JSON");
            PlaybackError::UpstreamFormat(format!("{err}: {}", snippet(&reply.body)))
        })
    }

    fn build_url(
        &self,
        base: &Url,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<Url, PlaybackError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| PlaybackError::Validation(format!("base URL {base} cannot take a path")))?
            .pop_if_empty()
            .extend(segments);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("lang", &self.lang);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Rejects empty ids and the literal `undefined`/`null` strings that broken
/// links carry.
pub fn require_id<'a>(id: &'a str, what: &str) -> Result<&'a str, PlaybackError> {
    let id = id.trim();
    if id.is_empty() || id == "undefined" || id == "null" {
        return Err(PlaybackError::Validation(format!("{what} is missing")));
    }
    Ok(id)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_SNIPPET_LEN).collect();
    format!("{cut}\u{2026}")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use tokio::time::Instant;
    use url::Url;

    use super::CatalogClient;
    use super::transport::{HttpReply, Transport};
    use crate::error::PlaybackError;
    use crate::gate::RateGate;

    /// Answers each request with the first rule whose pattern occurs in the
    /// URL and remembers every URL it saw, along with when it was sent and the
    /// timeout it carried.
    #[derive(Default)]
    pub struct ScriptedTransport {
        rules: Vec<(String, Result<HttpReply, PlaybackError>)>,
        pub seen: RefCell<Vec<String>>,
        pub sent: RefCell<Vec<(Instant, Duration)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn json(mut self, pattern: &str, body: &str) -> Self {
            self.rules.push((
                pattern.to_string(),
                Ok(HttpReply {
                    status: 200,
                    body: body.to_string(),
                }),
            ));
            self
        }

        pub fn status(mut self, pattern: &str, status: u16, body: &str) -> Self {
            self.rules.push((
                pattern.to_string(),
                Ok(HttpReply {
                    status,
                    body: body.to_string(),
                }),
            ));
            self
        }

        pub fn fail(mut self, pattern: &str, error: PlaybackError) -> Self {
            self.rules.push((pattern.to_string(), Err(error)));
            self
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpReply, PlaybackError> {
            let url = url.to_string();
            self.seen.borrow_mut().push(url.clone());
            self.sent.borrow_mut().push((Instant::now(), timeout));
            self.rules
                .iter()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| Err(PlaybackError::network(format!("no rule for {url}"))))
        }
    }

    pub fn client(transport: ScriptedTransport) -> CatalogClient<ScriptedTransport> {
        gated_client(transport, RateGate::new(Duration::ZERO))
    }

    pub fn gated_client(
        transport: ScriptedTransport,
        gate: RateGate,
    ) -> CatalogClient<ScriptedTransport> {
        CatalogClient::new(
            transport,
            Rc::new(gate),
            "https://api.test/api/v1",
            "https://relay.test",
            "id",
            Duration::from_secs(10),
        )
        .expect("test client")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedTransport, client};
    use super::*;

    #[tokio::test]
    async fn play_urls_follow_each_addressing_mode() {
        let catalog = client(
            ScriptedTransport::new()
                .json("v1/play/", r#"{"url":"p.m3u8"}"#)
                .json("/play?", r#"{"url":"q.m3u8"}"#)
                .json("/proxy/", r#"{"url":"r.m3u8"}"#),
        );
        catalog.play_by_path("abc", 2).await.expect("path");
        catalog.play_by_query("abc", 2).await.expect("query");
        catalog.play_via_relay("abc", 2).await.expect("relay");

        let seen = catalog.transport.seen.borrow();
        assert_eq!(seen[0], "https://api.test/api/v1/play/abc?lang=id&seq=2");
        assert_eq!(
            seen[1],
            "https://api.test/api/v1/play?lang=id&videoFakeId=abc&seq=2"
        );
        assert_eq!(seen[2], "https://relay.test/api/proxy/play/abc?lang=id&seq=2");
    }

    #[tokio::test]
    async fn path_segments_are_escaped() {
        let catalog = client(ScriptedTransport::new().json("v1/play/", "{}"));
        catalog.play_by_path("a/b c", 0).await.expect("path");
        let seen = catalog.transport.seen.borrow();
        assert_eq!(seen[0], "https://api.test/api/v1/play/a%2Fb%20c?lang=id&seq=0");
    }

    #[tokio::test]
    async fn html_body_is_a_format_error() {
        let catalog = client(
            ScriptedTransport::new().json("/drama/", "<html><body>502 Bad Gateway</body></html>"),
        );
        let err = catalog.detail("d1").await.expect_err("html is not json");
        assert!(matches!(err, PlaybackError::UpstreamFormat(_)));
    }

    #[tokio::test]
    async fn error_status_keeps_upstream_message() {
        let catalog = client(ScriptedTransport::new().status(
            "/episodes/",
            404,
            r#"{"message":"drama not found"}"#,
        ));
        let err = catalog.episodes("gone").await.expect_err("404");
        assert_eq!(err.upstream_message(), Some("drama not found"));
        assert_eq!(err.to_string(), "network error: HTTP 404");
    }

    #[tokio::test]
    async fn short_search_is_rejected_before_any_request() {
        let catalog = client(ScriptedTransport::new());
        let err = catalog.search("  ab ", 1).await.expect_err("too short");
        assert!(matches!(err, PlaybackError::Validation(_)));
        assert!(catalog.transport.seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn search_trims_and_normalises_results() {
        let catalog = client(ScriptedTransport::new().json(
            "/search",
            r#"{"compilationsInfoList":[{"fakeId":"s1","title":"CEO"}],"total":1}"#,
        ));
        let titles = catalog.search("  ceo ", 1).await.expect("search");
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].display_title, "CEO");
        let seen = catalog.transport.seen.borrow();
        assert!(seen[0].ends_with("/search?lang=id&q=ceo&page=1"));
    }

    #[tokio::test]
    async fn detail_keeps_requested_id_when_payload_omits_it() {
        let catalog = client(ScriptedTransport::new().json(
            "/drama/",
            r#"{"title":"No Id","uploadOfEpisodes":12}"#,
        ));
        let title = catalog.detail("d9").await.expect("detail");
        assert_eq!(title.external_id, "d9");
        assert_eq!(title.episode_count, 12);
    }

    #[test]
    fn sentinel_ids_are_rejected() {
        assert!(require_id("", "id").is_err());
        assert!(require_id("undefined", "id").is_err());
        assert!(require_id(" null ", "id").is_err());
        assert_eq!(require_id(" v1 ", "id").ok(), Some("v1"));
    }
}

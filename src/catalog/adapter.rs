//! Normalisation of upstream catalog payloads.
//!
//! The catalog answers with several field-name families for the same data and
//! wraps collections inconsistently. Everything here is total: missing or
//! mistyped fields fall back to defaults instead of failing.

use serde_json::{Map, Value};

use crate::types::{EpisodeRef, MediaLocator, Subtitle, Title};

const TITLE_ID_KEYS: &[&str] = &["fakeId", "id", "dramaId"];
const TITLE_NAME_KEYS: &[&str] = &["title", "name"];
const COVER_KEYS: &[&str] = &["poster", "coverImgUrl", "cover"];
const RATING_KEYS: &[&str] = &["rating", "hotValue"];
const EPISODE_COUNT_KEYS: &[&str] = &["episodes", "uploadOfEpisodes", "episodeCount"];
const DESCRIPTION_KEYS: &[&str] = &["introduce", "synopsis", "description"];
const TAG_KEYS: &[&str] = &["tags", "compilationsTags", "tagList", "genre"];
const LIST_KEYS: &[&str] = &["compilationsInfoList", "dramaList", "rankList", "list", "data"];

const EPISODE_ID_KEYS: &[&str] = &["fakeId", "videoFakeId", "id"];
const EPISODE_ORDINAL_KEYS: &[&str] = &["sequence", "seq", "index"];
const EPISODE_NUMBER_KEYS: &[&str] = &["number", "episodeNumber", "episodeNo"];

const STREAM_URL_KEYS: &[&str] = &["url", "videoUrl"];
const SUBTITLE_LANG_KEYS: &[&str] = &["language", "lang", "languageCode"];
const SUBTITLE_URL_KEYS: &[&str] = &["url", "src"];
const DURATION_KEYS: &[&str] = &["duration", "durationSeconds"];
const MESSAGE_KEYS: &[&str] = &["message", "msg", "error"];

pub fn normalize_title(value: &Value) -> Title {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    Title {
        external_id: first_text(obj, TITLE_ID_KEYS).unwrap_or_default(),
        display_title: first_text(obj, TITLE_NAME_KEYS).unwrap_or_default(),
        cover_url: first_text(obj, COVER_KEYS).unwrap_or_default(),
        rating_or_hot_value: first_text(obj, RATING_KEYS).unwrap_or_else(|| String::from("0")),
        episode_count: first_count(obj, EPISODE_COUNT_KEYS).unwrap_or(0),
        description: first_text(obj, DESCRIPTION_KEYS).unwrap_or_default(),
        tags: first_string_list(obj, TAG_KEYS),
    }
}

/// Accepts a bare array of titles or an object wrapping one under any of the
/// known list keys.
pub fn normalize_title_list(value: &Value) -> Vec<Title> {
    let items = match value {
        Value::Array(items) => Some(items),
        Value::Object(obj) => LIST_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array)),
        _ => None,
    };
    items
        .map(|items| {
            items
                .iter()
                .map(normalize_title)
                .filter(|title| !title.external_id.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts either a bare ordered array or an object with an `episodes` field.
pub fn normalize_episodes(value: &Value) -> Vec<EpisodeRef> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => obj
            .get("episodes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let empty = Map::new();
    let mut episodes: Vec<EpisodeRef> = items
        .iter()
        .enumerate()
        .map(|(position, raw)| {
            let obj = raw.as_object().unwrap_or(&empty);
            let sequence_index = first_ordinal(obj, EPISODE_ORDINAL_KEYS).unwrap_or(position);
            let display_number = first_number(obj, EPISODE_NUMBER_KEYS)
                .unwrap_or_else(|| (sequence_index as u64).saturating_add(1));
            EpisodeRef {
                external_id: first_text(obj, EPISODE_ID_KEYS).unwrap_or_default(),
                sequence_index,
                display_number,
                title: first_text(obj, TITLE_NAME_KEYS).unwrap_or_default(),
            }
        })
        .collect();
    episodes.sort_by_key(|ep| ep.sequence_index);
    episodes
}

/// Normalised play response. `stream_url` may be empty; only
/// [`PlayPayload::into_locator`] enforces the non-empty rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayPayload {
    pub stream_url: String,
    pub subtitles: Vec<Subtitle>,
    pub display_title: Option<String>,
    pub sequence: Option<usize>,
    pub duration_seconds: Option<f64>,
    pub upstream_message: Option<String>,
}

impl PlayPayload {
    pub fn into_locator(self) -> Option<MediaLocator> {
        if self.stream_url.trim().is_empty() {
            return None;
        }
        Some(MediaLocator {
            stream_url: self.stream_url,
            subtitles: self.subtitles,
            display_title: self.display_title,
            sequence: self.sequence,
            duration_seconds: self.duration_seconds,
        })
    }
}

pub fn normalize_play(value: &Value) -> PlayPayload {
    let empty = Map::new();
    let top = value.as_object().unwrap_or(&empty);
    // Some responses nest the payload under `data`.
    let obj = match top.get("data").and_then(Value::as_object) {
        Some(inner) if first_text(top, STREAM_URL_KEYS).is_none() => inner,
        _ => top,
    };

    let subtitles = obj
        .get("subtitles")
        .and_then(Value::as_array)
        .map(|subs| {
            subs.iter()
                .filter_map(Value::as_object)
                .filter_map(|sub| {
                    let url = first_text(sub, SUBTITLE_URL_KEYS)?;
                    let language_code = first_text(sub, SUBTITLE_LANG_KEYS).unwrap_or_default();
                    Some(Subtitle { language_code, url })
                })
                .collect()
        })
        .unwrap_or_default();

    PlayPayload {
        stream_url: first_text(obj, STREAM_URL_KEYS).unwrap_or_default(),
        subtitles,
        display_title: first_text(obj, TITLE_NAME_KEYS),
        sequence: first_ordinal(obj, &["seq", "sequence"]),
        duration_seconds: DURATION_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(as_f64))
            .filter(|secs| *secs > 0.0),
        upstream_message: upstream_message(value),
    }
}

/// Error text the upstream placed in a JSON body, if any.
pub fn upstream_message(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    MESSAGE_KEYS.iter().find_map(|key| match obj.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Object(inner) => first_text(inner, &["message", "msg"]),
        _ => None,
    })
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    })
}

fn first_ordinal(obj: &Map<String, Value>, keys: &[&str]) -> Option<usize> {
    first_number(obj, keys).and_then(|n| usize::try_from(n).ok())
}

/// Like [`first_ordinal`], but an array counts as its length.
fn first_count(obj: &Map<String, Value>, keys: &[&str]) -> Option<usize> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Array(items) => Some(items.len()),
        Value::Number(_) | Value::String(_) => first_ordinal(obj, &[*key]),
        _ => None,
    })
}

fn first_string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Object(tag) => first_text(tag, &["name", "tagName"]),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

use std::fmt;

use url::form_urlencoded;

/// Hash-style navigation targets: `#/`, `#/search?q=`, `#/rank`,
/// `#/drama/<id>`, `#/play/<id>?seq=<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Search { query: String },
    Rank,
    Drama { id: String },
    Play { id: String, seq: usize },
    NotFound(String),
}

impl Route {
    pub fn parse(hash: &str) -> Route {
        let raw = hash.trim();
        let raw = raw.strip_prefix('#').unwrap_or(raw);
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        let param = |name: &str| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Home,
            ["search"] => Route::Search {
                query: param("q").unwrap_or_default(),
            },
            ["rank"] => Route::Rank,
            ["drama", id] => Route::Drama { id: decode_segment(id) },
            ["play", id] => Route::Play {
                id: decode_segment(id),
                seq: param("seq")
                    .and_then(|seq| seq.trim().parse().ok())
                    .unwrap_or(0),
            },
            _ => Route::NotFound(hash.to_string()),
        }
    }

    pub fn play(id: impl Into<String>, seq: usize) -> Route {
        Route::Play { id: id.into(), seq }
    }

    pub fn is_player(&self) -> bool {
        matches!(self, Route::Play { .. })
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|id| id.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Home => f.write_str("#/"),
            Route::Search { query } => {
                let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
                write!(f, "#/search?q={encoded}")
            }
            Route::Rank => f.write_str("#/rank"),
            Route::Drama { id } => write!(f, "#/drama/{}", urlencoding::encode(id)),
            Route::Play { id, seq } => write!(f, "#/play/{}?seq={seq}", urlencoding::encode(id)),
            Route::NotFound(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_route_form() {
        assert_eq!(Route::parse("#/"), Route::Home);
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("#/rank"), Route::Rank);
        assert_eq!(
            Route::parse("#/search?q=ceo+love"),
            Route::Search {
                query: String::from("ceo love")
            }
        );
        assert_eq!(
            Route::parse("#/drama/abc123"),
            Route::Drama {
                id: String::from("abc123")
            }
        );
        assert_eq!(Route::parse("#/play/v9?seq=4"), Route::play("v9", 4));
        assert_eq!(Route::parse("#/play/a%2Fb?seq=1"), Route::play("a/b", 1));
    }

    #[test]
    fn play_without_valid_seq_starts_at_zero() {
        assert_eq!(Route::parse("#/play/v9"), Route::play("v9", 0));
        assert_eq!(Route::parse("#/play/v9?seq=x"), Route::play("v9", 0));
    }

    #[test]
    fn unknown_paths_are_not_found() {
        assert!(matches!(Route::parse("#/settings"), Route::NotFound(_)));
        assert!(matches!(Route::parse("#/drama"), Route::NotFound(_)));
    }

    #[test]
    fn display_round_trips() {
        for route in [
            Route::Home,
            Route::Rank,
            Route::Search {
                query: String::from("a & b"),
            },
            Route::Drama {
                id: String::from("d1"),
            },
            Route::play("v1", 7),
            Route::Drama {
                id: String::from("a/b?c"),
            },
            Route::play("x/y?seq=9", 2),
        ] {
            assert_eq!(Route::parse(&route.to_string()), route);
        }
    }
}

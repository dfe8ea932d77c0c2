//! Recognition of supported watch-page links

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

const WATCH_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Path prefixes that carry the video id as the next segment
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live", "v"];

/// A validated link to a single video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    pub video_id: String,
    /// Watch URL stripped of playlist, timestamp and tracking parameters
    pub canonical_url: String,
}

impl MediaLink {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Validation("URL not provided".into()));
        }

        let parsed = Url::parse(input)
            .map_err(|_| Error::Validation(format!("Not a valid URL: {}", input)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Validation("Only http and https links are supported".into()));
        }

        let host = parsed
            .host_str()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| Error::Validation("URL has no host".into()))?;

        let video_id = if host == "youtu.be" || host == "www.youtu.be" {
            first_segment(&parsed)
        } else if WATCH_HOSTS.contains(&host.as_str()) {
            id_from_watch_host(&parsed)
        } else {
            None
        };

        match video_id {
            Some(id) if VIDEO_ID_RE.is_match(&id) => Ok(Self {
                canonical_url: format!("https://www.youtube.com/watch?v={}", id),
                video_id: id,
            }),
            _ => Err(Error::Validation(
                "Unsupported link: paste a YouTube video link".into(),
            )),
        }
    }
}

fn first_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn id_from_watch_host(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["watch"] => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_page_accepts_the_same_links() {
        let page = include_str!("../../static/index.html");
        for host in WATCH_HOSTS.iter().chain(["youtu.be", "www.youtu.be"].iter()) {
            assert!(page.contains(&format!("'{}'", host)), "page misses host {}", host);
        }
        for prefix in ID_PATH_PREFIXES {
            assert!(page.contains(&format!("'{}'", prefix)), "page misses path {}", prefix);
        }
        assert!(page.contains("/^[A-Za-z0-9_-]{11}$/"));
    }

    #[test]
    fn parses_standard_watch_link() {
        let link = MediaLink::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(link.video_id, "dQw4w9WgXcQ");
        assert_eq!(link.canonical_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn strips_playlist_and_timestamp() {
        let link = MediaLink::parse(
            "  https://m.youtube.com/watch?list=PL123&v=dQw4w9WgXcQ&t=42s ",
        )
        .unwrap();
        assert_eq!(link.canonical_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn parses_short_and_path_forms() {
        for url in [
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/live/dQw4w9WgXcQ?feature=share",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://music.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
        ] {
            let link = MediaLink::parse(url).unwrap_or_else(|e| panic!("{}: {}", url, e));
            assert_eq!(link.video_id, "dQw4w9WgXcQ", "{}", url);
        }
    }

    #[test]
    fn rejects_empty_input() {
        let err = MediaLink::parse("   ").unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("not provided")));
    }

    #[test]
    fn rejects_other_hosts_and_bad_ids() {
        for url in [
            "https://vimeo.com/123456",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/channel/UC123",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://evil.example/youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert!(
                matches!(MediaLink::parse(url), Err(Error::Validation(_))),
                "{} should be rejected",
                url
            );
        }
    }
}

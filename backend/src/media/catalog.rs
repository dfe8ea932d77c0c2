//! Mapping of raw stream catalogs into user-facing quality options

use crate::extractor::{RawFormat, RawMedia};
use crate::media::humanize::{format_duration, format_size};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Quality tiers offered to the user, highest first
pub const TIERS: [u32; 8] = [2160, 1440, 1080, 720, 480, 360, 240, 144];

pub const AUDIO_FORMAT_ID: &str = "bestaudio";
pub const AUDIO_QUALITY_LABEL: &str = "Audio only";

/// Video summary returned by the info endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration: u64,
    pub duration_str: String,
    pub view_count: u64,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatOption>,
}

/// A selectable download option; the first one is the default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatOption {
    pub format_id: String,
    pub quality: String,
    pub height: u32,
    pub ext: String,
    pub filesize: Option<u64>,
    pub filesize_str: String,
    pub has_audio: bool,
    pub audio_only: bool,
}

impl VideoInfo {
    pub fn from_raw(raw: &RawMedia) -> Self {
        let duration = raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0);

        Self {
            id: raw.id.clone(),
            title: raw.title.clone().unwrap_or_else(|| "video".to_string()),
            channel: raw.channel.clone().or_else(|| raw.uploader.clone()),
            duration,
            duration_str: format_duration(duration),
            view_count: raw.view_count.unwrap_or(0),
            thumbnail: raw.thumbnail.clone(),
            formats: list_formats(&raw.formats),
        }
    }
}

/// Largest tier not above `height`
pub fn tier_for(height: u32) -> Option<u32> {
    TIERS.iter().copied().find(|tier| height >= *tier)
}

/// Collapse raw streams into one option per tier plus one audio-only option
pub fn list_formats(formats: &[RawFormat]) -> Vec<FormatOption> {
    let mut best_by_tier: BTreeMap<u32, &RawFormat> = BTreeMap::new();

    for f in formats.iter().filter(|f| f.has_video() && !f.format_id.is_empty()) {
        let Some(tier) = f.height.and_then(tier_for) else {
            continue;
        };

        let replace = best_by_tier
            .get(&tier)
            .map_or(true, |current| rank(f, current) == Ordering::Greater);
        if replace {
            best_by_tier.insert(tier, f);
        }
    }

    let best_audio = formats
        .iter()
        .filter(|f| f.has_audio() && !f.has_video())
        .max_by(|a, b| bitrate(a, a.abr).total_cmp(&bitrate(b, b.abr)));
    let audio_size = best_audio.and_then(|f| f.size_estimate());

    let mut options: Vec<FormatOption> = best_by_tier
        .into_iter()
        .rev()
        .map(|(tier, f)| {
            let has_audio = f.has_audio();
            let filesize = match (f.size_estimate(), has_audio) {
                (Some(video), false) => Some(video + audio_size.unwrap_or(0)),
                (size, _) => size,
            };
            FormatOption {
                format_id: f.format_id.clone(),
                quality: format!("{}p", tier),
                height: tier,
                ext: "mp4".to_string(),
                filesize,
                filesize_str: filesize.map(format_size).unwrap_or_else(|| "Unknown size".into()),
                has_audio,
                audio_only: false,
            }
        })
        .collect();

    options.push(FormatOption {
        format_id: AUDIO_FORMAT_ID.to_string(),
        quality: AUDIO_QUALITY_LABEL.to_string(),
        height: 0,
        ext: "mp3".to_string(),
        filesize: audio_size,
        filesize_str: audio_size.map(format_size).unwrap_or_else(|| "MP3".into()),
        has_audio: true,
        audio_only: true,
    });

    options
}

/// Streams that can be copied into an mp4 container without re-encoding
fn mergeable(f: &RawFormat) -> bool {
    f.ext.as_deref() == Some("mp4")
        || f.vcodec
            .as_deref()
            .map(|c| c.starts_with("avc1") || c.starts_with("h264"))
            .unwrap_or(false)
}

fn bitrate(f: &RawFormat, preferred: Option<f64>) -> f64 {
    preferred.or(f.tbr).unwrap_or(0.0)
}

fn rank(a: &RawFormat, b: &RawFormat) -> Ordering {
    mergeable(a)
        .cmp(&mergeable(b))
        .then_with(|| bitrate(a, a.vbr).total_cmp(&bitrate(b, b.vbr)))
        .then_with(|| a.size_estimate().unwrap_or(0).cmp(&b.size_estimate().unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: u32, ext: &str, vcodec: &str, vbr: f64) -> RawFormat {
        RawFormat {
            format_id: id.into(),
            ext: Some(ext.into()),
            height: Some(height),
            vcodec: Some(vcodec.into()),
            acodec: Some("none".into()),
            vbr: Some(vbr),
            filesize: Some(10_000_000.0),
            ..Default::default()
        }
    }

    fn audio(id: &str, abr: f64, size: f64) -> RawFormat {
        RawFormat {
            format_id: id.into(),
            ext: Some("m4a".into()),
            vcodec: Some("none".into()),
            acodec: Some("mp4a.40.2".into()),
            abr: Some(abr),
            filesize: Some(size),
            ..Default::default()
        }
    }

    #[test]
    fn one_entry_per_tier_highest_first_audio_last() {
        let formats = vec![
            video("160", 144, "mp4", "avc1.4d400c", 100.0),
            video("137", 1080, "mp4", "avc1.640028", 4000.0),
            video("248", 1080, "webm", "vp9", 5000.0),
            video("136", 720, "mp4", "avc1.4d401f", 2000.0),
            video("247", 720, "webm", "vp9", 2500.0),
            audio("140", 128.0, 3_000_000.0),
            audio("251", 160.0, 3_500_000.0),
        ];

        let options = list_formats(&formats);
        let labels: Vec<&str> = options.iter().map(|o| o.quality.as_str()).collect();
        assert_eq!(labels, ["1080p", "720p", "144p", AUDIO_QUALITY_LABEL]);

        // mp4/avc wins over a higher-bitrate webm in the same tier
        assert_eq!(options[0].format_id, "137");
        assert_eq!(options[1].format_id, "136");

        let audio = options.last().unwrap();
        assert!(audio.audio_only);
        assert_eq!(audio.format_id, AUDIO_FORMAT_ID);
        assert_eq!(audio.filesize, Some(3_500_000));
    }

    #[test]
    fn higher_bitrate_wins_among_equally_mergeable() {
        let formats = vec![
            video("a", 720, "mp4", "avc1", 1000.0),
            video("b", 720, "mp4", "avc1", 3000.0),
            video("c", 720, "mp4", "avc1", 2000.0),
        ];
        let options = list_formats(&formats);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].format_id, "b");
    }

    #[test]
    fn odd_heights_fold_into_lower_tier() {
        let formats = vec![
            video("v1", 1920, "mp4", "avc1", 5000.0),
            video("v2", 1280, "mp4", "avc1", 3000.0),
            video("v3", 100, "mp4", "avc1", 50.0),
        ];
        let options = list_formats(&formats);
        let heights: Vec<u32> = options.iter().map(|o| o.height).collect();
        assert_eq!(heights, [1440, 1080, 0]);
    }

    #[test]
    fn video_size_includes_audio_when_stream_is_silent() {
        let formats = vec![
            video("137", 1080, "mp4", "avc1", 4000.0),
            audio("140", 128.0, 2_000_000.0),
        ];
        let options = list_formats(&formats);
        assert_eq!(options[0].filesize, Some(12_000_000));
        assert!(!options[0].has_audio);
        assert_eq!(options[0].filesize_str, "11.4 MB");
    }

    #[test]
    fn audio_option_present_even_without_streams() {
        let options = list_formats(&[]);
        assert_eq!(options.len(), 1);
        assert!(options[0].audio_only);
        assert_eq!(options[0].filesize_str, "MP3");
    }

    #[test]
    fn video_info_fills_defaults() {
        let raw = RawMedia {
            id: "dQw4w9WgXcQ".into(),
            title: Some("Song".into()),
            uploader: Some("Uploader".into()),
            duration: Some(212.4),
            formats: vec![video("18", 360, "mp4", "avc1", 500.0)],
            ..Default::default()
        };
        let info = VideoInfo::from_raw(&raw);
        assert_eq!(info.channel.as_deref(), Some("Uploader"));
        assert_eq!(info.duration, 212);
        assert_eq!(info.duration_str, "03:32");
        assert_eq!(info.view_count, 0);
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].quality, "360p");
    }
}

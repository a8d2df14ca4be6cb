//! Track resolution: turns a URL into playable tracks.
//!
//! Fetches audio from YouTube URLs through rusty_ytdl and decodes it to
//! PCM with symphonia so any output sink can play it.

use std::io::Cursor;
use std::sync::Arc;

use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::track::{PcmAudio, Track};

/// Fetches playable tracks for a URL. Abstraction allows swapping
/// rusty_ytdl for yt-dlp or other backends.
#[async_trait::async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve `url` into zero or more tracks.
    async fn resolve(&self, url: &str) -> Result<Vec<Track>, String>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognised container: {0}")]
    Probe(SymphoniaError),
    #[error("no decodable audio track")]
    NoAudioTrack,
    #[error("audio track has no sample rate")]
    NoSampleRate,
    #[error("unsupported codec: {0}")]
    Codec(SymphoniaError),
    #[error("corrupt stream: {0}")]
    Stream(SymphoniaError),
}

/// YouTube resolver using the rusty_ytdl crate.
pub struct YtdlResolver {
    max_track_secs: u64,
}

impl YtdlResolver {
    pub fn new(max_track_secs: u64) -> Self {
        Self { max_track_secs }
    }

    async fn download(video: &Video) -> Result<Vec<u8>, String> {
        let stream = video
            .stream()
            .await
            .map_err(|e| format!("Failed to open audio stream: {e}"))?;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.chunk().await.map_err(|e| format!("Stream error: {e}"))? {
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl TrackResolver for YtdlResolver {
    async fn resolve(&self, url: &str) -> Result<Vec<Track>, String> {
        let options = VideoOptions {
            quality: VideoQuality::Lowest,
            filter: VideoSearchOptions::Audio,
            ..Default::default()
        };
        let video =
            Video::new_with_options(url, options).map_err(|e| format!("Not a playable URL: {e}"))?;

        let details = video
            .get_basic_info()
            .await
            .map_err(|e| format!("Failed to look up video: {e}"))?
            .video_details;
        let duration = details.length_seconds.parse::<u64>().ok();
        check_duration(duration, self.max_track_secs)?;

        let bytes = Self::download(&video).await?;
        crate::dlog!("[DJ] Fetched {} bytes for '{}'", bytes.len(), details.title);

        let audio = tokio::task::spawn_blocking(move || decode_pcm(bytes))
            .await
            .map_err(|e| format!("Decode task failed: {e}"))?
            .map_err(|e| format!("Cannot decode '{}': {e}", details.title))?;

        let mut track = Track::new(details.title, url).with_audio(audio);
        if let Some(secs) = duration {
            track = track.with_duration(secs);
        }
        Ok(vec![track])
    }
}

fn check_duration(duration: Option<u64>, max_secs: u64) -> Result<(), String> {
    match duration {
        Some(secs) if secs > max_secs => Err(format!(
            "Cannot play video longer than {} minutes",
            max_secs / 60
        )),
        _ => Ok(()),
    }
}

/// Decode a downloaded container (webm/mp4) into interleaved `i16` PCM.
pub fn decode_pcm(bytes: Vec<u8>) -> Result<PcmAudio, DecodeError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut format = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?
        .format;

    let track = format
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or(DecodeError::NoSampleRate)?;
    let channels = track.codec_params.channels.map_or(2, |c| c.count() as u16);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    let samples = drain_packets(format.as_mut(), decoder.as_mut(), track_id)?;
    crate::dlog!("[DJ] Decoded {} samples at {sample_rate}Hz x{channels}", samples.len());
    Ok(PcmAudio {
        samples: Arc::new(samples),
        sample_rate,
        channels,
    })
}

/// Pull every packet of `track_id` through `decoder`. End of input ends the
/// stream; a packet that fails to decode is skipped.
fn drain_packets(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Vec<i16>, DecodeError> {
    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<i16>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => packet,
            Ok(_) => continue,
            Err(SymphoniaError::IoError(_)) => return Ok(samples),
            Err(e) => return Err(DecodeError::Stream(e)),
        };
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Stream(e)),
        };
        let buf = scratch
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_not_a_container() {
        let result = decode_pcm(vec![0, 1, 2, 3]);
        assert!(matches!(result, Err(DecodeError::Probe(_))));
    }

    #[test]
    fn decode_errors_read_well() {
        assert_eq!(DecodeError::NoAudioTrack.to_string(), "no decodable audio track");
        assert_eq!(DecodeError::NoSampleRate.to_string(), "audio track has no sample rate");
    }

    #[test]
    fn duration_limit_rejects_long_videos() {
        assert!(check_duration(Some(901), 900).is_err());
        assert!(check_duration(Some(900), 900).is_ok());
        assert!(check_duration(None, 900).is_ok());
    }

    #[tokio::test]
    async fn invalid_url_fails_before_network() {
        let resolver = YtdlResolver::new(900);
        assert!(resolver.resolve("not a url").await.is_err());
    }
}

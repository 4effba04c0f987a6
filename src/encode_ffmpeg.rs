//! MP4 encoding by streaming raw RGBA frames into a spawned `ffmpeg`
//! process, optionally muxing the song's audio into the output.

use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    error::{LyrvidError, LyrvidResult},
    export::FrameSink,
    render::FrameRGBA,
};

/// Audio source muxed alongside the rendered video.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Seek into the audio file, seconds.
    pub start: f64,
    /// Trim length, seconds; `None` relies on `-shortest`.
    pub duration: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub audio: Option<AudioTrack>,
}

impl EncodeConfig {
    pub fn validate(&self) -> LyrvidResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LyrvidError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(LyrvidError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(LyrvidError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if let Some(audio) = &self.audio {
            if !audio.start.is_finite() || audio.start < 0.0 {
                return Err(LyrvidError::validation("audio start must be >= 0"));
            }
            if let Some(d) = audio.duration {
                if !d.is_finite() || d <= 0.0 {
                    return Err(LyrvidError::validation("audio duration must be > 0"));
                }
            }
        }
        Ok(())
    }

    pub fn with_out_path(mut self, out_path: impl Into<PathBuf>) -> Self {
        self.out_path = out_path.into();
        self
    }

    pub fn with_audio(mut self, audio: AudioTrack) -> Self {
        self.audio = Some(audio);
        self
    }
}

pub fn default_mp4_config(
    out_path: impl Into<PathBuf>,
    width: u32,
    height: u32,
    fps: u32,
) -> EncodeConfig {
    EncodeConfig {
        width,
        height,
        fps,
        out_path: out_path.into(),
        overwrite: true,
        audio: None,
    }
}

/// Filesystem-safe stem for an output file derived from a song title.
pub fn sanitize_title(title: &str) -> String {
    static WS: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let ws = WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap_or_else(|_| unreachable!()));
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let out = ws.replace_all(cleaned.trim(), "-").into_owned();
    if out.is_empty() {
        "lyric-video".to_string()
    } else {
        out
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> LyrvidResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Streaming encoder around a spawned `ffmpeg` child process.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    bg_rgba: [u8; 4],
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig, bg_rgba: [u8; 4]) -> LyrvidResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(LyrvidError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(LyrvidError::encode(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        // System `ffmpeg` binary rather than linked FFmpeg libraries, so no
        // native dev headers are needed.
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if cfg.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = &cfg.audio {
            if audio.start > 0.0 {
                cmd.args(["-ss", &audio.start.to_string()]);
            }
            if let Some(d) = audio.duration {
                cmd.args(["-t", &d.to_string()]);
            }
            cmd.arg("-i").arg(&audio.path);
            cmd.args(["-map", "0:v:0", "-map", "1:a:0", "-c:a", "aac", "-shortest"]);
        } else {
            cmd.arg("-an");
        }

        cmd.args([
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            LyrvidError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LyrvidError::encode("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            scratch: vec![0u8; (cfg.width * cfg.height * 4) as usize],
            cfg,
            bg_rgba,
            child,
            stdin: Some(stdin),
        })
    }

    pub fn encode_frame(&mut self, frame: &FrameRGBA) -> LyrvidResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(LyrvidError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }

        if frame.data.len() != self.scratch.len() {
            return Err(LyrvidError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_to_opaque_rgba8(
            &mut self.scratch,
            &frame.data,
            frame.premultiplied,
            self.bg_rgba,
        )?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(LyrvidError::encode("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            LyrvidError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;

        Ok(())
    }

    pub fn finish(mut self) -> LyrvidResult<()> {
        drop(self.stdin.take());

        let output = self
            .child
            .wait_with_output()
            .map_err(|e| LyrvidError::encode(format!("failed to wait for ffmpeg to finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LyrvidError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

impl FrameSink for FfmpegEncoder {
    fn submit(&mut self, frame: &FrameRGBA) -> LyrvidResult<()> {
        self.encode_frame(frame)
    }

    fn finish(self: Box<Self>) -> LyrvidResult<()> {
        FfmpegEncoder::finish(*self)
    }
}

fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg_rgba: [u8; 4],
) -> LyrvidResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(LyrvidError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;

        let (r, g, b) = if src_is_premul {
            (
                s[0] as u16 + mul_div255(bg_r, inv),
                s[1] as u16 + mul_div255(bg_g, inv),
                s[2] as u16 + mul_div255(bg_b, inv),
            )
        } else {
            (
                mul_div255(s[0] as u16, a) + mul_div255(bg_r, inv),
                mul_div255(s[1] as u16, a) + mul_div255(bg_g, inv),
                mul_div255(s[2] as u16, a) + mul_div255(bg_b, inv),
            )
        };

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(
            default_mp4_config("out/video.mp4", 0, 10, 30)
                .validate()
                .is_err()
        );
        assert!(
            default_mp4_config("out/video.mp4", 11, 10, 30)
                .validate()
                .is_err()
        );
        assert!(
            default_mp4_config("out/video.mp4", 10, 10, 0)
                .validate()
                .is_err()
        );
        assert!(
            default_mp4_config("out/video.mp4", 10, 10, 30)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn audio_track_bounds_are_validated() {
        let bad_start = default_mp4_config("out/video.mp4", 10, 10, 30).with_audio(AudioTrack {
            path: PathBuf::from("song.mp3"),
            start: -1.0,
            duration: None,
        });
        assert!(bad_start.validate().is_err());

        let bad_dur = default_mp4_config("out/video.mp4", 10, 10, 30).with_audio(AudioTrack {
            path: PathBuf::from("song.mp3"),
            start: 0.0,
            duration: Some(0.0),
        });
        assert!(bad_dur.validate().is_err());
    }

    #[test]
    fn sanitize_title_hyphenates_whitespace() {
        assert_eq!(sanitize_title("My  Great\tSong"), "My-Great-Song");
        assert_eq!(sanitize_title("  trimmed  "), "trimmed");
        assert_eq!(sanitize_title("a/b:c"), "abc");
        assert_eq!(sanitize_title("   "), "lyric-video");
    }

    #[test]
    fn flatten_premul_over_black_produces_expected_rgb() {
        // Premultiplied red @ 50% alpha => rgb is 128,0,0 when premul.
        let src = vec![128u8, 0u8, 0u8, 128u8];
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &src, true, [0, 0, 0, 255]).unwrap();
        assert_eq!(dst, vec![128u8, 0u8, 0u8, 255u8]);
    }

    #[test]
    fn flatten_straight_over_black_produces_expected_rgb() {
        // Straight red @ 50% alpha => rgb becomes 128,0,0 over black.
        let src = vec![255u8, 0u8, 0u8, 128u8];
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &src, false, [0, 0, 0, 255]).unwrap();
        assert_eq!(dst, vec![128u8, 0u8, 0u8, 255u8]);
    }
}

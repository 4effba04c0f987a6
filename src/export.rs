//! Offline export: step the renderer over a fixed frame grid and stream
//! the frames into a sink, plus the auxiliary-clock sync used to keep a
//! background video locked to the song during preview.

use crate::config::RenderConfig;
use crate::error::{LyrvidError, LyrvidResult};
use crate::render::{FrameInput, FrameRGBA, FrameRenderer, SceneAssets};
use crate::store::LyricStore;
use crate::sync::PlaybackClock;

/// Receives finished frames; the ffmpeg encoder is the production impl,
/// tests collect into memory.
pub trait FrameSink {
    fn submit(&mut self, frame: &FrameRGBA) -> LyrvidResult<()>;
    fn finish(self: Box<Self>) -> LyrvidResult<()>;
}

/// Per-frame audio features for offline rendering, captured ahead of time
/// since no audio pipeline runs during export.
pub trait AudioFeatures {
    /// Spectrum bins at `time`, 0..=255 each. Empty means silence.
    fn spectrum_at(&self, time: f64) -> Vec<u8>;
}

/// No audio: every frame renders silent.
pub struct SilentAudio;

impl AudioFeatures for SilentAudio {
    fn spectrum_at(&self, _time: f64) -> Vec<u8> {
        Vec::new()
    }
}

/// Pre-captured spectrum frames on their own capture grid.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SpectrumFrames {
    pub fps: u32,
    pub frames: Vec<Vec<u8>>,
}

impl AudioFeatures for SpectrumFrames {
    fn spectrum_at(&self, time: f64) -> Vec<u8> {
        if self.frames.is_empty() || self.fps == 0 {
            return Vec::new();
        }
        let idx = (time.max(0.0) * f64::from(self.fps)).floor() as usize;
        self.frames[idx.min(self.frames.len() - 1)].clone()
    }
}

/// Half-open export window in seconds.
#[derive(Clone, Copy, Debug)]
pub struct ExportRange {
    pub start: f64,
    pub end: f64,
}

impl ExportRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> LyrvidResult<()> {
        if !self.start.is_finite() || !self.end.is_finite() || self.start < 0.0 {
            return Err(LyrvidError::validation("export range must be finite and >= 0"));
        }
        if self.end <= self.start {
            return Err(LyrvidError::validation(
                "export end must be greater than start",
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Render every frame in `range` at the configured fps and stream each
/// one into `sink`. Returns the frame count.
#[tracing::instrument(skip_all, fields(start = range.start, end = range.end))]
pub fn export_frames(
    renderer: &mut FrameRenderer,
    store: &LyricStore,
    cfg: &RenderConfig,
    assets: &SceneAssets<'_>,
    range: ExportRange,
    audio: &dyn AudioFeatures,
    mut sink: Box<dyn FrameSink>,
) -> LyrvidResult<u64> {
    cfg.validate()?;
    range.validate()?;

    let fps = cfg.export.fps;
    let step = 1.0 / f64::from(fps);
    let mut count = 0u64;

    loop {
        // Frame times come off the integer grid, not accumulated steps,
        // so long exports don't drift.
        let t = range.start + count as f64 * step;
        if t >= range.end {
            break;
        }
        let spectrum = audio.spectrum_at(t);
        let input = FrameInput::new(t, &spectrum);
        let frame = renderer.render_frame(store, cfg, assets, &input)?;
        sink.submit(&frame)?;
        count += 1;

        if count.is_multiple_of(u64::from(fps)) {
            tracing::info!(
                frames = count,
                secs = t - range.start,
                "export progress"
            );
        }
    }

    sink.finish()?;
    Ok(count)
}

/// Seek threshold right after a correction, seconds.
const SYNC_EPS_SETTLING: f64 = 0.5;
/// Steady-state seek threshold, seconds.
const SYNC_EPS_STEADY: f64 = 0.2;
/// How long the looser threshold applies after a seek, seconds.
const SYNC_SETTLE_SECS: f64 = 0.5;

/// Keeps an auxiliary clock (a looping background video) following the
/// primary one with a configurable delay.
///
/// Right after a correction the aux clock needs a moment to land, so the
/// drift tolerance briefly widens; re-seeking inside that window would
/// oscillate.
pub struct AuxClockSync {
    pub delay: f64,
    last_seek_at: Option<f64>,
}

impl AuxClockSync {
    pub fn new(delay: f64) -> Self {
        Self {
            delay,
            last_seek_at: None,
        }
    }

    /// Correct the aux clock against the primary; call once per tick.
    pub fn sync(
        &mut self,
        primary: &impl PlaybackClock,
        aux: &mut impl PlaybackClock,
        primary_playing: bool,
    ) {
        let Some(aux_dur) = aux.duration() else {
            return;
        };
        if aux_dur <= 0.0 {
            return;
        }

        let now = primary.current_time();
        let target = (now + self.delay).rem_euclid(aux_dur);

        let settling = self
            .last_seek_at
            .is_some_and(|at| (now - at).abs() < SYNC_SETTLE_SECS);
        let eps = if settling {
            SYNC_EPS_SETTLING
        } else {
            SYNC_EPS_STEADY
        };

        if (aux.current_time() - target).abs() > eps {
            aux.seek(target);
            self.last_seek_at = Some(now);
        }

        if primary_playing {
            aux.play();
        } else {
            aux.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LyricEntry;

    struct CollectSink {
        frames: std::rc::Rc<std::cell::RefCell<Vec<usize>>>,
        finished: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl FrameSink for CollectSink {
        fn submit(&mut self, frame: &FrameRGBA) -> LyrvidResult<()> {
            self.frames.borrow_mut().push(frame.data.len());
            Ok(())
        }
        fn finish(self: Box<Self>) -> LyrvidResult<()> {
            self.finished.set(true);
            Ok(())
        }
    }

    struct FakeClock {
        now: f64,
        duration: Option<f64>,
        playing: bool,
    }

    impl PlaybackClock for FakeClock {
        fn current_time(&self) -> f64 {
            self.now
        }
        fn seek(&mut self, secs: f64) {
            self.now = secs;
        }
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
    }

    #[test]
    fn range_validation() {
        assert!(ExportRange::new(0.0, 1.0).validate().is_ok());
        assert!(ExportRange::new(1.0, 1.0).validate().is_err());
        assert!(ExportRange::new(2.0, 1.0).validate().is_err());
        assert!(ExportRange::new(-1.0, 1.0).validate().is_err());
    }

    #[test]
    fn export_emits_fps_frames_per_second_and_finishes() {
        let mut renderer = FrameRenderer::new(32, 18, 1).unwrap();
        let store = LyricStore::new(vec![LyricEntry::plain("x")]);
        let cfg = RenderConfig::default();

        let frames = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let finished = std::rc::Rc::new(std::cell::Cell::new(false));
        let sink = Box::new(CollectSink {
            frames: frames.clone(),
            finished: finished.clone(),
        });

        let n = export_frames(
            &mut renderer,
            &store,
            &cfg,
            &SceneAssets::default(),
            ExportRange::new(0.0, 1.0),
            &SilentAudio,
            sink,
        )
        .unwrap();

        // 30 fps over one second.
        assert_eq!(n, 30);
        assert_eq!(frames.borrow().len(), 30);
        assert!(frames.borrow().iter().all(|&len| len == 32 * 18 * 4));
        assert!(finished.get());
    }

    #[test]
    fn spectrum_frames_clamp_to_last_capture() {
        let sf = SpectrumFrames {
            fps: 10,
            frames: vec![vec![1], vec![2], vec![3]],
        };
        assert_eq!(sf.spectrum_at(0.0), vec![1]);
        assert_eq!(sf.spectrum_at(0.15), vec![2]);
        assert_eq!(sf.spectrum_at(99.0), vec![3]);
        assert!(SilentAudio.spectrum_at(1.0).is_empty());
    }

    #[test]
    fn aux_sync_seeks_only_past_threshold() {
        let primary = FakeClock {
            now: 10.0,
            duration: Some(100.0),
            playing: true,
        };
        let mut aux = FakeClock {
            now: 10.1,
            duration: Some(30.0),
            playing: false,
        };

        let mut sync = AuxClockSync::new(0.0);
        // Drift of 0.1s is inside the steady threshold.
        sync.sync(&primary, &mut aux, true);
        assert_eq!(aux.now, 10.1);
        assert!(aux.playing);

        aux.now = 11.0;
        sync.sync(&primary, &mut aux, true);
        assert_eq!(aux.now, 10.0);
    }

    #[test]
    fn aux_sync_wraps_target_around_aux_duration() {
        let primary = FakeClock {
            now: 35.0,
            duration: Some(100.0),
            playing: true,
        };
        let mut aux = FakeClock {
            now: 0.0,
            duration: Some(30.0),
            playing: false,
        };
        let mut sync = AuxClockSync::new(2.0);
        sync.sync(&primary, &mut aux, true);
        // (35 + 2) % 30 = 7.
        assert_eq!(aux.now, 7.0);
    }

    #[test]
    fn aux_sync_mirrors_pause() {
        let primary = FakeClock {
            now: 0.0,
            duration: Some(100.0),
            playing: false,
        };
        let mut aux = FakeClock {
            now: 0.0,
            duration: Some(30.0),
            playing: true,
        };
        let mut sync = AuxClockSync::new(0.0);
        sync.sync(&primary, &mut aux, false);
        assert!(!aux.playing);
    }

    #[test]
    fn aux_sync_without_duration_is_a_noop() {
        let primary = FakeClock {
            now: 5.0,
            duration: Some(100.0),
            playing: true,
        };
        let mut aux = FakeClock {
            now: 1.0,
            duration: None,
            playing: false,
        };
        AuxClockSync::new(0.0).sync(&primary, &mut aux, true);
        assert_eq!(aux.now, 1.0);
        assert!(!aux.playing);
    }
}

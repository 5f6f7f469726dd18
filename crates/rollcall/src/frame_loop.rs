use crate::annotate::Annotator;
use crate::ledger::{Attendance, Clock, MarkOutcome};
use crate::preview::{Preview, PreviewEvent};
use image::RgbImage;
use rollcall_core::{convert_color_order, BoundingBox, FaceProvider, Identity, MatchOutcome, Matcher, NearestMatcher};
use rollcall_hw::{downscale, FrameSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
    Terminated,
}

/// Why the loop left `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Quit key or window closed.
    Quit,
    /// Interrupt or termination signal.
    Interrupted,
    /// The camera stopped delivering frames.
    SourceFailed(String),
}

/// A face found in one frame, in full-resolution coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFace {
    pub bbox: BoundingBox,
    pub outcome: MatchOutcome,
}

/// What processing one frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Downscaling left nothing to analyze.
    Skipped,
    NoFace,
    Detected(Vec<RecognizedFace>),
    /// Detection or embedding failed for this frame only.
    TransientError(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub frame_scale: f32,
    pub warmup_frames: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    pub reason: StopReason,
    pub frames: u64,
    pub state: LoopState,
}

/// Capture → detect → match → record → annotate → display, one frame at a time.
///
/// Owns the camera and the preview; both are released when `run` returns,
/// whatever the reason.
pub struct FrameLoop<S, P, V, C> {
    source: S,
    provider: P,
    preview: V,
    clock: C,
    identities: Vec<Identity>,
    matcher: NearestMatcher,
    attendance: Attendance,
    annotator: Annotator,
    settings: LoopSettings,
    stop: Arc<AtomicBool>,
    state: LoopState,
    reason: Option<StopReason>,
    frames: u64,
}

impl<S, P, V, C> FrameLoop<S, P, V, C>
where
    S: FrameSource,
    P: FaceProvider,
    V: Preview,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        provider: P,
        preview: V,
        clock: C,
        identities: Vec<Identity>,
        matcher: NearestMatcher,
        attendance: Attendance,
        annotator: Annotator,
        settings: LoopSettings,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            provider,
            preview,
            clock,
            identities,
            matcher,
            attendance,
            annotator,
            settings,
            stop,
            state: LoopState::Running,
            reason: None,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attendance(&self) -> &Attendance {
        &self.attendance
    }

    /// Read and discard frames while the camera's exposure settles.
    /// Stops early at the first read failure; the loop proper reports it.
    pub fn warm_up(&mut self) {
        let count = self.settings.warmup_frames;
        if count == 0 {
            return;
        }
        tracing::info!(count, "discarding warmup frames");
        for i in 0..count {
            if let Err(e) = self.source.read_frame() {
                tracing::warn!(frame = i, error = %e, "warmup frame failed");
                break;
            }
        }
    }

    /// Run until quit, interrupt, or camera failure.
    pub fn run(mut self) -> RunSummary {
        self.warm_up();
        tracing::info!("starting frame loop, press q or Esc in the window (or Ctrl+C) to quit");

        while self.state == LoopState::Running {
            self.step();
        }

        let reason = self.reason.take().unwrap_or(StopReason::Interrupted);
        tracing::info!(?reason, frames = self.frames, "shutting down");

        let FrameLoop {
            source,
            preview,
            frames,
            ..
        } = self;
        drop(preview);
        drop(source);
        tracing::info!("camera and preview released");

        RunSummary {
            reason,
            frames,
            state: LoopState::Terminated,
        }
    }

    /// One iteration of the loop.
    pub fn step(&mut self) -> LoopState {
        if self.state != LoopState::Running {
            return self.state;
        }
        if self.stop.load(Ordering::SeqCst) {
            return self.shut_down(StopReason::Interrupted);
        }

        let mut frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to grab frame from webcam");
                return self.shut_down(StopReason::SourceFailed(e.to_string()));
            }
        };
        self.frames += 1;

        match self.process(&mut frame.image) {
            FrameOutcome::Skipped => tracing::trace!(seq = frame.sequence, "frame too small after downscale"),
            FrameOutcome::NoFace => {}
            FrameOutcome::Detected(faces) => tracing::debug!(
                seq = frame.sequence,
                faces = ?faces.iter().map(|f| f.outcome.label()).collect::<Vec<_>>(),
                "faces detected"
            ),
            FrameOutcome::TransientError(e) => {
                tracing::warn!(seq = frame.sequence, error = %e, "face processing failed, skipping frame")
            }
        }

        if self.preview.present(&frame.image) == PreviewEvent::Quit {
            tracing::info!("quit requested from preview");
            return self.shut_down(StopReason::Quit);
        }
        self.state
    }

    /// Detect, match, record and annotate the faces in `frame` in place.
    pub fn process(&mut self, frame: &mut RgbImage) -> FrameOutcome {
        let scale = self.settings.frame_scale;
        let Some(small) = downscale(frame, scale) else {
            return FrameOutcome::Skipped;
        };
        let small = convert_color_order(&small, self.provider.color_order());

        let faces = match self.provider.locate(&small) {
            Ok(faces) if faces.is_empty() => return FrameOutcome::NoFace,
            Ok(faces) => faces,
            Err(e) => return FrameOutcome::TransientError(e.to_string()),
        };
        let embeddings = match self.provider.embed(&small, &faces) {
            Ok(embeddings) => embeddings,
            Err(e) => return FrameOutcome::TransientError(e.to_string()),
        };
        if embeddings.len() != faces.len() {
            return FrameOutcome::TransientError(format!(
                "{} embeddings for {} faces",
                embeddings.len(),
                faces.len()
            ));
        }

        let inverse = 1.0 / scale;
        let mut recognized = Vec::with_capacity(faces.len());
        for (face, embedding) in faces.iter().zip(&embeddings) {
            let outcome = self.matcher.best_match(embedding, &self.identities);
            if let MatchOutcome::Known { name, distance } = &outcome {
                let now = self.clock.now();
                match self.attendance.record(name, now) {
                    MarkOutcome::Recorded { persisted } => tracing::info!(
                        %name,
                        distance = *distance,
                        at = %now.format("%Y-%m-%d %H:%M:%S"),
                        persisted,
                        "attendance marked"
                    ),
                    MarkOutcome::AlreadyPresent => {
                        tracing::trace!(%name, distance = *distance, "already marked today")
                    }
                }
            }

            let bbox = face.scaled(inverse);
            self.annotator.draw(frame, &bbox, outcome.label(), outcome.is_known());
            recognized.push(RecognizedFace { bbox, outcome });
        }
        FrameOutcome::Detected(recognized)
    }

    fn shut_down(&mut self, reason: StopReason) -> LoopState {
        self.reason.get_or_insert(reason);
        self.state = LoopState::ShuttingDown;
        self.state
    }
}

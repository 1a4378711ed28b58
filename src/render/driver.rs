use super::{AnimationRange, FrameStream, ImageFormat, RenderJob, RenderSubsystem, RenderedFrame};
use crate::error::RenderError;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps the render subsystem and checks what it hands back.
#[derive(Clone)]
pub struct SequenceRenderDriver {
    subsystem: Arc<dyn RenderSubsystem>,
    frame_name_padding: usize,
}

impl SequenceRenderDriver {
    pub fn new(subsystem: Arc<dyn RenderSubsystem>) -> Self {
        Self {
            subsystem,
            frame_name_padding: 6,
        }
    }

    pub fn with_frame_name_padding(mut self, padding: usize) -> Self {
        self.frame_name_padding = padding;
        self
    }

    pub fn subsystem_name(&self) -> &'static str {
        self.subsystem.name()
    }

    /// Submits the whole range and returns the lazy frame sequence.
    ///
    /// Each call renders from scratch; a sequence cannot be replayed.
    pub async fn render_range(
        &self,
        range: AnimationRange,
        output_dir: &Path,
        format: ImageFormat,
    ) -> Result<FrameSequence, RenderError> {
        debug!(
            "Submitting frames {}..{} to '{}' into {}",
            range.start,
            range.end,
            self.subsystem.name(),
            output_dir.display()
        );
        let stream = self
            .subsystem
            .submit_range(RenderJob {
                range,
                output_dir: output_dir.to_path_buf(),
                format,
                frame_name_padding: self.frame_name_padding,
            })
            .await?;
        Ok(FrameSequence::new(range, stream))
    }
}

/// Finite, non-restartable sequence of frame results for one pass.
///
/// Frames must arrive exactly once each, in frame order. Any error, gap or early end
/// terminates the sequence; no frame is retried.
pub struct FrameSequence {
    range: AnimationRange,
    stream: FrameStream,
    next_expected: i64,
    rendered: usize,
    finished: bool,
}

impl FrameSequence {
    fn new(range: AnimationRange, stream: FrameStream) -> Self {
        Self {
            range,
            stream,
            next_expected: range.start,
            rendered: 0,
            finished: false,
        }
    }

    pub async fn next_frame(&mut self) -> Option<Result<RenderedFrame, RenderError>> {
        if self.finished {
            return None;
        }
        if self.rendered == self.range.len() {
            self.finished = true;
            return None;
        }

        match self.stream.next().await {
            Some(Ok(frame)) => {
                if frame.frame_index != self.next_expected {
                    warn!(
                        "Render stream out of order: expected {}, got {}",
                        self.next_expected, frame.frame_index
                    );
                    self.finished = true;
                    return Some(Err(RenderError::OutOfOrder {
                        expected: self.next_expected,
                        actual: frame.frame_index,
                    }));
                }
                self.next_expected += 1;
                self.rendered += 1;
                Some(Ok(frame))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                Some(Err(RenderError::Incomplete {
                    rendered: self.rendered,
                    expected: self.range.len(),
                }))
            }
        }
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }

    pub fn expected(&self) -> usize {
        self.range.len()
    }

    /// The frame the next result is expected to carry.
    pub fn next_expected_frame(&self) -> i64 {
        self.next_expected
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

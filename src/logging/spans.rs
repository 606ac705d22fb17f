//! Spans for timing single operations and whole stack passes.

use std::time::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

use crate::data::AlignmentOffset;
use crate::error::DiffractionError;

/// Span around one call of a registration, symmetrization or reduction routine.
pub struct OperationSpan {
    span: Span,
    start_time: Instant,
}

impl OperationSpan {
    pub fn new(operation: &'static str, shape: (usize, usize)) -> Self {
        let span = match crate::logging::get_correlation_id() {
            Some(corr_id) => span!(
                Level::DEBUG,
                "operation",
                operation = operation,
                rows = shape.0,
                cols = shape.1,
                correlation_id = %corr_id,
                success = field::Empty,
                execution_time_ms = field::Empty,
            ),
            None => span!(
                Level::DEBUG,
                "operation",
                operation = operation,
                rows = shape.0,
                cols = shape.1,
                success = field::Empty,
                execution_time_ms = field::Empty,
            ),
        };

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn record_success(&self, description: &str) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.span.record("success", true);
        self.span.record("execution_time_ms", elapsed_ms);
        tracing::debug!(parent: &self.span, execution_time_ms = elapsed_ms, "{description}");
    }

    pub fn record_failure(&self, error: &DiffractionError) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.span.record("success", false);
        self.span.record("execution_time_ms", elapsed_ms);
        tracing::debug!(parent: &self.span, %error, "operation failed");
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span covering one pass of a stack aligner over its input sequence.
pub struct StackSpan {
    span: Span,
    start_time: Instant,
    run_id: Uuid,
}

impl StackSpan {
    pub fn new(mode: &'static str) -> Self {
        let run_id = crate::logging::get_correlation_id().unwrap_or_else(Uuid::new_v4);
        let span = span!(
            Level::INFO,
            "stack_alignment",
            mode = mode,
            run_id = %run_id,
            frames = field::Empty,
            skipped = field::Empty,
        );

        Self {
            span,
            start_time: Instant::now(),
            run_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_frame(&self, index: usize, offset: AlignmentOffset) {
        tracing::debug!(
            parent: &self.span,
            frame = index,
            offset_row = offset.row,
            offset_col = offset.col,
            "frame aligned"
        );
    }

    pub fn record_skip(&self, index: usize, error: &DiffractionError) {
        tracing::warn!(
            parent: &self.span,
            frame = index,
            %error,
            "frame left unshifted"
        );
    }

    pub fn record_abort(&self, index: usize, error: &DiffractionError) {
        tracing::error!(parent: &self.span, frame = index, %error, "stack alignment aborted");
    }

    pub fn record_completion(&self, frames: usize, skipped: usize) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.span.record("frames", frames);
        self.span.record("skipped", skipped);
        tracing::info!(
            parent: &self.span,
            frames,
            skipped,
            execution_time_ms = elapsed_ms,
            "stack alignment completed"
        );
    }
}

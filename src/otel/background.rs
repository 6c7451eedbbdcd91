//! Background job instrumentation — embedding indexing and review promotion
//! run off the request path and use `INTERNAL` span kind accordingly.

use tracing::{span, Level, Span};

#[derive(Debug, Clone, Copy)]
pub enum BackgroundJobType {
    /// Generating and mirroring an embedding for a newly-approved Example.
    EmbeddingIndex,
    /// Promoting a reviewed Example into the approved corpus.
    ReviewPromotion,
}

impl BackgroundJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingIndex => "embedding.index",
            Self::ReviewPromotion => "review.promote",
        }
    }
}

pub fn background_span(job_type: BackgroundJobType, target: &str) -> Span {
    span!(
        Level::INFO,
        "background.job",
        otel.name = format!("{} {}", job_type.as_str(), target),
        otel.kind = "internal",
        job.type = job_type.as_str(),
        job.target = target,
    )
}

pub fn record_background_metrics(batch_size: Option<usize>, duration_ms: Option<u64>, status: &str) {
    let span = Span::current();
    if let Some(size) = batch_size {
        span.record("job.batch_size", size);
    }
    if let Some(duration) = duration_ms {
        span.record("job.duration_ms", duration);
    }
    span.record("job.status", status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_names() {
        assert_eq!(BackgroundJobType::EmbeddingIndex.as_str(), "embedding.index");
        assert_eq!(BackgroundJobType::ReviewPromotion.as_str(), "review.promote");
    }
}

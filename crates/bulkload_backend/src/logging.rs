//! Per-engine structured logging.

use crate::error::BackendError;
use crate::identity::EngineUuid;
use std::time::{Duration, Instant};
use tracing::{Level, Span};

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level: Level = $level;
        if level == Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == Level::INFO {
            tracing::info!($($arg)+)
        } else if level == Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

/// Logger carrying the tag and identity of one engine.
#[derive(Debug, Clone)]
pub struct EngineLogger {
    tag: String,
    uuid: EngineUuid,
    span: Span,
}

impl EngineLogger {
    /// Creates a logger whose events carry `engine_tag` and `engine_uuid`.
    pub fn new(tag: impl Into<String>, uuid: EngineUuid) -> Self {
        let tag = tag.into();
        let span = tracing::info_span!("engine", engine_tag = %tag, engine_uuid = %uuid);
        Self { tag, uuid, span }
    }

    /// The engine tag, `"{table}:{engine_id}"` or a placeholder.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The engine identity.
    pub fn uuid(&self) -> EngineUuid {
        self.uuid
    }

    /// The span every event of this engine is recorded in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Logs `message` at INFO.
    pub fn info(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::info!("{message}");
    }

    /// Starts a timed task, logging its start at `level`.
    pub fn begin(&self, level: Level, name: &'static str) -> Task<'_> {
        self.begin_attempt(level, name, None)
    }

    /// Starts a timed task that is one attempt of a retry loop.
    pub fn begin_attempt(&self, level: Level, name: &'static str, retry: Option<u32>) -> Task<'_> {
        {
            let _entered = self.span.enter();
            match retry {
                Some(retry_cnt) => event_at!(level, retry_cnt, "{name} start"),
                None => event_at!(level, "{name} start"),
            }
        }
        Task {
            logger: self,
            name,
            retry,
            start: Instant::now(),
        }
    }
}

/// A timed operation started with [`EngineLogger::begin`].
#[derive(Debug)]
pub struct Task<'a> {
    logger: &'a EngineLogger,
    name: &'static str,
    retry: Option<u32>,
    start: Instant,
}

impl Task<'_> {
    /// Time since the task started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs a warning in the middle of the task.
    pub fn warn(&self, message: &str, err: &BackendError) {
        let _entered = self.logger.span.enter();
        tracing::warn!(
            task = self.name,
            retry_cnt = self.retry,
            error = %err,
            "{message}"
        );
    }

    /// Finishes a task that succeeded.
    pub fn done(self) {
        let _entered = self.logger.span.enter();
        tracing::info!(
            retry_cnt = self.retry,
            take_time = ?self.start.elapsed(),
            "{} completed",
            self.name
        );
    }

    /// Finishes the task: completion is logged at INFO, failure at
    /// `error_level`.
    pub fn end<T>(self, error_level: Level, result: &Result<T, BackendError>) {
        let err = match result {
            Ok(_) => return self.done(),
            Err(err) => err,
        };
        let _entered = self.logger.span.enter();
        event_at!(
            error_level,
            retry_cnt = self.retry,
            take_time = ?self.start.elapsed(),
            error = %err,
            "{} failed",
            self.name
        );
    }
}

//! Operations outside the normal engine sequence.
//!
//! Everything here trusts the caller's knowledge of engine state (usually
//! from checkpoints) and performs no validation. Reaching these operations
//! requires going through [`Backend::recovery`] explicitly.

use crate::backend::AbstractBackend;
use crate::context::Context;
use crate::engine::{ClosedEngine, EngineCore};
use crate::error::BackendResult;
use crate::facade::Backend;
use crate::identity::{make_uuid, EngineUuid};
use crate::logging::EngineLogger;
use std::sync::Arc;

/// Tag used in logs for engines force-imported by quota enforcement.
pub const IMPORT_AND_RESET_TAG: &str = "<import-and-reset>";

/// Recovery surface of a [`Backend`].
#[derive(Debug)]
pub struct EngineRecovery<'a, B: AbstractBackend> {
    backend: &'a Backend<B>,
}

impl<'a, B: AbstractBackend> EngineRecovery<'a, B> {
    pub(crate) fn new(backend: &'a Backend<B>) -> Self {
        Self { backend }
    }

    fn core(&self, tag: &str, uuid: EngineUuid) -> EngineCore<B> {
        EngineCore::new(
            Arc::clone(self.backend.inner()),
            EngineLogger::new(tag, uuid),
            uuid,
            self.backend.config().max_retry_times(),
        )
    }

    /// Imports the content of an engine and then resets it to empty, without
    /// closing it: the engine stays writable.
    ///
    /// The engine must have been flushed by the caller right before; disk
    /// quota enforcement calls [`Backend::flush_all`] first.
    ///
    /// # Errors
    ///
    /// Returns the import error (after retries) or the reset error.
    pub fn unsafe_import_and_reset(&self, ctx: &Context, uuid: EngineUuid) -> BackendResult<()> {
        // Never close here: the owner of the opened engine keeps writing to it.
        let engine = ClosedEngine::from_core(self.core(IMPORT_AND_RESET_TAG, uuid));
        engine.import(ctx)?;
        self.backend.inner().reset_engine(ctx, uuid)
    }

    /// Closes an engine that was not opened by this process.
    ///
    /// Only valid when the engine is known to be open, e.g. when resuming from
    /// a checkpoint. The engine counters are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the backend's close error.
    pub fn unsafe_close_engine(
        &self,
        ctx: &Context,
        table_name: &str,
        engine_id: i32,
    ) -> BackendResult<ClosedEngine<B>> {
        let (tag, uuid) = make_uuid(table_name, engine_id);
        self.unsafe_close_engine_with_uuid(ctx, &tag, uuid)
    }

    /// Same as [`EngineRecovery::unsafe_close_engine`], addressing the engine
    /// by identity.
    ///
    /// # Errors
    ///
    /// Returns the backend's close error.
    pub fn unsafe_close_engine_with_uuid(
        &self,
        ctx: &Context,
        tag: &str,
        uuid: EngineUuid,
    ) -> BackendResult<ClosedEngine<B>> {
        self.core(tag, uuid).unsafe_close(ctx)
    }
}

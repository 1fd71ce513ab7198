use std::{error::Error, fmt, sync::Arc};

use surrealdb::{Connection, Surreal};

use crate::clock::{Clock, SystemClock};
use crate::modules::ModuleLayout;
use crate::parsers::InterfaceParseError;
use crate::source::SourceError;
use crate::store::{InterfaceStore, StoreError, SurrealToolStore, ToolRegistry};

pub mod ingest;
pub mod status;
pub mod synthesis;
pub mod verify;

pub use ingest::{IngestReport, IngestRequest, SkippedHeading};
pub use status::{DeleteReport, DescriptorState, ToolStatus, reconcile};
pub use synthesis::{
    SynthesisFailure,
    SynthesisFailureKind,
    SynthesisOrchestrator,
    SynthesisReport,
};
pub use verify::{DEFAULT_KEEP_REPORTS, VerifyEntry, VerifyOptions, VerifyReport, VerifySummary};

#[derive(Debug)]
pub enum ControlError {
    /// The caller's request is malformed before any work starts.
    InvalidRequest(String),
    Store(StoreError),
    Source(SourceError),
    Parse(InterfaceParseError),
    Io(std::io::Error),
    Report(serde_json::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(message) => write!(f, "Invalid request: {message}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Source(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Report(err) => write!(f, "report serialization failed: {err}"),
        }
    }
}

impl Error for ControlError {}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<SourceError> for ControlError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

impl From<InterfaceParseError> for ControlError {
    fn from(err: InterfaceParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<std::io::Error> for ControlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Report(err)
    }
}

/// Entry point for ingestion, status and maintenance over one store and one
/// module directory.
pub struct ToolsmithControlPlane<C: Connection> {
    store: SurrealToolStore<C>,
    layout: ModuleLayout,
    clock: Arc<dyn Clock>,
}

impl<C: Connection> Clone for ToolsmithControlPlane<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            layout: self.layout.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<C: Connection> ToolsmithControlPlane<C> {
    #[must_use]
    pub fn new(db: Surreal<C>, layout: ModuleLayout) -> Self {
        Self::with_store(SurrealToolStore::new(db), layout)
    }

    #[must_use]
    pub fn from_arc(db: Arc<Surreal<C>>, layout: ModuleLayout) -> Self {
        Self::with_store(SurrealToolStore::from_arc(db), layout)
    }

    #[must_use]
    pub fn with_store(store: SurrealToolStore<C>, layout: ModuleLayout) -> Self {
        Self {
            store,
            layout,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &SurrealToolStore<C> {
        &self.store
    }

    #[must_use]
    pub fn interfaces(&self) -> InterfaceStore<C> {
        self.store.interfaces()
    }

    #[must_use]
    pub fn registry(&self) -> ToolRegistry<C> {
        self.store.registry()
    }

    #[must_use]
    pub const fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

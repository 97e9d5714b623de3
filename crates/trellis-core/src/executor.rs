//! Statement executor.
//!
//! Submits composed scripts to a graph store and makes sure the helper
//! library is available to them, either by inlining it ahead of every script
//! or, in lazy mode, by loading it into the session the first time a script
//! fails with the missing-helper signature and retrying once.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, trace, warn};
use trellis_config::{GraphBackend, LibraryStrategy, TrellisConfig};

use crate::graph::{
    EmbeddedGraphStore, GraphStore, GraphStoreError, PropertyMap, RestGraphStore,
};
use crate::statement::{compose, ComposedScript, StatementDef};

/// Helper library shipped with the crate.
pub const BUNDLED_HELPERS: &str = include_str!("../scripts/graph_helpers.groovy");

/// Helper library source: the bundled helpers plus any extra files.
#[derive(Debug, Clone)]
pub struct HelperLibrary {
    sources: Vec<String>,
}

impl Default for HelperLibrary {
    fn default() -> Self {
        Self::bundled()
    }
}

impl HelperLibrary {
    pub fn bundled() -> Self {
        Self {
            sources: vec![BUNDLED_HELPERS.to_string()],
        }
    }

    /// Bundled helpers followed by the contents of `paths`, in order.
    pub fn with_files(paths: &[PathBuf]) -> Result<Self, GraphStoreError> {
        let mut library = Self::bundled();
        for path in paths {
            let source = fs::read_to_string(path).map_err(|source| GraphStoreError::LibraryFile {
                path: path.clone(),
                source,
            })?;
            debug!("Loaded helper library file {}", path.display());
            library.sources.push(source);
        }
        Ok(library)
    }

    pub fn source(&self) -> String {
        self.sources.join("\n")
    }
}

/// Runs statement lists against a graph store.
pub struct StatementExecutor {
    store: Box<dyn GraphStore>,
    library: HelperLibrary,
    strategy: LibraryStrategy,
    transactional: bool,
}

impl StatementExecutor {
    pub fn new(
        store: Box<dyn GraphStore>,
        library: HelperLibrary,
        strategy: LibraryStrategy,
        transactional: bool,
    ) -> Self {
        Self {
            store,
            library,
            strategy,
            transactional,
        }
    }

    /// Inline-library, transactional executor over `store`.
    pub fn with_store(store: Box<dyn GraphStore>) -> Self {
        Self::new(store, HelperLibrary::bundled(), LibraryStrategy::Inline, true)
    }

    /// Build the configured backend. Relative library paths resolve against `root`.
    pub fn from_config(config: &TrellisConfig, root: &Path) -> Result<Self, GraphStoreError> {
        let graph = &config.graph;
        let store: Box<dyn GraphStore> = match graph.backend {
            GraphBackend::Embedded => Box::new(EmbeddedGraphStore::new()),
            GraphBackend::Rest => Box::new(RestGraphStore::new(&graph.endpoint, graph.timeout_secs)?),
        };
        let library = HelperLibrary::with_files(&config.library_paths(root))?;
        debug!(
            "Graph executor: backend={}, strategy={:?}, transactional={}",
            graph.backend, graph.library_strategy, graph.transactional
        );
        Ok(Self::new(store, library, graph.library_strategy, graph.transactional))
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn strategy(&self) -> LibraryStrategy {
        self.strategy
    }

    /// Compose `defs` (atomically unless disabled in config) and run them.
    ///
    /// Returns one value per statement.
    pub fn run(&self, defs: &[StatementDef]) -> Result<Vec<Value>, GraphStoreError> {
        self.run_composed(compose(defs, self.transactional))
    }

    /// Compose `defs` without the atomic block and run them.
    pub fn run_unwrapped(&self, defs: &[StatementDef]) -> Result<Vec<Value>, GraphStoreError> {
        self.run_composed(compose(defs, false))
    }

    /// Run a single read-only statement and return its value.
    pub fn query_one(&self, def: StatementDef) -> Result<Value, GraphStoreError> {
        let mut values = self.run_unwrapped(&[def])?;
        values
            .pop()
            .ok_or_else(|| GraphStoreError::UnexpectedResponse("empty result list".to_string()))
    }

    fn run_composed(&self, composed: ComposedScript) -> Result<Vec<Value>, GraphStoreError> {
        let ComposedScript { script, params } = match self.strategy {
            LibraryStrategy::Inline => composed.with_preamble(&self.library.source()),
            LibraryStrategy::Lazy => composed,
        };
        trace!("Script:\n{}", script);
        match self.execute(&script, &params)? {
            Value::Array(values) => Ok(values),
            other => Err(GraphStoreError::UnexpectedResponse(other.to_string())),
        }
    }

    /// Submit a script; in lazy mode, load the library and retry once if the
    /// helpers are missing.
    pub fn execute(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError> {
        match self.store.submit_script(script, params) {
            Err(e) if e.is_missing_helper() && self.strategy == LibraryStrategy::Lazy => {
                warn!("Graph helpers missing from session, loading library and retrying");
                self.load_library()?;
                self.store.submit_script(script, params)
            }
            result => result,
        }
    }

    /// Load the helper library into the store's script session.
    pub fn load_library(&self) -> Result<(), GraphStoreError> {
        self.store
            .submit_script(&self.library.source(), &PropertyMap::new())?;
        debug!("Helper library loaded");
        Ok(())
    }
}

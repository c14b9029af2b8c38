//! Dependency-injection container for driver operations.
//!
//! Bundles the collaborator handles (service backend, filesystem, source
//! cloner) with the recorded-state store, so driver operations stay fully
//! unit-testable with mock collaborators.

use std::path::PathBuf;

use crate::backend::ServiceBackend;
use crate::fsops::FsOps;
use crate::source::SourceCloner;
use crate::state::StateStore;

pub struct DriverContext<'a> {
    backend: &'a dyn ServiceBackend,
    fs: &'a dyn FsOps,
    cloner: &'a dyn SourceCloner,
    state: StateStore,
}

impl<'a> DriverContext<'a> {
    pub fn new(
        backend: &'a dyn ServiceBackend,
        fs: &'a dyn FsOps,
        cloner: &'a dyn SourceCloner,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            backend,
            fs,
            cloner,
            state: StateStore::new(state_dir),
        }
    }

    pub fn backend(&self) -> &'a dyn ServiceBackend {
        self.backend
    }

    pub fn fs(&self) -> &'a dyn FsOps {
        self.fs
    }

    pub fn cloner(&self) -> &'a dyn SourceCloner {
        self.cloner
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }
}

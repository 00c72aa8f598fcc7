//! Built-in capability providers and the backend traits they delegate to.

pub mod browser;
pub mod search;
pub mod selfmod;
pub mod solver;

pub use browser::{
    BrowserActionProvider, BrowserBackend, BrowserCommand, BrowserError, InteractionProfile,
};
pub use search::{BrowserSearchBackend, DuckDuckGoBackend, SearchBackend, SearchError, SearchProvider};
pub use selfmod::{ApplyError, ChangeApplier, ChangePlan, SelfModifyProvider};
pub use solver::{HttpSolverClient, SolverClient, SolverError, SolverResponse};

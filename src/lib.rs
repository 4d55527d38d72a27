//! ku-return-helper: bulk return of Kindle Unlimited loans
//!
//! Components:
//! - page: classify the loaded page and resolve its CSRF token
//! - api: loaned-items query and loan return commands
//! - augment: inject and keep in sync the return controls
//! - orchestrator: submit returns, then poll until the platform catches up
//! - agent: ties the above to a live document and its mutations

pub mod agent;
pub mod api;
pub mod augment;
pub mod config;
pub mod dom;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod page;
pub mod token;

pub use agent::Agent;
pub use api::{ApiClient, LoanSnapshot, LoanedItem, ReturnResponse};
pub use config::AgentConfig;
pub use dom::Document;
pub use error::{AgentError, ApiError};
pub use host::HostShell;
pub use orchestrator::{Confirmation, ReturnOrchestrator, ReturnOutcome, ReturnReport};
pub use page::{PageContext, PageKind};

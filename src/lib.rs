pub mod action;
pub mod config;
pub mod event;
pub mod github;
pub mod labels;
pub mod rules;
pub mod template;

pub use config::Config;
pub use event::{EventPayload, ResourceContext, ResourceKind};
pub use github::{GitHubClient, IssueOps, IssueState};
pub use rules::{ActionSet, OneOrMany, RuleSet};

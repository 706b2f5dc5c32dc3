//! Scenario tooling for the NFT option sellers vault.

pub mod scenario;

pub use scenario::{account, run, Scenario, ScenarioError, ScenarioReport};

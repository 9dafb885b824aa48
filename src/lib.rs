pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod fileset;
pub mod generator;
pub mod git;
pub mod github;
pub mod runner;

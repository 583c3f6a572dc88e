pub mod catalog;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod generator;
pub mod optim;
pub mod plan;
pub mod profile;
pub mod risk;

// repo-gallery - offline-first photo gallery for images hosted in a repository
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gallery;
pub mod listing;
pub mod metrics;
pub mod server;
pub mod utils;
pub mod worker;

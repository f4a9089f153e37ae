pub mod analysis;
pub mod commands;
pub mod config;
pub mod db;
pub mod jobs;
pub mod security;

//! # Boot media seeding
//!
//! This crate renders the cloud-init templates that provision a
//! single-board computer on first boot. Values come from an environment
//! file and the process environment, an SSH public key is located and
//! validated, and the rendered files are written onto the boot medium.

pub mod cli;
mod env_file;
pub mod error;
pub mod generate;
pub mod metadata;
pub mod render;
pub mod ssh_key;
pub mod template;
pub mod variables;

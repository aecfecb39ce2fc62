//! Lifecycle management for a cloud-hosted Solana validator.
//!
//! `valdeploy` provisions a validator instance with Terraform, starts, stops
//! and destroys it through the AWS CLI, and supervises the validator service
//! over SSH. Every state-changing command is reconciled against a fresh probe
//! of the live instance, so re-running a command is always safe: redundant
//! requests become no-ops and stale records are detected instead of trusted.
//!
//! # Architecture
//!
//! A local JSON record declares what was deployed. The reconciler compares it
//! with the provider's answer, decides on a transition, discloses the cost and
//! asks for confirmation, and only then invokes the external tool. The record
//! is updated after the tool reports success, never before.
//!
//! # Modules
//!
//! - [`api`]: Orchestration entry points used by the CLI
//! - [`cloud`]: Live instance probe over the AWS CLI
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`cost`]: Hourly rates, uptime and cost estimates
//! - [`error`]: Semantic error types for the application
//! - [`gate`]: Confirmation prompts with cost disclosure
//! - [`keys`]: Validator key generation and funding
//! - [`process`]: External command execution and prerequisite checks
//! - [`provision`]: Terraform invocation
//! - [`reconcile`]: Lifecycle planning and execution
//! - [`remote`]: SSH execution and validator service supervision
//! - [`retry`]: Bounded backoff, polling and cancellation
//! - [`state`]: The declarative deployment record

pub mod api;
pub mod cloud;
pub mod config;
pub mod cost;
pub mod error;
pub mod gate;
pub mod keys;
pub mod process;
pub mod provision;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod state;

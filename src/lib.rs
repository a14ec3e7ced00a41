// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Mocks and assertions in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # awsform
//!
//! Declarative AWS resources on top of eventual-consistency retry and
//! state-wait machinery.
//!
//! ## Overview
//!
//! AWS APIs are eventually consistent: a resource that was just created may
//! not be visible yet, a dependency may still be propagating, and most
//! operations finish asynchronously. awsform wraps each resource in CRUD
//! functions that:
//!
//! - Retry calls that fail with known transient error codes or messages
//! - Wait for a resource to reach a target state with [`retry::StateChangeConf`]
//! - Tolerate "not found" right after creation, and drop resources from
//!   state when they disappear later
//! - Make one final attempt when a retry loop times out before any attempt
//!   could finish
//!
//! ## Modules
//!
//! - [`retry`]: State-change poller and retry helpers
//! - [`provider`]: Resource data, timeouts, composite IDs and the registry
//! - [`services`]: S3 bucket, EBS volume, RDS cluster instance and EKS add-on
//! - [`aws`]: SDK client loading and error classification
//! - [`config`]: Provider settings and resource documents
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! type: aws_ebs_volume
//! attributes:
//!   availability_zone: us-west-2a
//!   size: 40
//!   type: gp3
//!   tags:
//!     Name: data
//! timeouts:
//!   create: 10m
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod aws;
pub mod cli;
pub mod config;
pub mod error;
pub mod provider;
pub mod retry;
pub mod services;

// ============================================================================
// Re-exports
// ============================================================================

pub use aws::{AwsApiError, AwsClients};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ProviderConfig, ResourceDocument};
pub use error::{AwsformError, Result};
pub use provider::{DataSource, Provider, Resource, ResourceData, ResourceState};
pub use retry::StateChangeConf;

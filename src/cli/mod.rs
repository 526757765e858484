//! # CLI Module
//!
//! The `brrtcore` binary serves a list of echo routes through the full
//! dispatch core, which is handy for trying chain configurations and CORS
//! settings without writing handlers.
//!
//! ```bash
//! # serve routes.yaml on the configured address
//! brrtcore serve --config app.yaml --routes routes.yaml
//!
//! # override the bind address
//! brrtcore serve --routes routes.yaml --addr 0.0.0.0:9000
//!
//! # print the route table
//! brrtcore routes --routes routes.yaml
//! ```
//!
//! See [`crate::echo`] for the routes file format and [`crate::config`] for
//! the configuration file.

mod commands;


pub use commands::{build_application, format_routes, run_cli, Cli, Commands};

//! matcharr - sports EPG matching and lifecycle engine
//!
//! Fuses three data worlds into one channel lineup:
//! - heterogeneous M3U stream listings served by Dispatcharr
//! - authoritative sports schedules from ESPN / TheSportsDB
//! - the downstream channel manager that consumes concrete channels and XMLTV
//!
//! The matching pipeline (normalize -> classify -> match -> expand -> lifecycle)
//! lives under `matching` and `services`; `scheduler` drives it periodically.

pub mod assets;
pub mod config;
pub mod database;
pub mod dispatcharr;
pub mod errors;
pub mod matching;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod web;

//! # supers
//!
//! A small process supervisor. The daemon reads `*.service` unit files from
//! one directory, keeps the declared services running through [`warden`], and
//! answers one-line requests on a Unix socket (`list`, `status`, `start`,
//! `stop`, `restart`, `reload`). An optional HTTP surface drives the same
//! [`control::Controller`].

pub mod config;
pub mod control;
pub mod daemon;
pub mod protocol;
pub mod reconcile;
pub mod units;
pub mod webhook;

pub const APP_NAME: &str = "supers";

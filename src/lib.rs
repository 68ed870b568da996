pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod logging;
pub mod persist;
pub mod scroll;
pub mod selection;
pub mod session;
pub mod transcript;
pub mod ui;

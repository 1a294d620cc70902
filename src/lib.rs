//! Task list core: a store adapter over a durable key-value slot, the
//! repository that owns the list and its edit session, and the view that
//! filters it for display. `ui` draws any number of views in a terminal.

pub mod app;
pub mod config;
pub mod domain;
pub mod edit;
pub mod kv;
pub mod repo;
pub mod store;
pub mod ui;
pub mod usecase;
pub mod view;

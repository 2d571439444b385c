// Client library - exposes all core modules for the binary and tests

rust_i18n::i18n!("locales", fallback = "en");

pub mod app;
pub mod config;
pub mod file_tree;
pub mod model;
pub mod primitives;
pub mod services;

pub mod app;
pub mod catalog;
pub mod category;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod integrity;
pub mod output;
pub mod reconcile;
pub mod sanitize;
pub mod storage;
pub mod transfer;

pub mod bayer;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod domain;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod labels;
pub mod ledger;
pub mod output;
pub mod reconcile;
pub mod store;

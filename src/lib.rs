#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod consolidated;
mod error;
pub mod groups;
pub mod metric;
pub mod money;
pub mod output;
pub mod pipeline;
pub mod rank;
pub mod report;
pub mod source;
pub mod summary;

pub use classify::Identity;
pub use config::{Config, NegativeTonnage};
pub use consolidated::Consolidated;
pub use error::{Error, Result};
pub use groups::GroupRegistry;
pub use metric::Metric;
pub use money::Money;
pub use pipeline::{MetricReport, Period, Pipeline};
pub use report::{render, Renderer, TextRenderer};
pub use source::{Cell, ProductCode, Table, Transaction};
pub use summary::Summary;

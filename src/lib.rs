//! Regional industrial dashboard
//!
//! Report generation with streamed LLM output, WeChat article analysis,
//! POI search on Baidu/Google maps and Plotly dashboards, served over axum.
//! Maintenance tools (report repair, file patching, scripted UI demos) share
//! the same library.

pub mod analysis;
pub mod api;
pub mod cache;
pub mod charts;
pub mod config;
pub mod db;
pub mod demo;
pub mod llm;
pub mod maps;
pub mod models;
pub mod patch;
pub mod services;
pub mod templates;

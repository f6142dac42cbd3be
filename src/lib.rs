//! Funding Rate Forecaster
//!
//! Forecasts the next hourly funding payment of a perpetual future from its
//! own funding history and price candles.
//!
//! ## Architecture
//!
//! ```text
//! Provider (funding, candles) → Aligner → FeatureBuilder → DatasetPreparer
//!                                                              ↓
//!        Dashboard / CLI ← PredictionService ← Artifact ← EnsembleTrainer
//!                ↑
//!        AccuracyTracker (prediction log vs realized funding)
//! ```

pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod monitor;
pub mod service;
pub mod tracker;
pub mod types;

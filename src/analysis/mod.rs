//! Aggregation and metrics engine.
//!
//! Every statistic consumed by reports and exports is derived here as a
//! pure function over the canonical participant set.

mod aggregator;

pub use aggregator::{
    comprehension_scatter, efficiency_points, group_stats, improvement_scatter, overall_stats,
    quartile_summary, score_histogram, EfficiencyPoint, GroupQuartiles, GroupStats, OverallStats,
    ScatterSeries, ScoreHistogram,
};

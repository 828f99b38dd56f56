pub mod coalesce;
pub mod enrichment;
pub mod interactions;
pub mod providers;
pub mod recommendations;
pub mod title_search;
pub mod view;

pub mod composer;
pub mod diversity;
pub mod geo;
pub mod graph;
pub mod history;
pub mod interactions;
pub mod pagination;
pub mod scoring;
pub mod trending;

pub use composer::FeedComposer;
pub use diversity::{DiversityLayer, DiversityState};
pub use graph::GraphResolver;
pub use history::ProfileHistory;
pub use interactions::InteractionTracker;
pub use scoring::{FeedScorer, GlobalScorer, LocalScorer, NetworkScorer};
pub use trending::TrendingService;

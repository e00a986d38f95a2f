pub mod error;
pub mod market;
pub mod traits;
pub mod types;

pub use error::FlipError;
pub use market::{Listing, ListingReceipt, ListingRequest, Order, PayoutStats};
pub use traits::{EngineStats, MarketApi, OpportunityEngine, OpportunitySource};
pub use types::{
    JobDescriptor, JobKind, JobRunState, JobStatus, Opportunity, OpportunityStatus, ScanParams,
    ScanParamsPatch, SchedulerConfig,
};

pub mod fetch; // Bounded download pool with watermark early stop
pub mod http; // Transport seam (reqwest in production, stubs in tests)
pub mod listing; // Pagination discovery + report anchor extraction

pub use fetch::{FetchCoordinator, FetchOutcome};
pub use http::{HttpSource, ReqwestSource};
pub use listing::ListingClient;

pub mod recommendation_queue;

pub use recommendation_queue::{
    ClaimedJob, JobHandle, JobQueue, JobResult, JobRetention, JobStatus, JobStatusView,
    RecommendationJob, SharedJobQueue,
};

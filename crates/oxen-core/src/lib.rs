mod job;
mod retry;
mod work;

pub use job::{EnqueueOutcome, Job, JobStatus, NewJob};
pub use retry::{classify, WorkOutcome, RETRY_SENTINEL_KEY};
pub use work::{JobView, NoopErrorCallback, NoopSuccessCallback, OnJobError, OnJobSuccess, WorkFn};

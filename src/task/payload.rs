use futures::future::BoxFuture;
use serde_json::Value;

use super::progress::ProgressReporter;

/// What a work function produces: a JSON-serializable result, or the error
/// that the scheduler captures onto the task record.
pub type WorkOutput = anyhow::Result<Value>;

/// Boxed future returned by a work function
pub type WorkFuture = BoxFuture<'static, WorkOutput>;

/// Uniform work-function signature: the scheduler never needs to know what
/// kind of work it is dispatching. The reporter is the only channel back to
/// the task record during execution.
pub type WorkFn = Box<dyn FnOnce(ProgressReporter) -> WorkFuture + Send + 'static>;

/// Wrap a closure into the boxed work-function type accepted by `submit`
pub fn work_fn<F>(f: F) -> WorkFn
where
    F: FnOnce(ProgressReporter) -> WorkFuture + Send + 'static,
{
    Box::new(f)
}

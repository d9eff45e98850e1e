use std::sync::Arc;

use async_trait::async_trait;

use super::{EngineBridge, EngineRequest, EngineResponse};
use crate::error::EngineError;

/// Bridge around a synchronous, in-process engine executor.
///
/// Each call runs on Tokio's blocking pool so a slow engine never stalls the
/// async workers. A panic inside the executor surfaces as
/// [`EngineError::Failed`].
pub struct BlockingEngineBridge<F> {
    executor: Arc<F>,
}

impl<F> BlockingEngineBridge<F>
where
    F: Fn(EngineRequest) -> Result<EngineResponse, EngineError> + Send + Sync + 'static,
{
    pub fn new(executor: F) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }
}

#[async_trait]
impl<F> EngineBridge for BlockingEngineBridge<F>
where
    F: Fn(EngineRequest) -> Result<EngineResponse, EngineError> + Send + Sync + 'static,
{
    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || executor(request))
            .await
            .map_err(|e| EngineError::failed(format!("Engine executor aborted: {e}")))?
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[tokio::test]
    async fn test_runs_executor() {
        let bridge = BlockingEngineBridge::new(|request: EngineRequest| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(EngineResponse::new(StatusCode::OK, format!("echo {}", request.path)))
        });

        let response = bridge.execute(EngineRequest::get("/node/1")).await.unwrap();
        assert_eq!(&response.body[..], b"echo /node/1");
    }

    #[tokio::test]
    async fn test_executor_error_and_panic() {
        let failing = BlockingEngineBridge::new(|_: EngineRequest| {
            Err(EngineError::unreachable("engine crashed"))
        });
        assert!(matches!(
            failing.execute(EngineRequest::get("/")).await,
            Err(EngineError::Unreachable(_))
        ));

        let panicking = BlockingEngineBridge::new(|_: EngineRequest| -> Result<EngineResponse, EngineError> {
            panic!("engine threw")
        });
        assert!(matches!(
            panicking.execute(EngineRequest::get("/")).await,
            Err(EngineError::Failed(_))
        ));
    }
}

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Owner of a spawned background loop.
///
/// Dropping the handle cancels the loop; `shutdown` also waits for it to exit.
pub struct TaskHandle {
    name: &'static str,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub(crate) fn new(name: &'static str, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            name,
            cancel,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            warn!(task = self.name, error = %err, "background task ended abnormally");
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::TaskHandle;
    use tokio_util::sync::CancellationToken;

    fn spawn_waiting(name: &'static str) -> TaskHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            token.cancelled().await;
        });
        TaskHandle::new(name, cancel, join)
    }

    #[tokio::test]
    async fn drop_cancels_task() {
        let handle = spawn_waiting("waiting");
        let token = handle.cancellation_token();
        assert!(!token.is_cancelled());

        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_waits_for_task() {
        let handle = spawn_waiting("waiting");
        let token = handle.cancellation_token();
        assert_eq!(handle.name(), "waiting");

        handle.shutdown().await;
        assert!(token.is_cancelled());
    }
}

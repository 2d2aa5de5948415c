//! The discovery loop

use std::fmt;
use std::future::Future;

use badgeflash_dispatch::{Dispatcher, Outcome};
use badgeflash_watch::{DeviceSource, WatchError};
use tokio::task::JoinHandle;

/// Tally of how devices ended up
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub flashed: usize,
    pub advised: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Flashed => self.flashed += 1,
            Outcome::Advised => self.advised += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flashed, {} failed, {} needed attention, {} ignored",
            self.flashed, self.failed, self.advised, self.ignored
        )
    }
}

/// Hands every discovered device to the dispatcher
pub struct Daemon {
    dispatcher: Dispatcher,
    workers: Vec<JoinHandle<Outcome>>,
    summary: Summary,
}

impl Daemon {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            workers: Vec::new(),
            summary: Summary::default(),
        }
    }

    /// Dispatch devices from `source` until `shutdown` completes
    ///
    /// Workers keep running after this returns, including when the source
    /// fails.
    pub async fn run<S, F>(&mut self, source: &mut S, shutdown: F) -> Result<(), WatchError>
    where
        S: DeviceSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    log::debug!("Stopping device discovery");
                    return Ok(());
                }
                props = source.next_device() => {
                    let props = props?;
                    log::debug!("USB serial device at {:?}", props.devname());
                    self.workers.extend(self.dispatcher.dispatch(props));
                    self.reap().await;
                }
            }
        }
    }

    /// Workers still running
    pub fn active(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Wait for every worker to finish
    pub async fn finish(mut self) -> Summary {
        for worker in self.workers.drain(..) {
            record(&mut self.summary, worker.await);
        }
        self.summary
    }

    /// Collect workers that are already done
    async fn reap(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.workers.drain(..).partition(|w| w.is_finished());
        self.workers = running;
        for worker in done {
            record(&mut self.summary, worker.await);
        }
    }
}

fn record(summary: &mut Summary, result: Result<Outcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => summary.record(&outcome),
        Err(e) => {
            log::error!("Flashing worker failed: {}", e);
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use badgeflash_core::{DeviceEvent, DeviceProperties};
    use badgeflash_dispatch::{Handler, HandlerKind, HandlerRegistry};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{oneshot, Semaphore};

    /// Yields a fixed list, then either fails or waits forever
    struct Scripted {
        devices: VecDeque<DeviceProperties>,
        fail_when_empty: bool,
    }

    #[async_trait]
    impl DeviceSource for Scripted {
        async fn next_device(&mut self) -> badgeflash_watch::Result<DeviceProperties> {
            match self.devices.pop_front() {
                Some(props) => Ok(props),
                None if self.fail_when_empty => Err(WatchError::Closed),
                None => std::future::pending().await,
            }
        }
    }

    struct Held(Arc<Semaphore>);

    #[async_trait]
    impl Handler for Held {
        fn kind(&self) -> HandlerKind {
            HandlerKind::ExternalProcessFlash
        }

        async fn handle(&self, _event: DeviceEvent) -> Outcome {
            match self.0.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    Outcome::Flashed
                }
                Err(_) => Outcome::Ignored,
            }
        }
    }

    fn device(vid: &str, pid: &str, devname: &str) -> DeviceProperties {
        DeviceProperties::new()
            .with("ID_BUS", "usb")
            .with("ID_VENDOR_ID", vid)
            .with("ID_MODEL_ID", pid)
            .with("DEVNAME", devname)
    }

    fn scripted(devices: Vec<DeviceProperties>, fail_when_empty: bool) -> Scripted {
        Scripted {
            devices: devices.into(),
            fail_when_empty,
        }
    }

    #[tokio::test]
    async fn test_waits_for_workers_after_shutdown() {
        let gate = Arc::new(Semaphore::new(0));
        let registry = HandlerRegistry::builder()
            .register(0x2341, 0x004f, Held(Arc::clone(&gate)))
            .build();
        let mut daemon = Daemon::new(Dispatcher::new(registry));
        let mut source = scripted(
            vec![
                device("2341", "004f", "/dev/ttyACM0"),
                device("2341", "004f", "/dev/ttyACM1"),
                device("1234", "5678", "/dev/ttyUSB3"),
                DeviceProperties::new().with("DEVNAME", "/dev/ttyS0"),
            ],
            false,
        );

        let (stop, stopped) = oneshot::channel::<()>();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stopped.await;
        };
        stop.send(()).unwrap();

        daemon.run(&mut source, shutdown).await.unwrap();
        assert!(source.devices.is_empty());
        assert_eq!(daemon.active(), 2);

        gate.add_permits(2);
        let summary = daemon.finish().await;
        assert_eq!(summary.flashed, 2);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_source_failure_is_returned() {
        let registry = HandlerRegistry::builder().build();
        let mut daemon = Daemon::new(Dispatcher::new(registry));
        let mut source = scripted(vec![device("1234", "5678", "/dev/ttyUSB0")], true);

        let err = daemon
            .run(&mut source, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Closed));

        let summary = daemon.finish().await;
        assert_eq!(summary.ignored, 1);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = Summary::default();
        summary.record(&Outcome::Flashed);
        summary.record(&Outcome::Advised);
        summary.record(&Outcome::Skipped);
        assert_eq!(
            summary.to_string(),
            "1 flashed, 0 failed, 1 needed attention, 0 ignored"
        );
    }
}

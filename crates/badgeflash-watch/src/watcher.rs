//! USB serial hotplug watcher

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use badgeflash_core::DeviceProperties;
use futures::StreamExt;
use nusb::hotplug::{HotplugEvent, HotplugWatch};
use tokio::sync::mpsc;

use crate::error::{Result, WatchError};
use crate::ports::{matches_ids, scan_usb_serial, PortTracker};

/// Delay between serial port scans after a USB connect notification
pub const SETTLE_DELAY: Duration = Duration::from_millis(250);
/// Scans made after a USB connect notification before giving up on it
pub const SETTLE_ATTEMPTS: u32 = 8;

/// A never-ending source of USB serial devices
#[async_trait]
pub trait DeviceSource: Send {
    /// Wait for the next device
    ///
    /// An error means the source is broken and will yield nothing more.
    async fn next_device(&mut self) -> Result<DeviceProperties>;
}

/// Watches for USB serial devices
///
/// Yields every USB serial port already attached when it starts, then each
/// port that appears after a USB connect notification. Removals and
/// non-USB ports are never yielded.
pub struct UsbSerialWatcher {
    hotplug: HotplugWatch,
    tracker: PortTracker,
    pending: VecDeque<DeviceProperties>,
    scans_tx: mpsc::UnboundedSender<Vec<DeviceProperties>>,
    scans_rx: mpsc::UnboundedReceiver<Vec<DeviceProperties>>,
    settle_delay: Duration,
    settle_attempts: u32,
}

impl UsbSerialWatcher {
    /// Start watching
    pub fn start() -> Result<Self> {
        // Subscribe before listing so nothing attached in between is lost
        let hotplug = nusb::watch_devices()?;

        let mut tracker = PortTracker::default();
        let pending: VecDeque<_> = tracker.admit(scan_usb_serial()?).into();
        log::debug!(
            "Found {} USB serial device(s) already attached",
            pending.len()
        );

        let (scans_tx, scans_rx) = mpsc::unbounded_channel();
        Ok(Self {
            hotplug,
            tracker,
            pending,
            scans_tx,
            scans_rx,
            settle_delay: SETTLE_DELAY,
            settle_attempts: SETTLE_ATTEMPTS,
        })
    }

    /// Look for the ports of a freshly connected device without holding up
    /// notifications for other devices
    fn spawn_settle(&self, vid: u16, pid: u16) {
        let scans = self.scans_tx.clone();
        let (delay, attempts) = (self.settle_delay, self.settle_attempts);
        tokio::spawn(async move {
            if let Err(e) = settle(scan_usb_serial, vid, pid, delay, attempts, scans).await {
                log::warn!("Unable to list ports of {:04x}:{:04x}: {}", vid, pid, e);
            }
        });
    }
}

/// Scan for the ports of the USB device `vid:pid` until they stop changing
///
/// The tty nodes show up a little after the USB device itself, so keep
/// scanning until they appear and then once more for any sibling
/// interfaces. Every scan that found ports is sent on `scans`.
async fn settle<S>(
    mut scan: S,
    vid: u16,
    pid: u16,
    delay: Duration,
    attempts: u32,
    scans: mpsc::UnboundedSender<Vec<DeviceProperties>>,
) -> Result<()>
where
    S: FnMut() -> Result<Vec<DeviceProperties>>,
{
    let mut previous: Option<Vec<DeviceProperties>> = None;

    for _ in 0..attempts {
        let matching: Vec<_> = scan()?
            .into_iter()
            .filter(|props| matches_ids(props, vid, pid))
            .collect();

        if !matching.is_empty() {
            if previous.as_ref() == Some(&matching) {
                return Ok(());
            }
            if scans.send(matching.clone()).is_err() {
                // Watcher is gone
                return Ok(());
            }
            previous = Some(matching);
        }

        tokio::time::sleep(delay).await;
    }

    if previous.is_none() {
        log::debug!("Ignoring non-serial USB device {:04x}:{:04x}", vid, pid);
    }
    Ok(())
}

#[async_trait]
impl DeviceSource for UsbSerialWatcher {
    async fn next_device(&mut self) -> Result<DeviceProperties> {
        loop {
            if let Some(props) = self.pending.pop_front() {
                return Ok(props);
            }

            tokio::select! {
                event = self.hotplug.next() => match event {
                    Some(HotplugEvent::Connected(info)) => {
                        log::debug!(
                            "USB device {:04x}:{:04x} connected",
                            info.vendor_id(),
                            info.product_id()
                        );
                        self.spawn_settle(info.vendor_id(), info.product_id());
                    }
                    Some(HotplugEvent::Disconnected(_)) => {
                        log::debug!("Ignoring removed USB device");
                        self.tracker.retain_present(&scan_usb_serial()?);
                    }
                    None => return Err(WatchError::Closed),
                },
                Some(scan) = self.scans_rx.recv() => {
                    let fresh = self.tracker.admit(scan);
                    self.pending.extend(fresh);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use badgeflash_core::event::keys;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(1);

    fn port(path: &str, vid: &str, pid: &str) -> DeviceProperties {
        DeviceProperties::new()
            .with(keys::DEVNAME, path)
            .with(keys::VENDOR_ID, vid)
            .with(keys::MODEL_ID, pid)
    }

    /// Replays `scans` in order, then keeps answering with the last one
    fn scripted(scans: Vec<Vec<DeviceProperties>>) -> impl FnMut() -> Result<Vec<DeviceProperties>> {
        let mut scans: VecDeque<_> = scans.into();
        let mut last = Vec::new();
        move || {
            if let Some(scan) = scans.pop_front() {
                last = scan;
            }
            Ok(last.clone())
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<DeviceProperties>>) -> Vec<Vec<DeviceProperties>> {
        let mut sent = Vec::new();
        while let Ok(scan) = rx.try_recv() {
            sent.push(scan);
        }
        sent
    }

    #[tokio::test]
    async fn test_settle_waits_for_tty_and_siblings() {
        let if0 = port("/dev/ttyUSB0", "10c4", "ea70");
        let if1 = port("/dev/ttyUSB1", "10c4", "ea70");
        let keyboard = port("/dev/ttyS0", "046d", "c31c");
        let scan = scripted(vec![
            vec![keyboard.clone()],
            vec![keyboard.clone(), if0.clone()],
            vec![if0.clone(), if1.clone()],
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        settle(scan, 0x10c4, 0xea70, TICK, SETTLE_ATTEMPTS, tx)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![vec![if0.clone()], vec![if0, if1]]
        );
    }

    #[tokio::test]
    async fn test_settle_gives_up_on_non_serial_device() {
        let mut calls = 0;
        let scan = || {
            calls += 1;
            Ok(Vec::new())
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        settle(scan, 0x046d, 0xc52b, TICK, SETTLE_ATTEMPTS, tx)
            .await
            .unwrap();

        assert_eq!(calls, SETTLE_ATTEMPTS);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_settle_runs_beside_other_work() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slow = tokio::spawn(settle(
            || Ok(Vec::new()),
            0x046d,
            0xc52b,
            Duration::from_millis(200),
            SETTLE_ATTEMPTS,
            tx.clone(),
        ));

        // A port found by a second settle arrives long before the first ends
        let start = Instant::now();
        let mkr = port("/dev/ttyACM0", "2341", "004f");
        tokio::spawn(settle(
            scripted(vec![vec![mkr.clone()]]),
            0x2341,
            0x004f,
            TICK,
            SETTLE_ATTEMPTS,
            tx,
        ));
        assert_eq!(rx.recv().await, Some(vec![mkr]));
        assert!(start.elapsed() < Duration::from_millis(200));

        slow.abort();
    }

    #[tokio::test]
    async fn test_settle_stops_when_watcher_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut calls = 0;
        let scan = || {
            calls += 1;
            Ok(vec![port("/dev/ttyACM0", "2341", "004f")])
        };

        settle(scan, 0x2341, 0x004f, TICK, SETTLE_ATTEMPTS, tx)
            .await
            .unwrap();
        assert_eq!(calls, 1);
    }
}

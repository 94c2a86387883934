//! Object-use detection from RFID tag reads.
//!
//! The detector runs on its own thread for as long as a recording session is
//! open. Every update interval it averages the RSSI of each object's tag over
//! the reads seen in that period and publishes the result into the shared
//! `ObjectTable`. An object counts as in use when its tag was not read at all
//! (a hand or body is shielding it) or when it was read strongly (it has been
//! brought close to the antenna).
//!
//! The reader itself sits behind the `TagSource` trait. Stopping is
//! cooperative: the thread checks a running flag between polls.

use crate::config::{ObjectSpec, ObjectsConfig};
use crate::error::ObjectDetectorError;
use crate::objects::table::SharedObjectTable;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest a single poll may block, so a stop request is seen promptly.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delay between reconnection attempts after a reader fault.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// One tag observation reported by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRead {
    pub tag_id: String,
    pub antenna_port: u16,
    pub peak_rssi_dbm: f64,
}

/// A source of tag reads, usually an RFID reader driver.
pub trait TagSource: Send {
    /// Open the connection to the reader.
    fn connect(&mut self) -> Result<(), ObjectDetectorError>;

    /// Wait up to `timeout` for tag reads.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TagRead>, ObjectDetectorError>;

    /// Close the connection. Must be safe to call when not connected.
    fn disconnect(&mut self);
}

/// A tag source that never reports anything.
#[derive(Debug, Default)]
pub struct NoopTagSource;

impl TagSource for NoopTagSource {
    fn connect(&mut self) -> Result<(), ObjectDetectorError> {
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<TagRead>, ObjectDetectorError> {
        thread::sleep(timeout);
        Ok(Vec::new())
    }

    fn disconnect(&mut self) {}
}

/// A tag source fed from a channel, for reader drivers living elsewhere.
pub struct ChannelTagSource {
    receiver: Receiver<TagRead>,
}

impl ChannelTagSource {
    /// Create a source together with the sender that feeds it.
    pub fn channel() -> (Sender<TagRead>, Self) {
        let (sender, receiver) = unbounded();
        (sender, Self { receiver })
    }

    /// Queue recorded reads for the source. Returns how many were queued;
    /// stops early once the source has been dropped.
    pub fn replay<I>(sender: &Sender<TagRead>, reads: I) -> usize
    where
        I: IntoIterator<Item = TagRead>,
    {
        let mut sent = 0;
        for read in reads {
            if let Err(e) = sender.send(read) {
                debug!("Tag replay stopped after {sent} reads: {e}");
                break;
            }
            sent += 1;
        }
        sent
    }
}

impl TagSource for ChannelTagSource {
    fn connect(&mut self) -> Result<(), ObjectDetectorError> {
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<TagRead>, ObjectDetectorError> {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(read) => read,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ObjectDetectorError::Reader("tag channel closed".to_string()))
            }
        };

        let mut reads = vec![first];
        reads.extend(self.receiver.try_iter());
        Ok(reads)
    }

    fn disconnect(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
struct RssiAccumulator {
    sum: f64,
    reads: u32,
}

/// Turns raw tag reads into per-period in-use decisions.
#[derive(Debug)]
pub struct ObjectAggregator {
    specs: Vec<ObjectSpec>,
    accumulators: HashMap<String, RssiAccumulator>,
}

impl ObjectAggregator {
    pub fn new(specs: Vec<ObjectSpec>) -> Self {
        Self {
            specs,
            accumulators: HashMap::new(),
        }
    }

    /// Account for one read. Reads from other antennas or unknown tags are ignored.
    pub fn record(&mut self, read: &TagRead) {
        for spec in &self.specs {
            if spec.tag_id == read.tag_id && spec.antenna_port == read.antenna_port {
                let acc = self.accumulators.entry(spec.name.clone()).or_default();
                acc.sum += read.peak_rssi_dbm;
                acc.reads += 1;
            }
        }
    }

    /// Decide every object's state for the period just ended and reset.
    pub fn finish_period(&mut self) -> Vec<(String, Option<f64>, bool)> {
        let results = self
            .specs
            .iter()
            .map(|spec| {
                let acc = self.accumulators.get(&spec.name).copied().unwrap_or_default();
                if acc.reads == 0 {
                    (spec.name.clone(), None, true)
                } else {
                    let mean = acc.sum / acc.reads as f64;
                    (spec.name.clone(), Some(mean), mean >= spec.rssi_threshold)
                }
            })
            .collect();

        self.accumulators.clear();
        results
    }

    /// Decide the period and write the results into the table.
    pub fn publish(&mut self, table: &SharedObjectTable) {
        for (name, rssi, in_use) in self.finish_period() {
            table.publish(&name, rssi, in_use);
        }
    }
}

/// Runs a `TagSource` on a dedicated thread and keeps the object table fresh.
pub struct ObjectDetector {
    config: ObjectsConfig,
    table: SharedObjectTable,
    source: Option<Box<dyn TagSource>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<Box<dyn TagSource>>>,
}

impl ObjectDetector {
    /// Create a detector writing into `table`.
    pub fn new(config: ObjectsConfig, table: SharedObjectTable, source: Box<dyn TagSource>) -> Self {
        Self {
            config,
            table,
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start sampling in a background thread.
    pub fn start(&mut self) -> Result<(), ObjectDetectorError> {
        if self.running.load(Ordering::SeqCst) || self.thread_handle.is_some() {
            return Err(ObjectDetectorError::AlreadyRunning);
        }
        let source = self.source.take().ok_or(ObjectDetectorError::AlreadyRunning)?;

        self.table.reset_readings();
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let table = self.table.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("object-detector".to_string())
            .spawn(move || run_detector(source, running, table, config))
            .map_err(|e| ObjectDetectorError::Reader(e.to_string()))?;

        info!("Object detector started");
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop sampling and wait for the thread to finish its current poll.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => warn!("Object detector thread panicked"),
            }
            self.table.reset_readings();
            info!("Object detector stopped");
        }
    }

    /// Check if the detector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn table(&self) -> &SharedObjectTable {
        &self.table
    }
}

impl Drop for ObjectDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(MAX_POLL_INTERVAL.min(deadline - Instant::now()));
    }
}

fn run_detector(
    mut source: Box<dyn TagSource>,
    running: Arc<AtomicBool>,
    table: SharedObjectTable,
    config: ObjectsConfig,
) -> Box<dyn TagSource> {
    let poll_timeout = config.update_interval.min(MAX_POLL_INTERVAL);
    let mut aggregator = ObjectAggregator::new(config.objects.clone());

    'session: while running.load(Ordering::SeqCst) {
        if let Err(e) = source.connect() {
            warn!("Tag reader connection failed: {e}");
            table.set_faulted(true);
            sleep_while_running(&running, RECONNECT_DELAY);
            continue;
        }
        table.set_faulted(false);
        debug!("Tag reader connected");

        let mut period_start = Instant::now();
        while running.load(Ordering::SeqCst) {
            match source.poll(poll_timeout) {
                Ok(reads) => {
                    for read in &reads {
                        aggregator.record(read);
                    }
                }
                Err(e) => {
                    warn!("Tag reader fault: {e}");
                    table.set_faulted(true);
                    source.disconnect();
                    sleep_while_running(&running, RECONNECT_DELAY);
                    continue 'session;
                }
            }

            if period_start.elapsed() >= config.update_interval {
                aggregator.publish(&table);
                period_start = Instant::now();
            }
        }
    }

    source.disconnect();
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::table::ObjectTable;

    fn read(tag: &str, port: u16, rssi: f64) -> TagRead {
        TagRead {
            tag_id: format!("0000 0000 0000 0000 0000 {tag}"),
            antenna_port: port,
            peak_rssi_dbm: rssi,
        }
    }

    #[test]
    fn test_aggregator_thresholds() {
        let mut agg = ObjectAggregator::new(ObjectsConfig::default().objects);

        // Cup: mean -60 >= -65 -> in use
        agg.record(&read("0016", 4, -58.0));
        agg.record(&read("0016", 4, -62.0));
        // Mouse: mean -70 < -55 -> not in use
        agg.record(&read("0205", 4, -70.0));
        // Marker read on the wrong antenna is ignored, so it has no reads -> in use
        agg.record(&read("0010", 4, -90.0));

        let results: HashMap<String, (Option<f64>, bool)> = agg
            .finish_period()
            .into_iter()
            .map(|(n, r, u)| (n, (r, u)))
            .collect();

        assert_eq!(results["Cup"], (Some(-60.0), true));
        assert_eq!(results["Mouse"], (Some(-70.0), false));
        assert_eq!(results["Marker"], (None, true));
        assert_eq!(results["Book"], (None, true));
    }

    #[test]
    fn test_aggregator_resets_each_period() {
        let mut agg = ObjectAggregator::new(ObjectsConfig::default().objects);
        agg.record(&read("0205", 4, -70.0));
        let _ = agg.finish_period();

        let results = agg.finish_period();
        let mouse = results.iter().find(|(n, _, _)| n == "Mouse").unwrap();
        assert_eq!(mouse.1, None);
        assert!(mouse.2);
    }

    #[test]
    fn test_replay_stops_when_source_dropped() {
        let (sender, source) = ChannelTagSource::channel();
        let reads = vec![read("0016", 4, -40.0), read("0205", 4, -50.0)];
        assert_eq!(ChannelTagSource::replay(&sender, reads.clone()), 2);

        drop(source);
        assert_eq!(ChannelTagSource::replay(&sender, reads), 0);
    }

    #[test]
    fn test_detector_publishes_from_channel() {
        let config = ObjectsConfig {
            update_interval: Duration::from_millis(20),
            ..ObjectsConfig::default()
        };
        let table = ObjectTable::shared(&config.objects);
        let (sender, source) = ChannelTagSource::channel();
        let mut detector = ObjectDetector::new(config, table.clone(), Box::new(source));

        detector.start().unwrap();
        assert!(detector.is_running());
        assert!(matches!(
            detector.start(),
            Err(ObjectDetectorError::AlreadyRunning)
        ));

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = false;
        while Instant::now() < deadline {
            sender.send(read("0016", 4, -40.0)).unwrap();
            thread::sleep(Duration::from_millis(5));
            let cup = table.snapshot().into_iter().find(|o| o.name == "Cup").unwrap();
            if cup.rssi.is_some() && cup.in_use {
                seen = true;
                break;
            }
        }
        assert!(seen, "cup reading never published");

        detector.stop();
        assert!(!detector.is_running());
        assert!(!table.is_in_use("Cup"));
        assert!(table.snapshot().iter().all(|o| o.rssi.is_none()));

        // The source is handed back, so the detector can run again.
        detector.start().unwrap();
        detector.stop();
    }

    struct FailingSource;

    impl TagSource for FailingSource {
        fn connect(&mut self) -> Result<(), ObjectDetectorError> {
            Err(ObjectDetectorError::Connection("reader offline".to_string()))
        }

        fn poll(&mut self, _timeout: Duration) -> Result<Vec<TagRead>, ObjectDetectorError> {
            Ok(Vec::new())
        }

        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_connection_failure_marks_table_faulted() {
        let config = ObjectsConfig::default();
        let table = ObjectTable::shared(&config.objects);
        table.publish("Cup", Some(-40.0), true);

        let mut detector = ObjectDetector::new(config, table.clone(), Box::new(FailingSource));
        detector.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !table.is_faulted() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(table.is_faulted());
        assert!(!table.is_in_use("Cup"));

        detector.stop();
    }
}

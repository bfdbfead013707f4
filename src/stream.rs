//! Background read loop owning one transport connection.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    reader::{FrameReader, DEFAULT_READ_SIZE},
    status::DEFAULT_SATELLITE_EXPIRY,
    transport::{Transport, TransportConfig},
    CommandQueue, ConnectionError, Frame, ProtocolFilter, StreamError, TransportError,
};

/// Join timeout used when a handle is dropped without an explicit stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Consumer preferences for one session
pub struct StreamOptions {
    /// Protocols to deliver
    pub filter: ProtocolFilter,
    /// Keep satellites without signal in the visible set
    pub show_unused: bool,
    /// Satellites not re-reported within this window are dropped
    pub satellite_expiry: Duration,
    /// Bytes requested per transport read
    pub read_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            filter: ProtocolFilter::all(),
            show_unused: false,
            satellite_expiry: DEFAULT_SATELLITE_EXPIRY,
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Notifications from the read loop
pub enum StreamEvent {
    /// Frames are waiting on the inbound channel. Sent once per batch:
    /// the next one follows only after [`StreamHandle::frames`] is called.
    DataReady,
    /// The transport failed; the loop has stopped
    ConnectionLost(String),
    /// The replay file is exhausted; the loop has stopped
    EndOfFile,
    /// The loop stopped on request
    Stopped,
}

/// Configures and starts read loops.
pub struct StreamHandler {
    options: StreamOptions,
    commands: CommandQueue,
    raw_tx: Option<Sender<Vec<u8>>>,
}

impl StreamHandler {
    /// Handler with its own empty command queue
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            commands: CommandQueue::new(),
            raw_tx: None,
        }
    }

    /// Drain this queue instead of a private one. Commands already in it
    /// are written on the first iteration.
    pub fn with_commands(mut self, commands: CommandQueue) -> Self {
        self.commands = commands;
        self
    }

    /// Also send the raw bytes of every delivered frame to `tx`.
    pub fn with_raw_sink(mut self, tx: Sender<Vec<u8>>) -> Self {
        self.raw_tx = Some(tx);
        self
    }

    /// Queue drained by loops started from this handler
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    /// Connect, then run the read loop on a worker thread.
    pub fn start(&self, config: &TransportConfig) -> Result<StreamHandle, ConnectionError> {
        let transport = config.connect()?;
        Ok(self.start_with_transport(transport))
    }

    /// Run the read loop on an already connected transport.
    pub fn start_with_transport(&self, transport: Box<dyn Transport>) -> StreamHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let description = transport.describe();
        let worker = ReadLoop {
            transport,
            reader: FrameReader::new(self.options.filter, self.options.read_size),
            cancel: cancel.clone(),
            ready: ready.clone(),
            commands: self.commands.clone(),
            frame_tx,
            event_tx,
            raw_tx: self.raw_tx.clone(),
        };
        let hdl = thread::spawn(move || {
            worker.run();
            let _ = done_tx.send(());
        });
        StreamHandle {
            description,
            cancel,
            ready,
            frames: frame_rx,
            events: event_rx,
            done: done_rx,
            commands: self.commands.clone(),
            worker: Some(hdl),
        }
    }
}

struct ReadLoop {
    transport: Box<dyn Transport>,
    reader: FrameReader,
    cancel: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    commands: CommandQueue,
    frame_tx: Sender<Frame>,
    event_tx: Sender<StreamEvent>,
    raw_tx: Option<Sender<Vec<u8>>>,
}

impl ReadLoop {
    fn run(mut self) {
        let name = self.transport.describe();
        info!("Read loop started on {name}");
        let exit = loop {
            if self.cancel.load(Ordering::Acquire) {
                break StreamEvent::Stopped;
            }
            match self.reader.read_frame(self.transport.as_mut()) {
                Ok(Some(frame)) => {
                    if let Some(tx) = &self.raw_tx {
                        if tx.send(frame.raw.clone()).is_err() {
                            debug!("Raw consumer went away");
                            self.raw_tx = None;
                        }
                    }
                    if self.frame_tx.send(frame).is_err() {
                        debug!("Frame consumer went away");
                        break StreamEvent::Stopped;
                    }
                    // one notification until the consumer looks at the frames
                    if !self.ready.swap(true, Ordering::AcqRel) {
                        let _ = self.event_tx.send(StreamEvent::DataReady);
                    }
                }
                Ok(None) => {}
                Err(TransportError::EndOfStream) => break StreamEvent::EndOfFile,
                Err(e) => break StreamEvent::ConnectionLost(e.to_string()),
            }
            if let Err(e) = self.write_commands() {
                break StreamEvent::ConnectionLost(e.to_string());
            }
        };
        let dropped = self.commands.clear();
        if dropped > 0 {
            debug!("Dropped {dropped} queued commands");
        }
        self.transport.close();
        let stats = self.reader.stats();
        match &exit {
            StreamEvent::ConnectionLost(reason) => warn!("Connection to {name} lost: {reason}"),
            _ => info!(
                "Read loop on {name} finished ({exit:?}): {} frames, {} checksum errors, {} bytes skipped",
                stats.frames, stats.checksum_errors, stats.discarded
            ),
        }
        let _ = self.event_tx.send(exit);
    }

    fn write_commands(&mut self) -> Result<(), TransportError> {
        for cmd in self.commands.drain() {
            match self.transport.write(&cmd) {
                Ok(()) => debug!("Wrote {} byte command", cmd.len()),
                Err(TransportError::NoPeer) => {
                    warn!("Dropped {} byte command: no peer", cmd.len())
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A running read loop.
///
/// Dropping the handle stops the loop and waits up to
/// [`DEFAULT_STOP_TIMEOUT`] for it to release the transport.
pub struct StreamHandle {
    description: String,
    cancel: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    frames: Receiver<Frame>,
    events: Receiver<StreamEvent>,
    done: Receiver<()>,
    commands: CommandQueue,
    worker: Option<thread::JoinHandle<()>>,
}

impl StreamHandle {
    /// Inbound frames in stream order. Calling this re-arms
    /// [`StreamEvent::DataReady`] for the next frame.
    pub fn frames(&self) -> &Receiver<Frame> {
        self.ready.store(false, Ordering::Release);
        &self.frames
    }

    /// Loop notifications
    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }

    /// Queue drained by this loop
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    /// Endpoint description
    pub fn describe(&self) -> &str {
        &self.description
    }

    /// True until the worker has exited.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|hdl| !hdl.is_finished())
    }

    /// Ask the loop to stop and wait up to `timeout` for it to exit. The
    /// loop notices the request after its current read returns.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), StreamError> {
        self.cancel.store(true, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                worker.join().map_err(|_| StreamError::Panicked)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.worker = Some(worker);
                Err(StreamError::StopTimeout(timeout))
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop(DEFAULT_STOP_TIMEOUT) {
            warn!("{}: {e}", self.description);
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{transport::FileConfig, Protocol};
    use std::{
        collections::VecDeque,
        io::{self, Write},
        sync::{
            atomic::AtomicUsize,
            Mutex,
        },
        time::Instant,
    };

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    #[derive(Debug, Clone, Copy)]
    pub(crate) enum MockEnd {
        EndOfStream,
        Lost,
        /// Keep timing out
        Idle,
    }

    /// In-memory transport replaying scripted reads and recording writes
    /// together with the number of reads completed before each write.
    pub(crate) struct MockTransport {
        chunks: VecDeque<Vec<u8>>,
        end: MockEnd,
        reads: Arc<AtomicUsize>,
        written: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        pub(crate) fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                end: MockEnd::EndOfStream,
                reads: Arc::new(AtomicUsize::new(0)),
                written: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn ending(mut self, end: MockEnd) -> Self {
            self.end = end;
            self
        }

        pub(crate) fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub(crate) fn read_counter(&self) -> Arc<AtomicUsize> {
            self.reads.clone()
        }

        pub(crate) fn written(&self) -> Arc<Mutex<Vec<(usize, Vec<u8>)>>> {
            self.written.clone()
        }

        pub(crate) fn closed(&self) -> Arc<AtomicBool> {
            self.closed.clone()
        }
    }

    impl Transport for MockTransport {
        fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            let res = match self.chunks.pop_front() {
                Some(mut chunk) => {
                    if chunk.len() > max {
                        let rest = chunk.split_off(max);
                        self.chunks.push_front(rest);
                    }
                    Ok(chunk)
                }
                None => match self.end {
                    MockEnd::EndOfStream => Err(TransportError::EndOfStream),
                    MockEnd::Lost => Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into()),
                    MockEnd::Idle => {
                        thread::sleep(Duration::from_millis(5));
                        Ok(Vec::new())
                    }
                },
            };
            self.reads.fetch_add(1, Ordering::SeqCst);
            res
        }

        fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
            let reads = self.reads();
            self.written
                .lock()
                .unwrap()
                .push((reads, data.to_vec()));
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "mock".into()
        }
    }

    fn wait_for<T>(rx: &Receiver<T>, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            if let Ok(item) = rx.recv_timeout(Duration::from_millis(50)) {
                let done = pred(&item);
                seen.push(item);
                if done {
                    return seen;
                }
            }
        }
        panic!("timed out after {} items", seen.len());
    }

    #[test]
    fn command_written_within_one_iteration() {
        let mock = MockTransport::new(vec![GGA.to_vec()]).ending(MockEnd::Idle);
        let written = mock.written();
        let reads = mock.read_counter();
        let handler = StreamHandler::new(StreamOptions::default());
        let mut handle = handler.start_with_transport(Box::new(mock));
        wait_for(handle.events(), |ev| *ev == StreamEvent::DataReady);
        let cmd: Vec<u8> = (0..10).collect();
        let before = reads.load(Ordering::SeqCst);
        handle.commands().enqueue(cmd.clone());
        let deadline = Instant::now() + Duration::from_secs(5);
        while written.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop(Duration::from_secs(1)).unwrap();
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, cmd);
        assert!(written[0].0 <= before + 1);
    }

    #[test]
    fn queued_before_start_goes_out_first() {
        let queue = CommandQueue::new();
        queue.enqueue(crate::ubx::poll(0x0A, 0x04));
        queue.enqueue(vec![0x42]);
        let mock = MockTransport::new(vec![]).ending(MockEnd::Idle);
        let written = mock.written();
        let mut handle = StreamHandler::new(StreamOptions::default())
            .with_commands(queue.clone())
            .start_with_transport(Box::new(mock));
        let deadline = Instant::now() + Duration::from_secs(5);
        while written.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop(Duration::from_secs(1)).unwrap();
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], (1, crate::ubx::poll(0x0A, 0x04)));
        assert_eq!(written[1], (1, vec![0x42]));
        assert!(queue.is_empty());
    }

    #[test]
    fn end_of_file_notification() {
        let mock = MockTransport::new(vec![GGA.to_vec(), GGA.to_vec()]);
        let closed = mock.closed();
        let mut handle =
            StreamHandler::new(StreamOptions::default()).start_with_transport(Box::new(mock));
        let events = wait_for(handle.events(), |ev| *ev != StreamEvent::DataReady);
        assert_eq!(events, vec![StreamEvent::DataReady, StreamEvent::EndOfFile]);
        assert_eq!(handle.frames().try_iter().count(), 2);
        handle.stop(Duration::from_secs(1)).unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!handle.is_running());
    }

    #[test]
    fn data_ready_once_per_batch() {
        let mock = MockTransport::new(vec![GGA.to_vec(); 200]);
        let handle =
            StreamHandler::new(StreamOptions::default()).start_with_transport(Box::new(mock));
        let events = wait_for(handle.events(), |ev| *ev == StreamEvent::EndOfFile);
        assert_eq!(events, vec![StreamEvent::DataReady, StreamEvent::EndOfFile]);
        assert_eq!(handle.frames().try_iter().count(), 200);
    }

    /// Transport fed from a channel so a test decides when data arrives.
    struct FedTransport(Receiver<Vec<u8>>);

    impl Transport for FedTransport {
        fn read(&mut self, _max: usize) -> Result<Vec<u8>, TransportError> {
            match self.0.recv_timeout(Duration::from_millis(5)) {
                Ok(data) => Ok(data),
                Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
                Err(RecvTimeoutError::Disconnected) => Err(TransportError::EndOfStream),
            }
        }

        fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {}

        fn describe(&self) -> String {
            "fed".into()
        }
    }

    #[test]
    fn data_ready_rearmed_by_frames() {
        let (tx, rx) = mpsc::channel();
        let mut handle = StreamHandler::new(StreamOptions::default())
            .start_with_transport(Box::new(FedTransport(rx)));
        tx.send(GGA.to_vec()).unwrap();
        wait_for(handle.events(), |ev| *ev == StreamEvent::DataReady);
        assert_eq!(handle.frames().try_iter().count(), 1);
        tx.send(GGA.to_vec()).unwrap();
        wait_for(handle.events(), |ev| *ev == StreamEvent::DataReady);
        // not re-armed: further frames queue silently
        for _ in 0..5 {
            tx.send(GGA.to_vec()).unwrap();
        }
        // read the field directly so the notification stays armed
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut queued = 0;
        while queued < 6 && Instant::now() < deadline {
            match handle.frames.try_recv() {
                Ok(_) => queued += 1,
                Err(_) => thread::sleep(Duration::from_millis(1)),
            }
        }
        assert_eq!(queued, 6);
        handle.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(
            handle.events().try_iter().collect::<Vec<_>>(),
            vec![StreamEvent::Stopped]
        );
    }

    #[test]
    fn connection_lost_notification() {
        let mock = MockTransport::new(vec![b"\x00\x01".to_vec()]).ending(MockEnd::Lost);
        let queue = CommandQueue::new();
        let handle = StreamHandler::new(StreamOptions::default())
            .with_commands(queue.clone())
            .start_with_transport(Box::new(mock));
        let events = wait_for(handle.events(), |ev| *ev != StreamEvent::DataReady);
        match events.last() {
            Some(StreamEvent::ConnectionLost(reason)) => assert!(reason.contains("unplugged")),
            other => panic!("unexpected {other:?}"),
        }
        // anything queued after the loop ended stays unsent
        queue.enqueue(vec![1]);
        drop(handle);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn stop_joins_and_closes() {
        let mock = MockTransport::new(vec![]).ending(MockEnd::Idle);
        let closed = mock.closed();
        let mut handle =
            StreamHandler::new(StreamOptions::default()).start_with_transport(Box::new(mock));
        assert!(handle.is_running());
        handle.stop(Duration::from_secs(1)).unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(handle.events().try_iter().last(), Some(StreamEvent::Stopped));
        // stopping twice is harmless
        handle.stop(Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn raw_side_channel() {
        let mut chunk = b"\xFF\xFF".to_vec();
        chunk.extend_from_slice(GGA);
        chunk.extend_from_slice(&crate::ubx::poll(0x0A, 0x04));
        let (raw_tx, raw_rx) = mpsc::channel();
        let mock = MockTransport::new(vec![chunk]);
        let handle = StreamHandler::new(StreamOptions::default())
            .with_raw_sink(raw_tx)
            .start_with_transport(Box::new(mock));
        wait_for(handle.events(), |ev| *ev == StreamEvent::EndOfFile);
        let raw: Vec<Vec<u8>> = raw_rx.try_iter().collect();
        assert_eq!(raw, vec![GGA.to_vec(), crate::ubx::poll(0x0A, 0x04)]);
    }

    #[test]
    fn replay_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..3 {
            tmp.write_all(GGA).unwrap();
        }
        tmp.flush().unwrap();
        let config = TransportConfig::File(FileConfig {
            path: tmp.path().to_path_buf(),
            delay: Duration::from_millis(1),
        });
        let options = StreamOptions {
            read_size: 50,
            ..Default::default()
        };
        let handle = StreamHandler::new(options).start(&config).unwrap();
        wait_for(handle.events(), |ev| *ev == StreamEvent::EndOfFile);
        let frames: Vec<Frame> = handle.frames().try_iter().collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.protocol == Protocol::Nmea && f.message.is_ok()));
    }
}

use std::{
    io::{ErrorKind, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};

const POLL: Duration = Duration::from_millis(50);

/// Re-broadcasts raw frames to every connected TCP client.
pub struct FanoutServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl FanoutServer {
    /// Listen on `port` and forward everything received on `raw`.
    pub fn start(port: u16, raw: Receiver<Vec<u8>>) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        info!("Fan-out listening on {addr}");
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let worker = thread::spawn(move || serve(listener, raw, flag));
        Ok(Self {
            addr,
            running,
            worker: Some(worker),
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for FanoutServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(hdl) = self.worker.take() {
            if hdl.join().is_err() {
                warn!("Fan-out worker panicked");
            }
        }
    }
}

fn serve(listener: TcpListener, raw: Receiver<Vec<u8>>, running: Arc<AtomicBool>) {
    let mut clients: Vec<(SocketAddr, TcpStream)> = Vec::new();
    while running.load(Ordering::Acquire) {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("Fan-out client {addr} connected");
                    if let Err(e) = stream
                        .set_nonblocking(false)
                        .and_then(|()| stream.set_nodelay(true))
                    {
                        debug!("{addr}: {e}");
                    }
                    clients.push((addr, stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Fan-out accept: {e}");
                    break;
                }
            }
        }
        match raw.recv_timeout(POLL) {
            Ok(data) => clients.retain_mut(|(addr, stream)| match stream.write_all(&data) {
                Ok(()) => true,
                Err(e) => {
                    info!("Fan-out client {addr} dropped: {e}");
                    false
                }
            }),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Fan-out closing {} clients", clients.len());
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{io::Read, sync::mpsc};

    #[test]
    fn broadcasts_to_clients() {
        let (tx, rx) = mpsc::channel();
        let server = FanoutServer::start(0, rx).unwrap();
        let port = server.local_addr().port();
        let mut a = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut b = TcpStream::connect(("127.0.0.1", port)).unwrap();
        a.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        b.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        // let the server accept both before data flows
        thread::sleep(Duration::from_millis(200));
        tx.send(b"$GPHDT,123.4,T*31\r\n".to_vec()).unwrap();
        for client in [&mut a, &mut b] {
            let mut buf = [0u8; 19];
            client.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"$GPHDT,123.4,T*31\r\n");
        }
        drop(tx);
        drop(server);
    }
}

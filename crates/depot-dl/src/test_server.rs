//! Minimal HTTP/1.1 server on localhost for download tests.

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    thread,
    time::Duration,
};

pub struct TestServer {
    port: u16,
}

impl TestServer {
    /// Answers every request with `status` and `body`.
    pub fn serve(status: u16, body: Vec<u8>) -> Self {
        Self::start(move |mut stream| {
            let head = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        })
    }

    /// Announces `total` bytes and sends them in small chunks with a pause between each.
    pub fn trickle(total: usize, chunk: usize, pause: Duration) -> Self {
        Self::start(move |mut stream| {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            let mut sent = 0;
            while sent < total {
                let n = chunk.min(total - sent);
                if stream.write_all(&vec![0u8; n]).is_err() {
                    return;
                }
                let _ = stream.flush();
                sent += n;
                thread::sleep(pause);
            }
        })
    }

    /// Announces `total` bytes, sends the first `sent` of them and then goes silent.
    pub fn stall(total: usize, sent: usize) -> Self {
        Self::start(move |mut stream| {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            let _ = stream.write_all(&vec![0u8; sent]);
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(30));
        })
    }

    fn start<F>(handler: F) -> Self
    where
        F: Fn(TcpStream) + Send + Sync + Clone + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let handler = handler.clone();
                thread::spawn(move || {
                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    while reader.read_line(&mut line).is_ok_and(|n| n > 2) {
                        line.clear();
                    }
                    handler(reader.into_inner());
                });
            }
        });

        Self {
            port,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

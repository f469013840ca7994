//! Test helper: binds a TCP port and accepts connections until
//! killed, standing in for a real dev server.

use std::net::TcpListener;

fn main() {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .expect("usage: fake_service <port>");

    let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind");
    println!("listening on {port}");

    for stream in listener.incoming() {
        drop(stream);
    }
}

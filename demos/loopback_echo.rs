// A client and a server sharing a single process and a single transceiver:
// the client's packets loop back through the same UDP socket the server is
// listening on, so this needs no second process to demonstrate the stream
// handshake, data transfer, and close.
//
// `minithreads::system_initialize` never returns once called (see its own
// doc comment) — like the original assignment's server programs, the
// client thread below ends the process itself once the exchange completes.

use minithreads::net::stream;
use minithreads::Result;

const SERVER_PORT: u16 = 80;
const GREETING: &[u8] = b"hello from the client";

fn main() -> Result<()> {
    env_logger::init();

    minithreads::system_initialize(move || {
        minithreads::net::initialize(0).expect("failed to bind the loopback transceiver");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            let server = stream::listen(SERVER_PORT).expect("listen failed");
            println!("server: listening on port {SERVER_PORT}");

            let mut buf = [0u8; 256];
            let n = stream::receive(&server, &mut buf).expect("receive failed");
            println!("server: received {:?}", String::from_utf8_lossy(&buf[..n]));

            stream::send(&server, b"hello from the server").expect("send failed");
            stream::close(&server);
        })
        .unwrap();

        minithreads::fork(move || {
            let client = stream::connect(addr, SERVER_PORT).expect("connect failed");
            println!("client: connected to port {SERVER_PORT}");

            stream::send(&client, GREETING).expect("send failed");

            let mut buf = [0u8; 256];
            let n = stream::receive(&client, &mut buf).expect("receive failed");
            println!("client: received {:?}", String::from_utf8_lossy(&buf[..n]));

            stream::close(&client);
            std::process::exit(0);
        })
        .unwrap();
    })
    .unwrap();

    unreachable!("system_initialize never returns");
}

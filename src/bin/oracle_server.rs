use padding_oracle::{http, CbcHarness};

use rand::{rngs::StdRng, SeedableRng};

const DEFAULT_ADDR: &str = "127.0.0.1:9000";
const SECRET: &[u8] = b"MDAwMDA5aXRoIG15IHJhZy10b3AgZG93biBzbyBteSBoYWlyIGNhbiBibG93";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;

    let addr = std::env::var("PADDING_ORACLE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let mut harness = CbcHarness::random(StdRng::from_entropy());
    let ciphertext = harness.encrypt(SECRET);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("serving padding oracle on http://{}", listener.local_addr()?);
    println!("ciphertext: {}", hex::encode(&ciphertext));
    axum::serve(listener, http::router(harness)).await?;
    Ok(())
}
